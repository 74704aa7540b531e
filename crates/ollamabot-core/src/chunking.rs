use std::time::Duration;

use crate::{
    domain::ChatId,
    messaging::{port::MessagingPort, types::SendOptions},
};

/// Pause between consecutive chunks (Telegram flood limits).
pub const CHUNK_DELAY: Duration = Duration::from_millis(300);

/// Split `text` into pieces of at most `limit` code points.
///
/// Text that already fits comes back as a single element, so the empty
/// string yields `[""]`. Longer text is cut at exact code-point boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);

    // The first boundary is always 0 (or absent for "").
    let boundaries = text.char_indices().map(|(i, _)| i).step_by(limit).skip(1);
    let mut out = Vec::new();
    let mut start = 0;
    for end in boundaries {
        out.push(text[start..end].to_string());
        start = end;
    }
    out.push(text[start..].to_string());
    out
}

/// Send `chunks` in order, pausing `delay` between consecutive sends.
///
/// A failed send is logged and delivery continues. Returns the number of
/// chunks that were accepted by the messenger.
pub async fn deliver_chunks(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    chunks: &[String],
    opts: SendOptions,
    delay: Duration,
) -> usize {
    let mut delivered = 0;
    for (idx, chunk) in chunks.iter().enumerate() {
        if idx > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match messenger.send_text(chat_id, chunk, opts).await {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!(
                chat_id = chat_id.0,
                chunk = idx + 1,
                total = chunks.len(),
                "failed to send chunk: {e}"
            ),
        }
    }
    delivered
}
