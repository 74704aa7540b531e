use std::sync::Arc;

use ollamabot_core::{auth::AuthGate, backend::ChatBackend, config::Config};
use ollamabot_ollama::OllamaClient;
use ollamabot_sqlite::SqliteUserStore;

#[tokio::main]
async fn main() -> Result<(), ollamabot_core::Error> {
    ollamabot_core::logging::init("ollamabot")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        model = %cfg.ollama_model,
        base_url = %cfg.ollama_base_url,
        timeout_secs = cfg.ollama_timeout.as_secs(),
        "ollama backend configured"
    );
    if cfg.ollama_stream {
        tracing::warn!("OLLAMA_STREAM is set but streaming is not supported; using single responses");
    }

    let gate = match &cfg.auth {
        Some(auth) => {
            let store = SqliteUserStore::open(&auth.db_path)?;
            tracing::info!(
                admin_id = auth.admin_id.0,
                db_path = %auth.db_path.display(),
                "auth enabled"
            );
            AuthGate::enabled(auth.admin_id, Arc::new(store))
        }
        None => {
            tracing::info!("auth disabled, every user is allowed");
            AuthGate::disabled()
        }
    };

    let backend: Arc<dyn ChatBackend> =
        Arc::new(OllamaClient::new(&cfg.ollama_base_url, cfg.ollama_timeout)?);

    ollamabot_telegram::router::run_polling(cfg, gate, backend)
        .await
        .map_err(|e| ollamabot_core::Error::Messaging(format!("telegram bot failed: {e:#}")))?;

    Ok(())
}
