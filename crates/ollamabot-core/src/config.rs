use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, Result};

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://ollama:11434";
pub const DEFAULT_AUTH_DB_PATH: &str = "/var/lib/ollamabot/bot_users.db";

/// Whitelist settings. Only present when `BOT_AUTH_ENABLED` is truthy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthConfig {
    pub admin_id: UserId,
    pub db_path: PathBuf,
}

/// Typed configuration, sourced from the process environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_safe_limit: usize,
    pub chunk_delay: Duration,

    // Ollama
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_timeout: Duration,
    pub ollama_stream: bool,
    pub heartbeat_interval: Duration,

    // Whitelist
    pub auth: Option<AuthConfig>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the process env in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_str = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;

        let ollama_base_url = env_str("OLLAMA_BASE_URL")
            .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        // An empty model is allowed; `/model <name>` can set it later.
        let ollama_model = lookup("OLLAMA_MODEL").unwrap_or_default().trim().to_string();
        let ollama_timeout = Duration::from_secs(
            env_str("OLLAMA_TIMEOUT_SECS")
                .and_then(|s| parse_u64(&s))
                .unwrap_or(300),
        );
        let ollama_stream = env_str("OLLAMA_STREAM")
            .map(|s| parse_bool(&s))
            .unwrap_or(false);

        let telegram_safe_limit = env_str("TELEGRAM_SAFE_LIMIT")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(4000)
            .clamp(1, 4096);

        let auth_enabled = env_str("BOT_AUTH_ENABLED")
            .map(|s| parse_bool(&s))
            .unwrap_or(false);
        let auth = if auth_enabled {
            let raw = env_str("BOT_ADMIN_ID").ok_or_else(|| {
                Error::Config("auth enabled but BOT_ADMIN_ID is not set".to_string())
            })?;
            let admin_id = raw
                .trim()
                .parse::<i64>()
                .map_err(|e| Error::Config(format!("invalid BOT_ADMIN_ID {raw:?}: {e}")))?;
            let db_path = env_str("BOT_AUTH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_AUTH_DB_PATH));
            Some(AuthConfig {
                admin_id: UserId(admin_id),
                db_path,
            })
        } else {
            None
        };

        Ok(Self {
            telegram_bot_token,
            telegram_safe_limit,
            chunk_delay: Duration::from_millis(300),
            ollama_base_url,
            ollama_model,
            ollama_timeout,
            ollama_stream,
            heartbeat_interval: Duration::from_secs(4),
            auth,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }

        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_u64(s: &str) -> Option<u64> {
    s.trim().parse::<u64>().ok()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn token_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(load(&[("TELEGRAM_BOT_TOKEN", "   ")]).is_err());
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let cfg = load(&[("TELEGRAM_BOT_TOKEN", "t")]).unwrap();
        assert_eq!(cfg.ollama_base_url, DEFAULT_OLLAMA_BASE_URL);
        assert_eq!(cfg.ollama_model, "");
        assert_eq!(cfg.ollama_timeout, Duration::from_secs(300));
        assert_eq!(cfg.telegram_safe_limit, 4000);
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(4));
        assert!(!cfg.ollama_stream);
        assert!(cfg.auth.is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("OLLAMA_BASE_URL", "http://localhost:11434/"),
        ])
        .unwrap();
        assert_eq!(cfg.ollama_base_url, "http://localhost:11434");
    }

    #[test]
    fn auth_requires_valid_admin_id() {
        let err = load(&[("TELEGRAM_BOT_TOKEN", "t"), ("BOT_AUTH_ENABLED", "yes")]).unwrap_err();
        assert!(err.to_string().contains("BOT_ADMIN_ID"));

        let err = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("BOT_AUTH_ENABLED", "true"),
            ("BOT_ADMIN_ID", "abc"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("invalid BOT_ADMIN_ID"));
    }

    #[test]
    fn auth_enabled_uses_default_db_path() {
        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("BOT_AUTH_ENABLED", "1"),
            ("BOT_ADMIN_ID", "42"),
        ])
        .unwrap();
        assert_eq!(
            cfg.auth,
            Some(AuthConfig {
                admin_id: UserId(42),
                db_path: PathBuf::from(DEFAULT_AUTH_DB_PATH),
            })
        );
    }

    #[test]
    fn auth_flag_other_values_disable() {
        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("BOT_AUTH_ENABLED", "nope"),
            ("BOT_ADMIN_ID", "42"),
        ])
        .unwrap();
        assert!(cfg.auth.is_none());
    }

    #[test]
    fn dotenv_parsing_strips_quotes_and_comments() {
        let parsed = parse_dotenv("# comment\nA=1\nB = \"two words\"\nC='x'\n=bad\nnoeq\n");
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn dotenv_never_overrides_existing_env() {
        let path = std::env::temp_dir().join(format!("ollamabot-dotenv-{}", std::process::id()));
        fs::write(
            &path,
            "OLLAMABOT_DOTENV_PRESET=from_file\nOLLAMABOT_DOTENV_FRESH=from_file\n",
        )
        .unwrap();
        env::set_var("OLLAMABOT_DOTENV_PRESET", "from_env");
        env::remove_var("OLLAMABOT_DOTENV_FRESH");

        load_dotenv_if_present(&path);

        assert_eq!(env::var("OLLAMABOT_DOTENV_PRESET").unwrap(), "from_env");
        assert_eq!(env::var("OLLAMABOT_DOTENV_FRESH").unwrap(), "from_file");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_dotenv_file_is_ignored() {
        load_dotenv_if_present(Path::new("/nonexistent/ollamabot/.env"));
    }
}
