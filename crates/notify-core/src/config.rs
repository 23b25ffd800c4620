//! Shared configuration for Rocket Notify.
//!
//! Locates the state directory and reads the environment into an
//! [`AppConfig`].
//!
//! # Storage Structure
//!
//! ```text
//! ~/.rocket-notify/
//! ├── config/
//! │   └── .env.local   # secrets (bot token, vault secret)
//! └── subscribers/     # one JSON record per subscriber
//! ```
//!
//! # Environment Variables
//!
//! Required: `TELEGRAM_BOT_TOKEN`, `RC_TOKEN_SALT`.
//!
//! Optional: `NOTIFY_STATE_DIR`, `POLLING_INTERVAL_MIN` (default 5),
//! `POLLING_QUEUE_THRESHOLD` (default 20), `TELEGRAM_CHANNEL_ID`,
//! `RC_SERVER`/`RC_USER`/`RC_PASSWORD` (single-tenant deployment),
//! `RC_RETAIN_PASSWORD`, and the `PACHCA_*` family.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable for a custom state directory.
pub const STATE_DIR_ENV: &str = "NOTIFY_STATE_DIR";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".rocket-notify";

/// Default polling interval in minutes.
pub const DEFAULT_POLLING_INTERVAL_MIN: u64 = 5;

/// Above this many enabled subscribers a cycle is handed to the job queue.
pub const DEFAULT_QUEUE_THRESHOLD: usize = 20;

/// Default base URL of the Pachca internal API.
pub const DEFAULT_PACHCA_INTERNAL_BASE_URL: &str = "https://app.pachca.com/api/v3";

/// Get the state directory.
///
/// 1. `NOTIFY_STATE_DIR` if set
/// 2. `~/.rocket-notify` if a home directory is available
/// 3. `.rocket-notify` in the current directory
pub fn state_dir() -> PathBuf {
    std::env::var(STATE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(DEFAULT_STATE_DIR))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
        })
}

/// Get the user config directory.
pub fn config_dir() -> PathBuf {
    state_dir().join("config")
}

/// Get the `.env.local` secrets file path.
pub fn env_file() -> PathBuf {
    config_dir().join(".env.local")
}

/// Load environment files: the config directory first, then a local
/// `.env.local` or `.env`. Variables already set win.
pub fn load_env_files() {
    let env_path = env_file();
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
    let _ = dotenvy::from_filename(".env.local").or_else(|_| dotenvy::dotenv());
}

/// Converts a minutes setting into a duration. Unparsable, zero or
/// overflowing values fall back to the default.
pub fn parse_interval_minutes(raw: Option<&str>) -> Duration {
    let secs = raw
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|m| *m > 0)
        .and_then(|m| m.checked_mul(60))
        .unwrap_or(DEFAULT_POLLING_INTERVAL_MIN * 60);
    Duration::from_secs(secs)
}

/// Process-wide password credential for single-tenant deployments.
#[derive(Clone, PartialEq, Eq)]
pub struct SingleTenantCredentials {
    pub server: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for SingleTenantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleTenantCredentials")
            .field("server", &self.server)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Pachca watcher settings.
#[derive(Clone, PartialEq, Eq)]
pub struct PachcaConfig {
    pub base_url: String,
    pub access_token: String,
    pub internal_base_url: String,
    /// Cookie for the internal API; enables the unread-ids shortcut.
    pub internal_cookie: Option<String>,
    pub chat_ids: Vec<String>,
    pub user_id: Option<String>,
    pub polling_interval: Duration,
}

impl fmt::Debug for PachcaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PachcaConfig")
            .field("base_url", &self.base_url)
            .field("internal_base_url", &self.internal_base_url)
            .field("internal_cookie", &self.internal_cookie.as_ref().map(|_| "<redacted>"))
            .field("chat_ids", &self.chat_ids)
            .field("user_id", &self.user_id)
            .field("polling_interval", &self.polling_interval)
            .finish()
    }
}

/// Application configuration read from the environment.
#[derive(Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    /// Broadcast destination: numeric chat id or `@username`.
    pub telegram_channel_id: Option<String>,
    /// Secret the credential vault key is derived from.
    pub token_secret: String,
    pub polling_interval: Duration,
    pub queue_threshold: usize,
    pub single_tenant: Option<SingleTenantCredentials>,
    /// Keep an encrypted copy of wizard passwords for automatic re-login.
    pub retain_password: bool,
    pub pachca: Option<PachcaConfig>,
    pub state_dir: PathBuf,
}

impl AppConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::MissingVar(key));

        let telegram_bot_token = require("TELEGRAM_BOT_TOKEN")?;
        let token_secret = require("RC_TOKEN_SALT")?;

        let queue_threshold = match get("POLLING_QUEUE_THRESHOLD") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "POLLING_QUEUE_THRESHOLD",
                reason: format!("{:?} is not a non-negative integer", raw),
            })?,
            None => DEFAULT_QUEUE_THRESHOLD,
        };

        let single_tenant = match (get("RC_SERVER"), get("RC_USER"), get("RC_PASSWORD")) {
            (Some(server), Some(user), Some(password)) => Some(SingleTenantCredentials {
                server,
                user,
                password,
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    var: "RC_SERVER",
                    reason: "RC_SERVER, RC_USER and RC_PASSWORD must be set together".to_string(),
                })
            }
        };

        let retain_password = get("RC_RETAIN_PASSWORD")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let pachca = match get("PACHCA_ACCESS_TOKEN") {
            Some(access_token) => Some(Self::pachca_from(&get, access_token)?),
            None => None,
        };

        Ok(Self {
            telegram_bot_token,
            telegram_channel_id: get("TELEGRAM_CHANNEL_ID"),
            token_secret,
            polling_interval: parse_interval_minutes(get("POLLING_INTERVAL_MIN").as_deref()),
            queue_threshold,
            single_tenant,
            retain_password,
            pachca,
            state_dir: get(STATE_DIR_ENV).map(PathBuf::from).unwrap_or_else(state_dir),
        })
    }

    fn pachca_from<G>(get: &G, access_token: String) -> Result<PachcaConfig, ConfigError>
    where
        G: Fn(&str) -> Option<String>,
    {
        let base_url = get("PACHCA_BASE_URL").ok_or(ConfigError::MissingVar("PACHCA_BASE_URL"))?;
        let chat_ids: Vec<String> = get("PACHCA_CHAT_IDS")
            .ok_or(ConfigError::MissingVar("PACHCA_CHAT_IDS"))?
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        let internal_cookie = get("PACHCA_INTERNAL_COOKIE")
            .or_else(|| get("PACHCA_INTERNAL_JWT").map(|jwt| format!("jwt={}", jwt)));
        let user_id = get("PACHCA_USER_ID");
        if internal_cookie.is_none() && user_id.is_none() {
            return Err(ConfigError::MissingVar("PACHCA_USER_ID"));
        }

        Ok(PachcaConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            internal_base_url: get("PACHCA_INTERNAL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PACHCA_INTERNAL_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            internal_cookie,
            chat_ids,
            user_id,
            polling_interval: parse_interval_minutes(get("PACHCA_POLLING_INTERVAL_MIN").as_deref()),
        })
    }

    /// Subscriber records directory root.
    pub fn store_dir(&self) -> PathBuf {
        self.state_dir.clone()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("telegram_bot_token", &"<redacted>")
            .field("telegram_channel_id", &self.telegram_channel_id)
            .field("token_secret", &"<redacted>")
            .field("polling_interval", &self.polling_interval)
            .field("queue_threshold", &self.queue_threshold)
            .field("single_tenant", &self.single_tenant)
            .field("retain_password", &self.retain_password)
            .field("pachca", &self.pachca)
            .field("state_dir", &self.state_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("TELEGRAM_BOT_TOKEN", "bot-token"),
        ("RC_TOKEN_SALT", "salt"),
        ("NOTIFY_STATE_DIR", "/tmp/rocket-notify-test"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        BASE.iter().copied().chain(extra.iter().copied()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = config_from(BASE).unwrap();
        assert_eq!(config.polling_interval, Duration::from_secs(5 * 60));
        assert_eq!(config.queue_threshold, 20);
        assert!(config.single_tenant.is_none());
        assert!(config.pachca.is_none());
        assert!(!config.retain_password);
        assert_eq!(config.state_dir, PathBuf::from("/tmp/rocket-notify-test"));
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let result = config_from(&[("TELEGRAM_BOT_TOKEN", "t")]);
        assert!(matches!(result, Err(ConfigError::MissingVar("RC_TOKEN_SALT"))));

        let result = config_from(&[("TELEGRAM_BOT_TOKEN", "t"), ("RC_TOKEN_SALT", "  ")]);
        assert!(matches!(result, Err(ConfigError::MissingVar("RC_TOKEN_SALT"))));
    }

    #[test]
    fn test_missing_bot_token_is_fatal() {
        let result = config_from(&[("RC_TOKEN_SALT", "s")]);
        assert!(matches!(result, Err(ConfigError::MissingVar("TELEGRAM_BOT_TOKEN"))));
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!(parse_interval_minutes(Some("1")), Duration::from_secs(60));
        assert_eq!(parse_interval_minutes(Some("0")), Duration::from_secs(300));
        assert_eq!(parse_interval_minutes(Some("abc")), Duration::from_secs(300));
        assert_eq!(parse_interval_minutes(None), Duration::from_secs(300));
        assert_eq!(parse_interval_minutes(Some("1000000000000000000")), Duration::from_secs(300));
        assert_eq!(parse_interval_minutes(Some(&u64::MAX.to_string())), Duration::from_secs(300));

        let config = config_from(&with(&[("POLLING_INTERVAL_MIN", "2")])).unwrap();
        assert_eq!(config.polling_interval, Duration::from_secs(120));
    }

    #[test]
    fn test_single_tenant_all_or_nothing() {
        let config = config_from(&with(&[
            ("RC_SERVER", "https://chat.example.com"),
            ("RC_USER", "bot"),
            ("RC_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert_eq!(config.single_tenant.unwrap().user, "bot");

        let result = config_from(&with(&[("RC_SERVER", "https://chat.example.com")]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_pachca_config() {
        let config = config_from(&with(&[
            ("PACHCA_ACCESS_TOKEN", "tok"),
            ("PACHCA_BASE_URL", "https://api.pachca.com/api/shared/v1/"),
            ("PACHCA_CHAT_IDS", " 1, 2 ,,3"),
            ("PACHCA_INTERNAL_JWT", "abc"),
        ]))
        .unwrap();
        let pachca = config.pachca.unwrap();
        assert_eq!(pachca.base_url, "https://api.pachca.com/api/shared/v1");
        assert_eq!(pachca.chat_ids, vec!["1", "2", "3"]);
        assert_eq!(pachca.internal_cookie.as_deref(), Some("jwt=abc"));
        assert_eq!(pachca.internal_base_url, DEFAULT_PACHCA_INTERNAL_BASE_URL);
    }

    #[test]
    fn test_pachca_requires_user_without_cookie() {
        let result = config_from(&with(&[
            ("PACHCA_ACCESS_TOKEN", "tok"),
            ("PACHCA_BASE_URL", "https://api.pachca.com"),
            ("PACHCA_CHAT_IDS", "1"),
        ]));
        assert!(matches!(result, Err(ConfigError::MissingVar("PACHCA_USER_ID"))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_from(&with(&[
            ("RC_SERVER", "https://chat.example.com"),
            ("RC_USER", "bot"),
            ("RC_PASSWORD", "hunter2"),
        ]))
        .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("bot-token"));
    }
}
