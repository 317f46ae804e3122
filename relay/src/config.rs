//! Configuration loading.
//!
//! Configuration comes from a YAML file when one can be found, otherwise
//! from environment variables. Cron runs `sendmail` with an almost empty
//! environment, so installs driven by cron should use the file.
//!
//! ```yaml
//! host: 127.0.0.1
//! tcpPort: 25
//! requestTimeoutMs: 10000
//! channels:
//!   file:
//!     enabled: true
//!     dirPath: /var/lib/mailrelay
//!   telegram:
//!     enabled: true
//!     userId: 123456789
//!     botKey: your_telegram_bot_api_key
//!   slack:
//!     enabled: false
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// Name of the configuration file searched for by [`Config::load`].
pub const CONFIG_FILE_NAME: &str = "mailrelay.yaml";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "MAILRELAY_CONFIG";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Address the SMTP stub binds to
    pub host: String,

    /// Port the SMTP stub listens on
    pub tcp_port: u16,

    /// How long to wait for a message on stdin before starting the listener
    pub stdin_timeout_ms: u64,

    /// Upper bound for one HTTP request to a chat API
    pub request_timeout_ms: u64,

    /// Per-destination settings
    pub channels: ChannelsConfig,
}

/// Settings for every destination, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub telegram: TelegramConfig,
    pub slack: SlackConfig,
    pub file: FileConfig,
}

/// Store every message as a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    pub enabled: bool,
    /// Directory the files are written to, created on demand
    pub dir_path: PathBuf,
}

/// Send every message to a Telegram chat through a bot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Chat id of the user the bot writes to
    pub user_id: i64,
    /// Bot API token
    pub bot_key: String,
}

/// Send every message to a Slack user or channel through a bot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlackConfig {
    pub enabled: bool,
    /// Member or channel id to post to
    pub user_id: String,
    /// Bot user OAuth token
    pub bot_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            tcp_port: 25,
            stdin_timeout_ms: 2000,
            request_timeout_ms: 10_000,
            channels: ChannelsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the first source available:
    ///
    /// 1. the file named by `MAILRELAY_CONFIG`
    /// 2. `mailrelay.yaml` in the working directory, next to the executable,
    ///    or in `/etc`
    /// 3. environment variables
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return Self::from_file(path);
        }

        match find_config_file(&search_locations()) {
            Some(path) => Self::from_file(path),
            None => {
                info!(file_name = CONFIG_FILE_NAME, "config_file_not_found");
                Ok(Self::from_env())
            }
        }
    }

    /// Load configuration from a YAML file. Missing keys take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), "config_file_loaded");
        Ok(config)
    }

    fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            host: env::var("LISTEN_HOST").unwrap_or(defaults.host),

            tcp_port: parse_var("TCP_PORT", defaults.tcp_port),

            stdin_timeout_ms: parse_var("STDIN_TIMEOUT_MS", defaults.stdin_timeout_ms),

            request_timeout_ms: parse_var("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),

            channels: ChannelsConfig {
                telegram: TelegramConfig {
                    enabled: parse_var("TELEGRAM_ENABLED", false),
                    user_id: parse_var("TELEGRAM_USER_ID", 0),
                    bot_key: env::var("TELEGRAM_BOT_KEY").unwrap_or_default(),
                },
                slack: SlackConfig {
                    enabled: parse_var("SLACK_ENABLED", false),
                    user_id: env::var("SLACK_USER_ID").unwrap_or_default(),
                    bot_key: env::var("SLACK_BOT_KEY").unwrap_or_default(),
                },
                file: FileConfig {
                    enabled: parse_var("FILE_ENABLED", false),
                    dir_path: env::var("FILE_DIR_PATH").map(PathBuf::from).unwrap_or_default(),
                },
            },
        }
    }

    /// `host:port` to bind the SMTP stub to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.tcp_port)
    }

    pub fn stdin_timeout(&self) -> Duration {
        Duration::from_millis(self.stdin_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Directories searched for the configuration file, closest to the user
/// first.
fn search_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();

    if let Ok(cwd) = env::current_dir() {
        locations.push(cwd);
    }

    if let Some(dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.canonicalize().ok())
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        locations.push(dir);
    }

    locations.push(PathBuf::from("/etc"));
    locations
}

fn find_config_file(locations: &[PathBuf]) -> Option<PathBuf> {
    locations
        .iter()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|path| path.is_file())
}

/// Parse an environment variable, warning and using `default` when it is
/// set but invalid.
fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_valid() {
        env::set_var("MAILRELAY_TEST_PORT", "2525");
        assert_eq!(parse_var("MAILRELAY_TEST_PORT", 25u16), 2525);
        env::remove_var("MAILRELAY_TEST_PORT");
    }

    #[test]
    fn test_parse_var_invalid_uses_default() {
        env::set_var("MAILRELAY_TEST_BOOL", "yes please");
        assert!(!parse_var("MAILRELAY_TEST_BOOL", false));
        env::remove_var("MAILRELAY_TEST_BOOL");
    }

    #[test]
    fn test_parse_var_default() {
        assert_eq!(parse_var("MAILRELAY_TEST_NONEXISTENT", 7u64), 7);
    }

    #[test]
    fn test_from_yaml() {
        let raw = r#"
host: 0.0.0.0
tcpPort: 2525
requestTimeoutMs: 1500
channels:
  file:
    enabled: true
    dirPath: /tmp/mails
  telegram:
    enabled: true
    userId: 123456789
    botKey: your_telegram_bot_api_key
  slack:
    enabled: false
"#;

        let config = Config::from_yaml(raw).unwrap();

        assert_eq!(config.listen_addr(), "0.0.0.0:2525");
        assert_eq!(config.stdin_timeout(), Duration::from_secs(2));
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
        assert!(config.channels.file.enabled);
        assert_eq!(config.channels.file.dir_path, PathBuf::from("/tmp/mails"));
        assert_eq!(config.channels.telegram.user_id, 123456789);
        assert_eq!(config.channels.telegram.bot_key, "your_telegram_bot_api_key");
        assert!(!config.channels.slack.enabled);
        assert!(config.channels.slack.bot_key.is_empty());
    }

    #[test]
    fn test_request_timeout_default() {
        assert_eq!(Config::default().request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_from_yaml_empty_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/nonexistent/mailrelay.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "tcpPort: [not a port").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn test_find_config_file_first_match() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join(CONFIG_FILE_NAME), "tcpPort: 2525\n").unwrap();

        let locations = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = find_config_file(&locations).unwrap();

        assert_eq!(found, second.path().join(CONFIG_FILE_NAME));
        assert_eq!(Config::from_file(found).unwrap().tcp_port, 2525);
    }
}
