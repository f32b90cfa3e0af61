//! Probe configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/rentchat/probe.toml`
//! - Windows: `%APPDATA%/rentchat/probe.toml`
//!
//! A path given on the command line takes precedence. The access token may
//! also come from the `RENTCHAT_TOKEN` environment variable, which wins over
//! the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use rentchat_connection::ConnectionConfig;

/// Probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bearer token for the broker. Overridden by [`TOKEN_ENV`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Chat room to join.
    #[serde(default = "default_room")]
    pub room: String,

    /// Sender id stamped on outgoing messages.
    #[serde(default = "default_sender")]
    pub sender_id: String,

    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Environment variable holding the access token.
pub const TOKEN_ENV: &str = "RENTCHAT_TOKEN";

fn default_room() -> String {
    "1".into()
}

fn default_sender() -> String {
    "probe".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: None,
            room: default_room(),
            sender_id: default_sender(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl Config {
    /// Current access token: the environment first, then the file.
    pub fn resolve_token(&self) -> Option<String> {
        token_from(std::env::var(TOKEN_ENV).ok(), self.token.as_deref())
    }

    /// Loads configuration from `path`, or the default location.
    ///
    /// A missing file at the default location is created with defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let path = config_path();
                if path.exists() {
                    Self::read(&path)
                } else {
                    let config = Config::default();
                    config.save(&path)?;
                    Ok(config)
                }
            }
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        // Fail early on a bad base URL rather than on first connect.
        config.connection.endpoint()?;
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("rentchat")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config").join("rentchat")
    }
}

fn token_from(env: Option<String>, file: Option<&str>) -> Option<String> {
    env.filter(|t| !t.trim().is_empty())
        .or_else(|| file.map(str::to_string))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    config_dir().join("probe.toml")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.token, None);
        assert_eq!(config.room, "1");
        assert_eq!(config.connection.reconnect.max_attempts, 5);
    }

    #[test]
    fn config_partial_toml() {
        let toml_str = r#"
room = "42"
token = "jwt-abc"

[connection]
base_url = "https://rent.example.com"

[connection.reconnect]
max_attempts = 2
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.room, "42");
        assert_eq!(config.token.as_deref(), Some("jwt-abc"));
        assert_eq!(config.connection.base_url, "https://rent.example.com");
        assert_eq!(config.connection.reconnect.max_attempts, 2);
        assert_eq!(config.connection.reconnect.base_delay, Duration::from_secs(1));
        assert_eq!(config.connection.endpoint_path, "/ws");
    }

    #[test]
    fn config_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("probe.toml");

        let config = Config {
            room: "7".into(),
            connection: ConnectionConfig::new("http://127.0.0.1:9000"),
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.room, "7");
        assert_eq!(loaded.connection, config.connection);
    }

    #[test]
    fn load_rejects_bad_base_url() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("probe.toml");
        std::fs::write(&path, "[connection]\nbase_url = \"ftp://example.com\"\n").unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn environment_token_wins_over_file() {
        assert_eq!(
            token_from(Some("from-env".into()), Some("from-file")).as_deref(),
            Some("from-env")
        );
        assert_eq!(token_from(None, Some(" from-file ")).as_deref(), Some("from-file"));
        assert_eq!(token_from(Some("  ".into()), Some("from-file")).as_deref(), Some("from-file"));
        assert_eq!(token_from(None, Some("")), None);
        assert_eq!(token_from(None, None), None);
    }

    #[test]
    fn config_path_not_empty() {
        assert!(config_path().to_string_lossy().contains("rentchat"));
    }
}
