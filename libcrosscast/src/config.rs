//! Configuration management for Crosscast

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Environment variable holding the credential vault key
pub const ENCRYPTION_KEY_ENV: &str = "CROSSCAST_ENCRYPTION_KEY";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "CROSSCAST_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    pub microblog: Option<MicroblogConfig>,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    /// File containing the vault key; the environment variable wins when both are set
    pub key_file: Option<String>,
}

/// Platform-wide request limits enforced before any network call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_max_media")]
    pub max_media: usize,
}

fn default_max_content_length() -> usize {
    280
}

fn default_max_media() -> usize {
    4
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_content_length: default_max_content_length(),
            max_media: default_max_media(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Upper bound for a single platform attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl PublishConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Application-level credentials for the microblog platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroblogConfig {
    #[serde(default)]
    pub consumer_key: String,
    #[serde(default)]
    pub consumer_secret: String,
    #[serde(default)]
    pub callback_url: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    "https://api.twitter.com".to_string()
}

impl MicroblogConfig {
    /// All application credentials are present
    pub fn is_complete(&self) -> bool {
        !self.consumer_key.trim().is_empty()
            && !self.consumer_secret.trim().is_empty()
            && !self.callback_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relays")]
    pub relays: Vec<String>,

    /// How long to wait for any one relay to accept a note
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

fn default_relays() -> Vec<String> {
    vec![
        "wss://relay.damus.io".to_string(),
        "wss://nos.lol".to_string(),
        "wss://relay.snort.social".to_string(),
        "wss://relay.nostr.band".to_string(),
    ]
}

fn default_send_timeout_secs() -> u64 {
    5
}

impl RelayConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file yields [`Config::default_config`].
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default_config());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.publish.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "publish.timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.relay.send_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "relay.send_timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Per-relay wait, kept to half the attempt budget so a stalled relay
    /// cannot outlast the attempt that is broadcasting to it
    pub fn relay_send_timeout(&self) -> Duration {
        self.relay.send_timeout().min(self.publish.timeout() / 2)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/crosscast/crosscast.db".to_string(),
            },
            vault: VaultConfig {
                key_file: Some("~/.config/crosscast/vault.key".to_string()),
            },
            limits: LimitsConfig::default(),
            publish: PublishConfig::default(),
            microblog: None,
            relay: RelayConfig::default(),
        }
    }

    /// Resolve the credential vault key
    ///
    /// `CROSSCAST_ENCRYPTION_KEY` takes precedence over `vault.key_file`.
    /// There is no fallback key: when neither source yields a non-empty
    /// value the lookup fails.
    pub fn resolve_encryption_key(&self) -> Result<SecretString> {
        if let Ok(key) = std::env::var(ENCRYPTION_KEY_ENV) {
            if !key.is_empty() {
                tracing::debug!("Using vault key from {}", ENCRYPTION_KEY_ENV);
                return Ok(SecretString::new(key.into()));
            }
        }

        if let Some(key_file) = &self.vault.key_file {
            let path = expand_path(key_file);
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let key = content.trim().to_string();
                    if !key.is_empty() {
                        tracing::debug!("Using vault key from {:?}", path);
                        return Ok(SecretString::new(key.into()));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ConfigError::ReadError(e).into()),
            }
        }

        Err(ConfigError::MissingEncryptionKey.into())
    }
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(
        shellexpand::full(path)
            .map(|p| p.to_string())
            .unwrap_or_else(|_| path.to_string()),
    )
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(expand_path(&path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrosscastError;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
        [database]
        path = "/tmp/crosscast-test.db"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.limits.max_content_length, 280);
        assert_eq!(config.limits.max_media, 4);
        assert_eq!(config.publish.timeout(), Duration::from_secs(10));
        assert!(config.microblog.is_none());
        assert_eq!(config.relay.relays.len(), 4);
        assert_eq!(config.relay.send_timeout(), Duration::from_secs(5));
        assert_eq!(config.relay_send_timeout(), Duration::from_secs(5));
        assert!(config.vault.key_file.is_none());
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        for section in ["[publish]\ntimeout_secs = 0", "[relay]\nsend_timeout_secs = 0"] {
            let result = Config::parse(&format!("{}\n{}\n", MINIMAL, section));
            assert!(
                matches!(
                    result,
                    Err(CrosscastError::Config(ConfigError::InvalidValue { .. }))
                ),
                "{} should be rejected",
                section
            );
        }
    }

    #[test]
    fn test_full_config_parses() {
        let config = Config::parse(
            r#"
            [database]
            path = "~/crosscast.db"

            [vault]
            key_file = "~/.config/crosscast/vault.key"

            [limits]
            max_content_length = 500
            max_media = 2

            [publish]
            timeout_secs = 3

            [microblog]
            consumer_key = "ck"
            consumer_secret = "cs"
            callback_url = "https://example.org/callback"

            [relay]
            relays = ["wss://relay.example"]
            "#,
        )
        .unwrap();

        assert_eq!(config.limits.max_content_length, 500);
        assert_eq!(config.limits.max_media, 2);
        assert_eq!(config.publish.timeout_secs, 3);
        assert_eq!(config.relay_send_timeout(), Duration::from_millis(1500));
        let microblog = config.microblog.unwrap();
        assert!(microblog.is_complete());
        assert_eq!(microblog.api_base, "https://api.twitter.com");
        assert_eq!(config.relay.relays, vec!["wss://relay.example".to_string()]);
    }

    #[test]
    fn test_incomplete_microblog_config() {
        let config = Config::parse(
            r#"
            [database]
            path = "x.db"

            [microblog]
            consumer_key = "ck"
            "#,
        )
        .unwrap();

        assert!(!config.microblog.unwrap().is_complete());
    }

    #[test]
    fn test_missing_database_section_is_rejected() {
        let result = Config::parse("[limits]\nmax_media = 1\n");
        assert!(matches!(
            result,
            Err(CrosscastError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_load_from_missing_path() {
        let result = Config::load_from_path(Path::new("/nonexistent/crosscast/config.toml"));
        assert!(matches!(
            result,
            Err(CrosscastError::Config(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_encryption_key_from_env() {
        std::env::set_var(ENCRYPTION_KEY_ENV, "env-supplied-key-0123456789");
        let config = Config::parse(MINIMAL).unwrap();

        let key = config.resolve_encryption_key().unwrap();
        assert_eq!(key.expose_secret(), "env-supplied-key-0123456789");

        std::env::remove_var(ENCRYPTION_KEY_ENV);
    }

    #[test]
    #[serial]
    fn test_encryption_key_from_file() {
        std::env::remove_var(ENCRYPTION_KEY_ENV);
        let temp_dir = TempDir::new().unwrap();
        let key_path = temp_dir.path().join("vault.key");
        std::fs::write(&key_path, "file-supplied-key-0123456789\n").unwrap();

        let mut config = Config::parse(MINIMAL).unwrap();
        config.vault.key_file = Some(key_path.to_str().unwrap().to_string());

        let key = config.resolve_encryption_key().unwrap();
        assert_eq!(key.expose_secret(), "file-supplied-key-0123456789");
    }

    #[test]
    #[serial]
    fn test_encryption_key_fails_closed() {
        std::env::remove_var(ENCRYPTION_KEY_ENV);
        let mut config = Config::parse(MINIMAL).unwrap();
        config.vault.key_file = Some("/nonexistent/crosscast/vault.key".to_string());

        let result = config.resolve_encryption_key();
        assert!(matches!(
            result,
            Err(CrosscastError::Config(ConfigError::MissingEncryptionKey))
        ));
    }

    #[test]
    #[serial]
    fn test_empty_env_key_is_ignored() {
        std::env::set_var(ENCRYPTION_KEY_ENV, "");
        let config = Config::parse(MINIMAL).unwrap();

        assert!(config.resolve_encryption_key().is_err());

        std::env::remove_var(ENCRYPTION_KEY_ENV);
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_from_env() {
        std::env::set_var(CONFIG_PATH_ENV, "/tmp/crosscast/custom.toml");
        let path = resolve_config_path().unwrap();
        assert_eq!(path, PathBuf::from("/tmp/crosscast/custom.toml"));
        std::env::remove_var(CONFIG_PATH_ENV);
    }

    #[test]
    #[serial]
    fn test_load_without_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var(CONFIG_PATH_ENV, temp_dir.path().join("absent.toml"));

        let config = Config::load().unwrap();
        assert_eq!(config.database.path, "~/.local/share/crosscast/crosscast.db");
        assert!(config.microblog.is_none());

        std::env::remove_var(CONFIG_PATH_ENV);
    }
}
