use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::client::bridge::DEFAULT_BRIDGE_ADDRESS;
use crate::client::connection::{ConnectOptions, MAX_USERNAME_LEN};
use crate::config::paths::ProjectPaths;

/// Placeholder host; left unchanged it almost certainly points nowhere useful
pub const DEFAULT_HOST: &str = "localhost";

/// Upper bound for every configured interval or delay
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

pub const ENV_USERNAME: &str = "BOT_USERNAME";
pub const ENV_HOST: &str = "SERVER_HOST";
pub const ENV_PORT: &str = "SERVER_PORT";
pub const ENV_VERSION: &str = "MINECRAFT_VERSION";
pub const ENV_BRIDGE: &str = "BRIDGE_ADDR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 25565,
        }
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub username: String,
    /// Protocol version; unset, empty, `auto` or `false` mean auto-detect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            username: "LoiterBot".to_string(),
            version: None,
        }
    }
}

impl IdentityConfig {
    /// The pinned protocol version, or `None` for auto-detection
    pub fn protocol_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("auto") && *v != "false")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Seconds between movement attempts
    pub interval_secs: u64,
    /// How long a movement key is held down
    pub duration_ms: u64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            duration_ms: 1000,
        }
    }
}

impl MovementConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Seconds between chat commands
    pub interval_secs: u64,
    /// Sent in order, starting over after the last one
    pub commands: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let commands = [
            "/lagg clear",
            "/lagg gc",
            "/save-all",
            "/reload confirm",
            "/say Server cleanup complete!",
            "/memory",
            "/lagg reload",
            "/lagg killmobs",
            "/lagg halt",
            "/lagg area 1000",
        ];

        Self {
            interval_secs: 60,
            commands: commands.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl ChatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Fixed-delay reconnection. There is no backoff and no attempt limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub delay_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { delay_secs: 5 }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// host:port of the client library bridge
    pub address: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_BRIDGE_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub movement: MovementConfig,
    pub chat: ChatConfig,
    pub reconnect: ReconnectConfig,
    pub bridge: BridgeConfig,
}

impl BotConfig {
    /// Default location of the config file, if a home directory exists
    pub fn config_path() -> Option<PathBuf> {
        ProjectPaths::new("loiter").map(|p| p.config_dir().join("config.toml"))
    }

    /// Load from `path`, which must exist, or from the default location if
    /// present, falling back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_file(path),
            None => match Self::config_path() {
                Some(default_path) if default_path.exists() => Self::load_file(&default_path),
                _ => {
                    info!(target: "config", "No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(target: "config", "Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    ///
    /// An unparsable port keeps the current value.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(username) = lookup(ENV_USERNAME) {
            self.identity.username = username;
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            match port.trim().parse::<u16>() {
                Ok(port) if port != 0 => self.server.port = port,
                _ => {
                    warn!(target: "config", "Ignoring {}={:?}, keeping port {}", ENV_PORT, port, self.server.port);
                }
            }
        }
        if let Some(version) = lookup(ENV_VERSION) {
            self.identity.version = Some(version);
        }
        if let Some(address) = lookup(ENV_BRIDGE) {
            self.bridge.address = address;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server host is empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server port must not be 0".to_string()));
        }
        let username = &self.identity.username;
        if username.is_empty() || username.len() > MAX_USERNAME_LEN {
            return Err(ConfigError::Invalid(format!(
                "username must be 1-{} characters",
                MAX_USERNAME_LEN
            )));
        }
        check_secs("movement.interval_secs", self.movement.interval_secs)?;
        check_secs("chat.interval_secs", self.chat.interval_secs)?;
        check_secs("reconnect.delay_secs", self.reconnect.delay_secs)?;
        if self.movement.duration_ms == 0 || self.movement.duration_ms > MAX_INTERVAL_SECS * 1000 {
            return Err(ConfigError::Invalid(format!(
                "movement.duration_ms must be between 1 and {}",
                MAX_INTERVAL_SECS * 1000
            )));
        }
        if self.chat.commands.is_empty() {
            return Err(ConfigError::Invalid(
                "chat command list is empty".to_string(),
            ));
        }
        if self.bridge.address.trim().is_empty() {
            return Err(ConfigError::Invalid("bridge address is empty".to_string()));
        }
        Ok(())
    }

    pub fn is_default_host(&self) -> bool {
        self.server.host == DEFAULT_HOST
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            host: self.server.host.clone(),
            port: self.server.port,
            username: self.identity.username.clone(),
            version: self.identity.protocol_version().map(str::to_string),
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn check_secs(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_INTERVAL_SECS {
        return Err(ConfigError::Invalid(format!(
            "{} must be between 1 and {}",
            name, MAX_INTERVAL_SECS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_default_host());
        assert_eq!(config.chat.commands.len(), 10);
        assert_eq!(config.chat.interval(), Duration::from_secs(60));
        assert_eq!(config.movement.interval(), Duration::from_secs(30));
        assert_eq!(config.movement.duration(), Duration::from_millis(1000));
        assert_eq!(config.reconnect.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BotConfig::default();
        config.apply_env(env(&[
            (ENV_USERNAME, "Wanderer"),
            (ENV_HOST, "mc.example.net"),
            (ENV_PORT, "13412"),
            (ENV_VERSION, "1.20.4"),
        ]));

        assert_eq!(config.identity.username, "Wanderer");
        assert_eq!(config.server.host, "mc.example.net");
        assert_eq!(config.server.port, 13412);
        assert_eq!(config.identity.protocol_version(), Some("1.20.4"));
        assert!(!config.is_default_host());
    }

    #[test]
    fn test_bad_port_keeps_default() {
        let mut config = BotConfig::default();
        config.apply_env(env(&[(ENV_PORT, "not-a-port")]));
        assert_eq!(config.server.port, 25565);

        config.apply_env(env(&[(ENV_PORT, "0")]));
        assert_eq!(config.server.port, 25565);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = BotConfig::default();
        config.apply_env(env(&[(ENV_HOST, ""), (ENV_USERNAME, "")]));
        assert_eq!(config, BotConfig::default());
    }

    #[test]
    fn test_version_auto_detect_sentinels() {
        for value in ["false", "auto", "AUTO", "  "] {
            let identity = IdentityConfig {
                username: "bot".to_string(),
                version: Some(value.to_string()),
            };
            assert_eq!(identity.protocol_version(), None, "value {:?}", value);
        }
    }

    #[test]
    fn test_validate_rejects_empty_commands_and_zero_intervals() {
        let mut config = BotConfig::default();
        config.chat.commands.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = BotConfig::default();
        config.chat.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.movement.duration_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.reconnect.delay_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_huge_durations() {
        let mut config = BotConfig::default();
        config.chat.interval_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = BotConfig::default();
        config.movement.interval_secs = MAX_INTERVAL_SECS + 1;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.reconnect.delay_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.movement.duration_ms = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.chat.interval_secs = MAX_INTERVAL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
host = "play.example.org"

[chat]
interval_secs = 120
commands = ["/say hi", "/list"]
"#
        )
        .unwrap();

        let config = BotConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.host, "play.example.org");
        assert_eq!(config.server.port, 25565);
        assert_eq!(config.chat.interval_secs, 120);
        assert_eq!(config.chat.commands, vec!["/say hi", "/list"]);
        assert_eq!(config.movement, MovementConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(
            BotConfig::load(Some(&path)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nhost = ").unwrap();
        assert!(matches!(
            BotConfig::load_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_toml_output_reloads() {
        let config = BotConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: BotConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_connect_options_carry_identity() {
        let mut config = BotConfig::default();
        config.identity.version = Some("auto".to_string());
        let options = config.connect_options();
        assert_eq!(options.host, DEFAULT_HOST);
        assert_eq!(options.username, "LoiterBot");
        assert_eq!(options.version, None);
    }
}
