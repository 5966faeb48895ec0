//! Daemon configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via OBEXD_CONFIG)
//! 3. Environment variables

use bytes::Bytes;
use obex_transport::config::{MAX_MTU, MIN_MTU};
use obex_transport::SocketConfig;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Packet engine configuration.
    pub socket: SocketSettings,
    /// Object Push service configuration.
    pub push: PushConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("OBEXD_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.socket.apply_env_overrides();
        self.push.apply_env_overrides();
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket.validate()?;
        self.push.validate()
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 6500)),
            max_connections: 64,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("OBEXD_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(max) = std::env::var("OBEXD_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }
}

/// Packet engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketSettings {
    /// Largest packet accepted from clients.
    pub mtu: u16,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            mtu: SocketConfig::default().mtu,
        }
    }
}

impl SocketSettings {
    fn apply_env_overrides(&mut self) {
        if let Ok(mtu) = std::env::var("OBEXD_MTU") {
            if let Ok(n) = mtu.parse() {
                self.mtu = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_MTU..=MAX_MTU).contains(&self.mtu) {
            return Err(ConfigError::ValidationError(format!(
                "socket.mtu must be between {} and {}, got {}",
                MIN_MTU, MAX_MTU, self.mtu
            )));
        }
        Ok(())
    }

    /// Packet engine configuration for each connection.
    pub fn socket_config(&self) -> SocketConfig {
        SocketConfig::new().with_mtu(self.mtu)
    }
}

/// Object Push service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Directory received objects are stored in.
    pub inbox_dir: PathBuf,
    /// vCard served to clients requesting the default business card.
    pub business_card: Option<PathBuf>,
    /// Largest object accepted, in bytes.
    pub max_object_bytes: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            inbox_dir: PathBuf::from("./inbox"),
            business_card: None,
            max_object_bytes: 64 * 1024 * 1024,
        }
    }
}

impl PushConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("OBEXD_INBOX") {
            self.inbox_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("OBEXD_BUSINESS_CARD") {
            self.business_card = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        if let Ok(max) = std::env::var("OBEXD_MAX_OBJECT_BYTES") {
            if let Ok(n) = max.parse() {
                self.max_object_bytes = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_object_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "push.max_object_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads the configured business card, if any.
    pub fn load_business_card(&self) -> Result<Option<Bytes>, ConfigError> {
        match &self.business_card {
            Some(path) => std::fs::read(path)
                .map(|data| Some(Bytes::from(data)))
                .map_err(|e| ConfigError::IoError(path.clone(), e)),
            None => Ok(None),
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
