//! Configuration File
//!
//! ```json
//! {
//!   "http":  { "enabled": true, "listenAddress": "0.0.0.0", "port": 6380 },
//!   "redis": { "protocol": "tcp", "host": "127.0.0.1", "port": 6379,
//!              "password": "", "disableInfo": false }
//! }
//! ```
//!
//! Every field is optional; anything left out takes the default shown above.
//! Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Path tried when no `--config` flag is given.
pub const DEFAULT_CONFIG_PATH: &str = "flashgate.conf.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store protocol \"unix\" is not supported, use \"tcp\"")]
    UnsupportedProtocol,

    #[error("Store protocol must be one of \"tcp\" or \"unix\", got {0:?}")]
    InvalidProtocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpConfig {
    pub enabled: bool,
    pub listen_address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_address: "0.0.0.0".to_string(),
            port: 6380,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub disable_info: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            protocol: "tcp".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            disable_info: false,
        }
    }
}

impl StoreConfig {
    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The password, if one is set.
    pub fn password(&self) -> Option<String> {
        Some(self.password.clone()).filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    #[serde(rename = "redis")]
    pub store: StoreConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_json(&data).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.store.protocol.as_str() {
            "tcp" => Ok(()),
            "unix" => Err(ConfigError::UnsupportedProtocol),
            other => Err(ConfigError::InvalidProtocol(other.to_string())),
        }
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http.listen_address, self.http.port)
    }
}
