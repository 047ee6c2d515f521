//! Proxy Configuration
//!
//! User-facing proxy settings, stored as TOML:
//!
//! ```toml
//! enabled = true
//! timezone_enabled = true
//! server = "127.0.0.1:1080"
//! whitelist = """
//! # never proxied
//! example.com
//! *.lan
//! """
//! ```

use fos_timezone::whitelist::{parse_whitelist, Pattern};
use fos_timezone::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// SOCKS5 endpoint (host + port)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Parse `host:port`.
    ///
    /// The port must be digits only and within 1-65535.
    pub fn parse(server: &str) -> Result<Self, ConfigError> {
        let mut parts = server.trim().split(':');
        let host = parts.next().unwrap_or_default().trim();
        let port = parts.next().unwrap_or_default().trim();

        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let valid = !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit());
        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| valid && *p > 0)
            .ok_or_else(|| ConfigError::InvalidPort(port.to_string()))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Complete proxy configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route traffic through the proxy
    pub enabled: bool,
    /// Spoof page timezones (forced off when the proxy is off)
    pub timezone_enabled: bool,
    /// SOCKS5 server as `host:port`
    pub server: String,
    /// Raw whitelist text, one entry per line
    pub whitelist: String,
}

impl ProxyConfig {
    /// Parse TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Validate configuration.
    ///
    /// A disabled proxy needs no server; an enabled one needs a valid
    /// `host:port`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled {
            Endpoint::parse(&self.server)?;
        }
        Ok(())
    }

    /// Proxy endpoint, if enabled and valid
    pub fn endpoint(&self) -> Result<Option<Endpoint>, ConfigError> {
        if !self.enabled {
            return Ok(None);
        }
        Endpoint::parse(&self.server).map(Some)
    }

    /// Parsed whitelist entries
    pub fn whitelist(&self) -> Vec<Pattern> {
        parse_whitelist(&self.whitelist)
    }

    /// Settings view consumed by the timezone core
    pub fn settings(&self) -> Settings {
        Settings {
            enabled: self.enabled,
            timezone_enabled: self.timezone_enabled,
            whitelist: self.whitelist(),
        }
        .normalized()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Host cannot be empty")]
    EmptyHost,

    #[error("Port must be 1-65535 (got {0:?})")]
    InvalidPort(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
