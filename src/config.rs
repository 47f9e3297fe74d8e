//! Deployment constants and the optional TOML settings file.
//!
//! Host, port and timing defaults are compile-time constants. A settings
//! file is read only when one is passed explicitly on the command line;
//! every key in it is optional.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_BIND: &str = "0.0.0.0:8765";
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8765";
pub const DEFAULT_USERNAME: &str = "Anonymous";

/// Interval between client redraws.
pub const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

/// Capacity of the client's outgoing message queue.
pub const OUTBOX_CAPACITY: usize = 64;

/// Maximum characters accepted on one input line.
pub const INPUT_MAX_CHARS: usize = 100;

/// Rows reserved at the bottom of the screen for the input box.
pub const INPUT_BOX_HEIGHT: u16 = 3;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid bind address {0:?}")]
    InvalidBind(String),
}

/// Contents of a settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub redraw_interval_ms: Option<u64>,
    pub outbox_capacity: Option<usize>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Load from `path` if given, otherwise return defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl ServerConfig {
    /// Resolve from a CLI override, then the settings file, then the default.
    pub fn resolve(bind: Option<SocketAddr>, settings: &ServerSection) -> Result<Self, ConfigError> {
        let bind = match (bind, settings.bind.as_deref()) {
            (Some(addr), _) => addr,
            (None, Some(s)) => s
                .parse()
                .map_err(|_| ConfigError::InvalidBind(s.to_string()))?,
            (None, None) => default_bind(),
        };
        Ok(Self { bind })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub username: String,
    pub redraw_interval: Duration,
    pub outbox_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            redraw_interval: REDRAW_INTERVAL,
            outbox_capacity: OUTBOX_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Resolve from CLI overrides, then the settings file, then defaults.
    pub fn resolve(
        username: Option<String>,
        server_url: Option<String>,
        settings: &ClientSection,
    ) -> Self {
        let defaults = Self::default();
        Self {
            server_url: server_url
                .or_else(|| settings.server_url.clone())
                .unwrap_or(defaults.server_url),
            username: username
                .or_else(|| settings.username.clone())
                .unwrap_or(defaults.username),
            redraw_interval: settings
                .redraw_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.redraw_interval),
            outbox_capacity: settings
                .outbox_capacity
                .filter(|n| *n > 0)
                .unwrap_or(defaults.outbox_capacity),
        }
    }
}
