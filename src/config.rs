//! Runtime configuration
//!
//! Passed explicitly into the orchestrator; nothing here is global state.
//! Every field has a default, so the binary runs without a config file.

use crate::error::{Error, Result};
use crate::peer::types::ServerConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// Debug builds log verbosely, release builds only warnings.
#[cfg(debug_assertions)]
pub const DEFAULT_LOG_LEVEL: &str = "debug";

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_LEVEL: &str = "warn";

pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8000/ws";

pub static DEFAULT_ICE_SERVERS: Lazy<Vec<ServerConfig>> = Lazy::new(|| {
    vec![
        ServerConfig::stun("stun:stun.l.google.com:19302"),
        ServerConfig::stun("stun:stun1.l.google.com:19302"),
    ]
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Relay websocket endpoint (`ws://` or `wss://`)
    pub relay_url: String,
    pub connect_timeout_secs: u64,
    /// Label of the data channel the host opens for each peer
    pub data_channel_label: String,
    pub log_level: String,
    pub ice_servers: Vec<ServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.into(),
            connect_timeout_secs: 10,
            data_channel_label: "data".into(),
            log_level: DEFAULT_LOG_LEVEL.into(),
            ice_servers: DEFAULT_ICE_SERVERS.clone(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.relay_url.is_empty() {
            return Err(Error::Config("relay_url cannot be empty".into()));
        }
        if !(self.relay_url.starts_with("ws://") || self.relay_url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "relay_url must use ws:// or wss://, got {}",
                self.relay_url
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config("connect_timeout_secs must be positive".into()));
        }
        if self.data_channel_label.is_empty() {
            return Err(Error::Config("data_channel_label cannot be empty".into()));
        }
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(Error::Config("ICE server URL cannot be empty".into()));
            }
            if server.r#type != "stun" && server.r#type != "turn" {
                return Err(Error::Config(format!(
                    "ICE server type must be stun or turn, got {}",
                    server.r#type
                )));
            }
            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none())
            {
                return Err(Error::Config(format!(
                    "TURN server {} requires username and credential",
                    server.url
                )));
            }
        }
        Ok(())
    }
}
