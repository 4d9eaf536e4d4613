//! Configuration loading for collab-client.
//!
//! Configuration is loaded from a TOML file. Every section and field is
//! optional; anything missing takes its default.

use collab_core::ReconnectPolicy;
use collab_types::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Root configuration for a collaboration client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay server endpoint.
    pub server: ServerConfig,
    /// Automatic reconnection.
    pub reconnect: ReconnectConfig,
    /// Outbound throttling.
    pub throttle: ThrottleConfig,
    /// Presence behaviour.
    pub presence: PresenceConfig,
    /// Share links.
    pub share: ShareConfig,
}

/// Relay server endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host name or address (default: localhost).
    #[serde(default = "default_host")]
    pub host: String,
    /// Port (default: 8080).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Use `wss://` instead of `ws://` (default: false).
    #[serde(default)]
    pub secure: bool,
    /// Path prefix; the session id is appended as the last segment
    /// (default: /ws).
    #[serde(default = "default_path")]
    pub path: String,
}

/// Automatic reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Attempts after an unexpected close (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay unit in milliseconds; attempt n waits n times this (default: 2000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Outbound throttling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum gap between two sends of one category (default: 100).
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

/// Presence behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// A user with no activity for this long is shown as idle (default: 60).
    #[serde(default = "default_idle_after_secs")]
    pub idle_after_secs: u64,
    /// Answer joins with a snapshot when this client is the designated
    /// responder (default: true).
    #[serde(default = "default_answer_joins")]
    pub answer_joins: bool,
}

/// Share links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Base URL of the web app (default: http://localhost:3000).
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

// Default value functions
fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_max_attempts() -> u32 {
    ReconnectPolicy::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_window_ms() -> u64 {
    100
}

fn default_idle_after_secs() -> u64 {
    60
}

fn default_answer_joins() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
            path: default_path(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            idle_after_secs: default_idle_after_secs(),
            answer_joins: default_answer_joins(),
        }
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    /// Reconnection bounds.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.reconnect.max_attempts,
            Duration::from_millis(self.reconnect.base_delay_ms),
        )
    }

    /// Throttle window.
    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle.window_ms)
    }

    /// Idle threshold.
    pub fn idle_after(&self) -> Duration {
        Duration::from_secs(self.presence.idle_after_secs)
    }

    /// The join link for a session.
    pub fn share_link(&self, session_id: &SessionId) -> Result<String, ConfigError> {
        share_link(&self.share.base_url, session_id)
    }
}

impl ServerConfig {
    /// The endpoint URL for one session and user.
    ///
    /// `{ws|wss}://{host}:{port}{path}/{sessionId}?userId=..&userName=..`, with
    /// every component percent-encoded.
    pub fn endpoint_url(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        user_name: &str,
    ) -> Result<Url, ConfigError> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let base = format!("{scheme}://{}:{}", self.host, self.port);
        let mut url = Url::parse(&base).map_err(|source| ConfigError::InvalidUrl {
            url: base.clone(),
            source,
        })?;

        url.path_segments_mut()
            .map_err(|()| ConfigError::InvalidUrl {
                url: base.clone(),
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            })?
            .clear()
            .extend(self.path.split('/').filter(|s| !s.is_empty()))
            .push(session_id.as_str());
        url.query_pairs_mut()
            .append_pair("userId", user_id.as_str())
            .append_pair("userName", user_name);
        Ok(url)
    }
}

/// `{base_url}/collaborate/{session_id}`, with the session id percent-encoded.
pub fn share_link(base_url: &str, session_id: &SessionId) -> Result<String, ConfigError> {
    let invalid = |source| ConfigError::InvalidUrl {
        url: base_url.to_string(),
        source,
    };
    let mut url = Url::parse(base_url).map_err(invalid)?;
    url.path_segments_mut()
        .map_err(|()| invalid(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .push("collaborate")
        .push(session_id.as_str());
    Ok(url.to_string())
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to render configuration.
    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] toml::ser::Error),
    /// A configured URL does not parse.
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Underlying parse error.
        source: url::ParseError,
    },
}
