//! Connection stages and raw tunnel states

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Externally observable lifecycle stage of the tunnel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStage {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Authenticating,
    /// Nothing known yet
    #[default]
    None,
}

impl ConnectionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStage::Connecting => "connecting",
            ConnectionStage::Connected => "connected",
            ConnectionStage::Disconnecting => "disconnecting",
            ConnectionStage::Disconnected => "disconnected",
            ConnectionStage::Authenticating => "authenticating",
            ConnectionStage::None => "none",
        }
    }

    /// Stages emitted by the controller while waiting on the backend
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ConnectionStage::Connecting | ConnectionStage::Disconnecting
        )
    }
}

impl fmt::Display for ConnectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown connection stage: {0}")]
pub struct UnknownStage(pub String);

impl FromStr for ConnectionStage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connecting" => Ok(ConnectionStage::Connecting),
            "connected" => Ok(ConnectionStage::Connected),
            "disconnecting" => Ok(ConnectionStage::Disconnecting),
            "disconnected" => Ok(ConnectionStage::Disconnected),
            "authenticating" => Ok(ConnectionStage::Authenticating),
            "none" => Ok(ConnectionStage::None),
            other => Err(UnknownStage(other.to_string())),
        }
    }
}

/// Raw tunnel state as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TunnelState {
    Up,
    Down,
    Toggle,
}

impl TunnelState {
    /// Stage a confirmed backend state is reported as
    pub fn stage(self) -> ConnectionStage {
        match self {
            TunnelState::Up => ConnectionStage::Connected,
            TunnelState::Down => ConnectionStage::Disconnected,
            TunnelState::Toggle => ConnectionStage::Authenticating,
        }
    }
}

impl From<TunnelState> for ConnectionStage {
    fn from(state: TunnelState) -> Self {
        state.stage()
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelState::Up => f.write_str("UP"),
            TunnelState::Down => f.write_str("DOWN"),
            TunnelState::Toggle => f.write_str("TOGGLE"),
        }
    }
}

/// Cumulative byte counters for a tunnel, as returned by `getStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Bytes received
    pub total_download: i64,
    /// Bytes sent
    pub total_upload: i64,
}

impl Stats {
    pub fn new(total_download: i64, total_upload: i64) -> Self {
        Self {
            total_download,
            total_upload,
        }
    }

    /// Encode as the JSON object the host shell expects
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
