//! Daemon request and response messages

use serde::{Deserialize, Serialize};
use wgbridge_lib::{ConnectionStage, MethodCall, MethodResult};

/// Request from client to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonRequest {
    /// Check that the daemon is alive
    Ping,

    /// Run a bridge method
    Invoke { call: MethodCall },

    /// Dedicate this connection to the stage stream
    Listen,

    /// Stop the stage stream started with `Listen`
    Cancel,

    /// Report the outcome of a permission consent flow
    PermissionResult { request_code: i32, granted: bool },

    /// Shut the daemon down
    Shutdown,
}

/// Response from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DaemonResponse {
    /// Success with no data
    Ok,

    Pong(DaemonStatus),

    /// Outcome of an `Invoke`
    Result(MethodResult),

    /// Stage stream started
    Listening,

    /// Stage change (streamed after `Listening`)
    Stage { stage: ConnectionStage },

    Error { message: String },
}

/// Daemon state reported by `Ping`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub uptime_seconds: u64,
    /// Last-known connection stage
    pub stage: ConnectionStage,
    /// Name of the managed tunnel, once initialized
    pub tunnel: Option<String>,
    /// RFC 3339 start time
    pub started_at: String,
}
