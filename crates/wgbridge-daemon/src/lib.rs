//! Daemon exposing the bridge over localhost TCP
//!
//! Each frame is a JSON document preceded by its length (4 bytes, big-endian). A connection
//! sends [`DaemonRequest`]s and reads one [`DaemonResponse`] per request. After `Listen`, the
//! connection is dedicated to the stage stream and receives `Stage` frames until it sends
//! `Cancel` or closes.

pub mod client;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod service;

pub use client::{DaemonClient, StageSubscription};
pub use error::DaemonError;
pub use protocol::{DaemonRequest, DaemonResponse, DaemonStatus};
pub use service::{DaemonService, ShutdownHandle};

/// Default port for daemon IPC
pub const DAEMON_PORT: u16 = 19275;

/// Default daemon address
pub fn daemon_addr() -> String {
    format!("127.0.0.1:{}", DAEMON_PORT)
}
