//! Tunnel connection-lifecycle control
//!
//! [`LifecycleController`] owns the single managed tunnel, the permission gate, the memoized
//! backend handle and the stage relay. It serializes connect/disconnect requests and turns the
//! backend's asynchronous confirmations into an ordered stream of [`ConnectionStage`] events.

pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod permission;
pub mod relay;
pub mod tracker;

pub use config::{BusyPolicy, ControllerConfig};
pub use controller::LifecycleController;
pub use error::ControllerError;
pub use identity::{ManagedTunnel, TunnelIdentity};
pub use permission::{
    AlwaysGranted, PermissionGate, PermissionProvider, PermissionStatus, PrivilegedProcess,
};
pub use relay::{StageListener, StageRelay, SubscriptionId};
pub use tracker::StageTracker;

pub use wgbridge_proto::ConnectionStage;
