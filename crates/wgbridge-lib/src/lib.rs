//! wgbridge - WireGuard tunnel bridge
//!
//! Exposes a tunnel backend to an application shell through a method-call / event-stream
//! interface. The shell sends [`MethodCall`]s (`initialize`, `start`, `stop`, `getStats`,
//! `stage`, `checkPermission`) to a [`Bridge`] and listens for lowercase stage strings.
//!
//! This crate re-exports the individual wgbridge crates so applications only depend on one.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use wgbridge_lib::{
//!     methods, AlwaysGranted, BackendProvider, Bridge, ControllerConfig, LifecycleController,
//!     MemoryBackend, MethodCall,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let controller = LifecycleController::new(
//!         BackendProvider::ready(Arc::new(MemoryBackend::new())),
//!         Arc::new(AlwaysGranted),
//!         ControllerConfig::default(),
//!     );
//!     let bridge = Bridge::new(Arc::new(controller));
//!
//!     let (tx, mut stages) = tokio::sync::mpsc::unbounded_channel();
//!     bridge.listen(Arc::new(tx));
//!
//!     let result = bridge
//!         .handle(MethodCall::new(
//!             methods::INITIALIZE,
//!             serde_json::json!({ "localizedDescription": "wg0" }),
//!         ))
//!         .await;
//!     assert!(result.is_success());
//!
//!     while let Some(stage) = stages.recv().await {
//!         println!("stage: {}", stage);
//!     }
//! }
//! ```

pub mod bridge;

pub use bridge::Bridge;

// Re-export the wire types
pub use wgbridge_proto::{
    arguments, methods, ConnectionStage, MethodCall, MethodResult, Stats, TunnelState,
    EVENT_CHANNEL_NAME, METHOD_CHANNEL_NAME, PERMISSIONS_REQUEST_CODE,
};

// Re-export configuration parsing
pub use wgbridge_config::{ConfigParseError, TunnelConfig};

// Re-export backends
pub use wgbridge_backend::{
    Backend, BackendError, BackendFactory, BackendProvider, MemoryBackend, Statistics, Tunnel,
    WgQuickBackend,
};

// Re-export the lifecycle controller
pub use wgbridge_control::{
    AlwaysGranted, BusyPolicy, ControllerConfig, ControllerError, LifecycleController,
    PermissionProvider, PermissionStatus, PrivilegedProcess, StageListener, SubscriptionId,
};
