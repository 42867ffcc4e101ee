//! Bridge Protocol Definitions
//!
//! Types shared by the lifecycle controller, the method-call bridge and the daemon:
//! connection stages, raw backend tunnel states, statistics and the method-call envelope.

pub mod method;
pub mod stage;

pub use method::{arguments, methods, MethodCall, MethodResult};
pub use stage::{ConnectionStage, Stats, TunnelState, UnknownStage};

/// Name of the method channel the host shell invokes commands on
pub const METHOD_CHANNEL_NAME: &str = "billion.group.wireguard_flutter/wgcontrol";

/// Name of the event channel stage strings are published on
pub const EVENT_CHANNEL_NAME: &str = "billion.group.wireguard_flutter/wgstage";

/// Request code used when asking the OS for tunnel creation consent
pub const PERMISSIONS_REQUEST_CODE: i32 = 10014;
