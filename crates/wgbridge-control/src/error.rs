//! Controller errors

use std::time::Duration;
use thiserror::Error;
use wgbridge_backend::{AcquireError, BackendError};
use wgbridge_config::ConfigParseError;
use wgbridge_proto::TunnelState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Invalid tunnel name: {0:?}")]
    InvalidName(String),

    #[error("Permission to create a tunnel interface has not been granted")]
    PermissionDenied,

    #[error("Invalid tunnel configuration: {0}")]
    ConfigParse(#[from] ConfigParseError),

    #[error("Tunnel is not running")]
    NotRunning,

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Tunnel has not been initialized")]
    NotInitialized,

    #[error("Backend not available after {0:?}")]
    BackendUnavailable(Duration),

    #[error("Another tunnel operation is in progress")]
    Busy,

    #[error("Tunnel did not become {state} within {after:?}")]
    Timeout { state: TunnelState, after: Duration },
}

impl ControllerError {
    /// Stable error code reported to the host shell
    pub fn code(&self) -> &'static str {
        match self {
            ControllerError::InvalidName(_) => "INVALID_NAME",
            ControllerError::PermissionDenied => "PERMISSION_DENIED",
            ControllerError::ConfigParse(_) => "CONFIG_PARSE",
            ControllerError::NotRunning => "NOT_RUNNING",
            ControllerError::Backend(err) => err.reason(),
            ControllerError::NotInitialized => "NOT_INITIALIZED",
            ControllerError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            ControllerError::Busy => "BUSY",
            ControllerError::Timeout { .. } => "TIMEOUT",
        }
    }
}

impl From<AcquireError> for ControllerError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Failed(err) => ControllerError::Backend(err),
            AcquireError::Unavailable(wait) => ControllerError::BackendUnavailable(wait),
        }
    }
}
