//! Backend failure reasons

use thiserror::Error;

/// A failure reported by the tunnel backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Tunnel is missing a configuration")]
    MissingConfig,

    #[error("Not authorized to create a tunnel interface")]
    NotAuthorized,

    #[error("Unable to start tunnel: {0}")]
    StartFailed(String),

    #[error("Tunnel interface creation failed: {0}")]
    InterfaceCreation(String),

    #[error("Unknown tunnel: {0}")]
    UnknownTunnel(String),

    #[error("Backend command failed: {0}")]
    CommandFailed(String),

    #[error("Backend initialization failed: {0}")]
    InitializationFailed(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl BackendError {
    /// Stable reason code, suitable for surfacing to the host shell
    pub fn reason(&self) -> &'static str {
        match self {
            BackendError::MissingConfig => "TUNNEL_MISSING_CONFIG",
            BackendError::NotAuthorized => "VPN_NOT_AUTHORIZED",
            BackendError::StartFailed(_) => "UNABLE_TO_START_VPN",
            BackendError::InterfaceCreation(_) => "TUN_CREATION_ERROR",
            BackendError::UnknownTunnel(_) => "UNKNOWN_TUNNEL",
            BackendError::CommandFailed(_) => "COMMAND_FAILED",
            BackendError::InitializationFailed(_) => "INITIALIZATION_FAILED",
            BackendError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}
