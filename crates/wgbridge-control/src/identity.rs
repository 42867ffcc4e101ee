//! The single tunnel a controller manages

use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tracing::{debug, info};
use wgbridge_backend::{is_name_invalid, Tunnel};
use wgbridge_proto::TunnelState;

use crate::error::ControllerError;

/// Tunnel handed to the backend
///
/// Backend confirmations land in a `watch` channel; every notification wakes receivers, even
/// when it repeats the previous state.
#[derive(Debug)]
pub struct ManagedTunnel {
    name: String,
    state: watch::Sender<Option<TunnelState>>,
}

impl ManagedTunnel {
    pub fn new(name: impl Into<String>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            name: name.into(),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TunnelState>> {
        self.state.subscribe()
    }

    /// Last state the backend reported, if any
    pub fn last_state(&self) -> Option<TunnelState> {
        *self.state.borrow()
    }
}

impl Tunnel for ManagedTunnel {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_state_change(&self, new_state: TunnelState) {
        debug!("[{}] Backend reported {}", self.name, new_state);
        self.state.send_replace(Some(new_state));
    }
}

/// Holds the managed tunnel; the first valid name wins
#[derive(Default)]
pub struct TunnelIdentity {
    tunnel: OnceLock<Arc<ManagedTunnel>>,
}

impl TunnelIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(&self, name: &str) -> Result<Arc<ManagedTunnel>, ControllerError> {
        if is_name_invalid(name) {
            return Err(ControllerError::InvalidName(name.to_string()));
        }

        let tunnel = self.tunnel.get_or_init(|| {
            info!("[{}] Tunnel initialized", name);
            Arc::new(ManagedTunnel::new(name))
        });

        if tunnel.name() != name {
            debug!("[{}] Keeping existing tunnel, ignoring {}", tunnel.name(), name);
        }
        Ok(tunnel.clone())
    }

    pub fn get(&self) -> Option<Arc<ManagedTunnel>> {
        self.tunnel.get().cloned()
    }

    pub fn name(&self) -> Option<&str> {
        self.tunnel.get().map(|t| t.name())
    }
}
