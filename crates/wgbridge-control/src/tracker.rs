//! Last-known connection stage

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use wgbridge_proto::{ConnectionStage, TunnelState};

use crate::identity::ManagedTunnel;
use crate::relay::StageRelay;

/// Tracks the current stage and publishes every change through the relay
///
/// Publishing happens under the tracker's lock so listeners see stages in the order they were
/// recorded.
pub struct StageTracker {
    current: Mutex<ConnectionStage>,
    relay: Arc<StageRelay>,
}

impl StageTracker {
    pub fn new(relay: Arc<StageRelay>) -> Self {
        Self {
            current: Mutex::new(ConnectionStage::None),
            relay,
        }
    }

    pub fn current(&self) -> ConnectionStage {
        *self.lock()
    }

    /// Record a controller-driven stage and publish it
    pub fn mark(&self, stage: ConnectionStage) {
        let mut current = self.lock();
        *current = stage;
        self.relay.publish(stage);
    }

    /// Record a backend-confirmed state. Publishes only if the stage actually changed.
    pub fn confirm(&self, state: TunnelState) -> bool {
        let stage = state.stage();
        let mut current = self.lock();
        if *current == stage {
            debug!("Stage already {}", stage);
            return false;
        }
        *current = stage;
        self.relay.publish(stage);
        true
    }

    /// Record the state `tunnel` reports on its own
    ///
    /// The state is read under the tracker's lock so a notification that was overtaken by a
    /// confirmed transition is not applied. Ignored while a controller operation is in flight
    /// (that operation confirms its own outcome) and before any stage was confirmed.
    pub fn observe(&self, tunnel: &ManagedTunnel) -> Option<ConnectionStage> {
        let mut current = self.lock();
        let stage = tunnel.last_state()?.stage();
        if current.is_transitional() || *current == ConnectionStage::None || *current == stage {
            return None;
        }
        *current = stage;
        self.relay.publish(stage);
        Some(stage)
    }

    /// Undo a transitional stage, if nothing has replaced it in the meantime
    pub fn revert(&self, transitional: ConnectionStage, prior: ConnectionStage) -> bool {
        let mut current = self.lock();
        if *current != transitional {
            return false;
        }
        *current = prior;
        self.relay.publish(prior);
        true
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionStage> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
