//! Single-subscriber stage relay

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;
use wgbridge_proto::ConnectionStage;

/// Identifies one subscription so its owner can release it without touching a newer one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receives stage changes
pub trait StageListener: Send + Sync {
    fn on_stage(&self, stage: ConnectionStage);
}

impl StageListener for mpsc::UnboundedSender<ConnectionStage> {
    fn on_stage(&self, stage: ConnectionStage) {
        let _ = self.send(stage);
    }
}

type Slot = Option<(SubscriptionId, Arc<dyn StageListener>)>;

/// Republishes stage changes to at most one listener
///
/// Subscribing replaces the previous listener. Events published while nobody listens are
/// dropped, and a new listener gets no history.
#[derive(Default)]
pub struct StageRelay {
    listener: Mutex<Slot>,
}

impl StageRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn StageListener>) -> SubscriptionId {
        let id = SubscriptionId::new();
        if let Some((previous, _)) = self.lock().replace((id, listener)) {
            debug!("Stage listener {} replaced by {}", previous, id);
        } else {
            debug!("Stage listener {} attached", id);
        }
        id
    }

    /// Drop whichever listener is attached
    pub fn unsubscribe(&self) -> bool {
        self.lock().take().is_some()
    }

    /// Drop the listener only if it is still `id`
    pub fn release(&self, id: SubscriptionId) -> bool {
        let mut slot = self.lock();
        match slot.as_ref() {
            Some((current, _)) if *current == id => {
                *slot = None;
                debug!("Stage listener {} released", id);
                true
            }
            _ => false,
        }
    }

    pub fn has_listener(&self) -> bool {
        self.lock().is_some()
    }

    /// Deliver `stage` to the listener. Returns false when there was nobody to deliver to.
    pub fn publish(&self, stage: ConnectionStage) -> bool {
        let listener = self.lock().as_ref().map(|(_, l)| l.clone());
        match listener {
            Some(listener) => {
                listener.on_stage(stage);
                true
            }
            None => {
                trace!("Dropping stage {} without listener", stage);
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener() -> (
        Arc<dyn StageListener>,
        mpsc::UnboundedReceiver<ConnectionStage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(tx), rx)
    }

    #[test]
    fn test_publish_without_listener_drops() {
        let relay = StageRelay::new();
        assert!(!relay.publish(ConnectionStage::Connecting));

        let (l, mut rx) = listener();
        relay.subscribe(l);
        assert!(rx.try_recv().is_err());

        assert!(relay.publish(ConnectionStage::Connected));
        assert_eq!(rx.try_recv().unwrap(), ConnectionStage::Connected);
    }

    #[test]
    fn test_subscribe_replaces_previous() {
        let relay = StageRelay::new();
        let (first, mut first_rx) = listener();
        let (second, mut second_rx) = listener();

        let first_id = relay.subscribe(first);
        let second_id = relay.subscribe(second);
        assert_ne!(first_id, second_id);

        relay.publish(ConnectionStage::Connecting);
        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.try_recv().unwrap(), ConnectionStage::Connecting);

        // Stale owner cannot release the newer subscription
        assert!(!relay.release(first_id));
        assert!(relay.has_listener());
        assert!(relay.release(second_id));
        assert!(!relay.has_listener());
    }

    #[test]
    fn test_unsubscribe() {
        let relay = StageRelay::new();
        assert!(!relay.unsubscribe());

        let (l, mut rx) = listener();
        relay.subscribe(l);
        assert!(relay.unsubscribe());
        relay.publish(ConnectionStage::Disconnected);
        assert!(rx.try_recv().is_err());
    }
}
