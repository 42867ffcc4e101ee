//! Memoized backend construction
//!
//! The backend is built once, off the async worker threads, and shared by every operation.
//! Waiters are bounded by a timeout so a construction that never finishes surfaces as
//! [`AcquireError::Unavailable`] instead of hanging every later call.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::BackendError;
use crate::tunnel::Backend;

/// Builds the backend. Runs on a blocking thread.
pub trait BackendFactory: Send + Sync + 'static {
    fn create(&self) -> Result<Arc<dyn Backend>, BackendError>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Result<Arc<dyn Backend>, BackendError> + Send + Sync + 'static,
{
    fn create(&self) -> Result<Arc<dyn Backend>, BackendError> {
        self()
    }
}

#[derive(Debug, Error, Clone)]
pub enum AcquireError {
    #[error("Backend construction failed: {0}")]
    Failed(BackendError),

    #[error("Backend not available after {0:?}")]
    Unavailable(Duration),
}

enum Slot {
    Idle,
    Pending,
    Ready(Arc<dyn Backend>),
    Failed(BackendError),
}

impl Slot {
    fn is_resolved(&self) -> bool {
        matches!(self, Slot::Ready(_) | Slot::Failed(_))
    }
}

/// Lazily constructs and caches the single backend handle
pub struct BackendProvider {
    factory: Arc<dyn BackendFactory>,
    slot: Arc<watch::Sender<Slot>>,
}

impl BackendProvider {
    pub fn new(factory: impl BackendFactory) -> Self {
        let (slot, _) = watch::channel(Slot::Idle);
        Self {
            factory: Arc::new(factory),
            slot: Arc::new(slot),
        }
    }

    /// A provider that is already resolved to `backend`
    pub fn ready(backend: Arc<dyn Backend>) -> Self {
        let (slot, _) = watch::channel(Slot::Ready(backend.clone()));
        Self {
            factory: Arc::new(move || -> Result<Arc<dyn Backend>, BackendError> {
                Ok(backend.clone())
            }),
            slot: Arc::new(slot),
        }
    }

    /// Begin construction without waiting for it
    ///
    /// Outside a Tokio runtime this does nothing; the first `acquire` starts construction.
    pub fn start(&self) {
        if tokio::runtime::Handle::try_current().is_err() {
            debug!("No runtime yet, deferring backend construction");
            return;
        }
        self.trigger();
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Ready(_))
    }

    /// Wait up to `wait` for the backend, starting construction if nobody has yet
    pub async fn acquire(&self, wait: Duration) -> Result<Arc<dyn Backend>, AcquireError> {
        let mut rx = self.slot.subscribe();
        self.trigger();

        let acquired = match tokio::time::timeout(wait, rx.wait_for(Slot::is_resolved)).await {
            Ok(Ok(slot)) => match &*slot {
                Slot::Ready(backend) => Ok(backend.clone()),
                Slot::Failed(err) => Err(AcquireError::Failed(err.clone())),
                Slot::Idle | Slot::Pending => Err(AcquireError::Unavailable(wait)),
            },
            Ok(Err(_)) | Err(_) => {
                error!("Backend still unavailable after {:?}", wait);
                Err(AcquireError::Unavailable(wait))
            }
        };
        acquired
    }

    /// Re-arm construction after a failure. Returns false if there was nothing to retry.
    pub fn retry(&self) -> bool {
        let reset = self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Failed(_)) {
                *slot = Slot::Idle;
                true
            } else {
                false
            }
        });

        if reset {
            info!("Retrying backend construction");
            self.trigger();
        }
        reset
    }

    fn trigger(&self) {
        let armed = self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Idle) {
                *slot = Slot::Pending;
                true
            } else {
                false
            }
        });

        if !armed {
            return;
        }

        debug!("Constructing backend");
        let factory = self.factory.clone();
        let slot = self.slot.clone();

        tokio::spawn(async move {
            let next = match tokio::task::spawn_blocking(move || factory.create()).await {
                Ok(Ok(backend)) => {
                    info!("Backend ready");
                    Slot::Ready(backend)
                }
                Ok(Err(e)) => {
                    error!("Backend construction failed: {}", e);
                    Slot::Failed(e)
                }
                Err(e) => {
                    error!("Backend construction task panicked: {}", e);
                    Slot::Failed(BackendError::InitializationFailed(e.to_string()))
                }
            };
            slot.send_replace(next);
        });
    }
}
