//! Permission to create tunnel interfaces
//!
//! Creating an interface needs an OS-level grant. The gate asks its provider whether the grant
//! is already held; if not, it starts the provider's consent flow and reports "not granted"
//! immediately. The outcome of the consent flow arrives later through
//! [`PermissionGate::on_permission_result`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wgbridge_proto::PERMISSIONS_REQUEST_CODE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    ConsentRequired,
}

/// Source of the interface-creation grant
pub trait PermissionProvider: Send + Sync {
    /// Whether the grant is already held
    fn prepare(&self) -> PermissionStatus;

    /// Start the out-of-band consent flow. The result is reported back with `request_code`.
    fn request_consent(&self, request_code: i32);
}

/// Grant held when the process runs with an effective uid of 0
pub struct PrivilegedProcess;

impl PermissionProvider for PrivilegedProcess {
    fn prepare(&self) -> PermissionStatus {
        #[cfg(unix)]
        {
            // SAFETY: geteuid has no preconditions and cannot fail
            if unsafe { libc::geteuid() } == 0 {
                PermissionStatus::Granted
            } else {
                PermissionStatus::ConsentRequired
            }
        }
        #[cfg(not(unix))]
        {
            PermissionStatus::Granted
        }
    }

    fn request_consent(&self, request_code: i32) {
        warn!(
            "Tunnel interfaces need root privileges (request {}); restart the daemon as root",
            request_code
        );
    }
}

/// Grant that is always held
pub struct AlwaysGranted;

impl PermissionProvider for AlwaysGranted {
    fn prepare(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn request_consent(&self, _request_code: i32) {}
}

pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
    granted: AtomicBool,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        Self {
            provider,
            granted: AtomicBool::new(false),
        }
    }

    /// Refresh the grant, starting the consent flow if it is not held
    pub fn check(&self) -> bool {
        match self.provider.prepare() {
            PermissionStatus::Granted => {
                self.granted.store(true, Ordering::SeqCst);
                true
            }
            PermissionStatus::ConsentRequired => {
                self.granted.store(false, Ordering::SeqCst);
                info!("Requesting tunnel permission");
                self.provider.request_consent(PERMISSIONS_REQUEST_CODE);
                false
            }
        }
    }

    /// Record the outcome of a consent flow. Returns false for results that belong to
    /// someone else.
    pub fn on_permission_result(&self, request_code: i32, granted: bool) -> bool {
        if request_code != PERMISSIONS_REQUEST_CODE {
            debug!("Ignoring permission result for request {}", request_code);
            return false;
        }

        self.granted.store(granted, Ordering::SeqCst);
        if granted {
            info!("Tunnel permission granted");
        } else {
            warn!("Tunnel permission denied");
        }
        true
    }

    pub fn is_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Consent {
        requests: AtomicUsize,
    }

    impl PermissionProvider for Consent {
        fn prepare(&self) -> PermissionStatus {
            PermissionStatus::ConsentRequired
        }

        fn request_consent(&self, request_code: i32) {
            assert_eq!(request_code, 10014);
            self.requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_granted_provider() {
        let gate = PermissionGate::new(Arc::new(AlwaysGranted));
        assert!(!gate.is_granted());
        assert!(gate.check());
        assert!(gate.is_granted());
    }

    #[test]
    fn test_consent_flow() {
        let provider = Arc::new(Consent {
            requests: AtomicUsize::new(0),
        });
        let gate = PermissionGate::new(provider.clone());

        assert!(!gate.check());
        assert!(!gate.is_granted());
        assert_eq!(provider.requests.load(Ordering::SeqCst), 1);

        assert!(!gate.on_permission_result(1, true));
        assert!(!gate.is_granted());

        assert!(gate.on_permission_result(PERMISSIONS_REQUEST_CODE, true));
        assert!(gate.is_granted());

        assert!(gate.on_permission_result(PERMISSIONS_REQUEST_CODE, false));
        assert!(!gate.is_granted());
    }
}
