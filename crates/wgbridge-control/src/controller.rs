//! Tunnel lifecycle state machine

use std::sync::{Arc, Mutex};
use tokio::sync::{watch, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wgbridge_backend::{Backend, BackendError, BackendProvider, Tunnel};
use wgbridge_config::TunnelConfig;
use wgbridge_proto::{ConnectionStage, Stats, TunnelState};

use crate::config::{BusyPolicy, ControllerConfig};
use crate::error::ControllerError;
use crate::identity::{ManagedTunnel, TunnelIdentity};
use crate::permission::{PermissionGate, PermissionProvider};
use crate::relay::StageRelay;
use crate::tracker::StageTracker;

/// Drives the single managed tunnel through connect and disconnect
///
/// ```text
/// Idle -> Connecting -> Connected -> Disconnecting -> Disconnected
/// ```
///
/// One lifecycle operation runs at a time. `connected` and `disconnected` are published only
/// after the backend confirmed the transition; a failed operation puts the stage back where it
/// was.
pub struct LifecycleController {
    config: ControllerConfig,
    identity: TunnelIdentity,
    provider: BackendProvider,
    permission: PermissionGate,
    relay: Arc<StageRelay>,
    stages: Arc<StageTracker>,
    /// Active configuration; holding the lock means owning the lifecycle
    active: tokio::sync::Mutex<Option<TunnelConfig>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleController {
    pub fn new(
        provider: BackendProvider,
        permission: Arc<dyn PermissionProvider>,
        config: ControllerConfig,
    ) -> Self {
        let relay = Arc::new(StageRelay::new());
        Self {
            config,
            identity: TunnelIdentity::new(),
            provider,
            permission: PermissionGate::new(permission),
            stages: Arc::new(StageTracker::new(relay.clone())),
            relay,
            active: tokio::sync::Mutex::new(None),
            monitor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn relay(&self) -> &StageRelay {
        &self.relay
    }

    pub fn permission(&self) -> &PermissionGate {
        &self.permission
    }

    /// Kick off backend construction in the background
    pub fn prepare_backend(&self) {
        self.provider.start();
    }

    /// Re-arm backend construction after it failed
    pub fn retry_backend(&self) -> bool {
        self.provider.retry()
    }

    pub fn tunnel_name(&self) -> Option<String> {
        self.identity.name().map(str::to_string)
    }

    /// Name the managed tunnel. The first valid name sticks.
    pub fn initialize(&self, name: &str) -> Result<(), ControllerError> {
        self.identity.set_name(name).map(|_| ())
    }

    /// Refresh the permission grant, starting the consent flow when needed
    pub fn check_permission(&self) -> bool {
        self.permission.check()
    }

    pub fn on_permission_result(&self, request_code: i32, granted: bool) -> bool {
        self.permission.on_permission_result(request_code, granted)
    }

    pub fn current_stage(&self) -> ConnectionStage {
        self.stages.current()
    }

    /// Bring the tunnel up with the given wg-quick configuration
    pub async fn connect(&self, config_text: &str) -> Result<(), ControllerError> {
        let tunnel = self.identity.get().ok_or(ControllerError::NotInitialized)?;

        if !self.permission.is_granted() && !self.permission.check() {
            warn!("[{}] Connect - permission not granted", tunnel.name());
            return Err(ControllerError::PermissionDenied);
        }

        let config = TunnelConfig::parse(config_text).map_err(|e| {
            warn!("[{}] Connect - invalid configuration: {}", tunnel.name(), e);
            ControllerError::from(e)
        })?;

        let mut active = self.begin().await?;
        self.ensure_monitor(&tunnel);

        let prior = self.stages.current();
        self.stages.mark(ConnectionStage::Connecting);
        info!("[{}] Connect - connecting", tunnel.name());

        let result = self
            .transition(&tunnel, TunnelState::Up, Some(config.clone()))
            .await;

        match result {
            Ok(()) => {
                *active = Some(config);
                self.stages.confirm(TunnelState::Up);
                info!("[{}] Connect - success", tunnel.name());
                Ok(())
            }
            Err(e) => {
                self.stages.revert(ConnectionStage::Connecting, prior);
                error!("[{}] Connect - failed: {}", tunnel.name(), e);
                Err(e)
            }
        }
    }

    /// Take the tunnel down
    pub async fn disconnect(&self) -> Result<(), ControllerError> {
        let mut active = self.begin().await?;

        let backend = self.backend().await?;
        if backend.running_tunnel_names().await?.is_empty() {
            return Err(ControllerError::NotRunning);
        }

        let tunnel = self.identity.get().ok_or(ControllerError::NotInitialized)?;
        self.ensure_monitor(&tunnel);

        let prior = self.stages.current();
        self.stages.mark(ConnectionStage::Disconnecting);
        info!("[{}] Disconnect - disconnecting", tunnel.name());

        let result = self
            .transition(&tunnel, TunnelState::Down, active.clone())
            .await;

        match result {
            Ok(()) => {
                *active = None;
                self.stages.confirm(TunnelState::Down);
                info!("[{}] Disconnect - success", tunnel.name());
                Ok(())
            }
            Err(e) => {
                self.stages.revert(ConnectionStage::Disconnecting, prior);
                error!("[{}] Disconnect - failed: {}", tunnel.name(), e);
                Err(e)
            }
        }
    }

    /// Byte counters for the named tunnel
    pub async fn get_stats(&self, name: &str) -> Result<Stats, ControllerError> {
        if name.is_empty() {
            return Err(ControllerError::NotInitialized);
        }

        let backend = self.backend().await?;
        let statistics = backend.get_statistics(name).await.map_err(|e| {
            warn!("[{}] Statistics unavailable: {}", name, e);
            ControllerError::from(e)
        })?;

        Ok(Stats::new(
            saturating_i64(statistics.total_rx()),
            saturating_i64(statistics.total_tx()),
        ))
    }

    async fn begin(&self) -> Result<MutexGuard<'_, Option<TunnelConfig>>, ControllerError> {
        match self.config.busy_policy {
            BusyPolicy::Reject => self.active.try_lock().map_err(|_| {
                debug!("Rejecting operation, another one is in progress");
                ControllerError::Busy
            }),
            BusyPolicy::Queue => Ok(self.active.lock().await),
        }
    }

    async fn backend(&self) -> Result<Arc<dyn Backend>, ControllerError> {
        Ok(self.provider.acquire(self.config.backend_wait).await?)
    }

    /// Ask the backend for `target` and wait for its confirmation
    async fn transition(
        &self,
        tunnel: &Arc<ManagedTunnel>,
        target: TunnelState,
        config: Option<TunnelConfig>,
    ) -> Result<(), ControllerError> {
        let backend = self.backend().await?;

        // Subscribe before asking so a confirmation delivered during set_state is not missed
        let mut rx = tunnel.subscribe();
        rx.borrow_and_update();

        let handle: Arc<dyn Tunnel> = tunnel.clone();
        backend.set_state(handle, target, config).await?;

        self.await_state(&mut rx, target).await
    }

    async fn await_state(
        &self,
        rx: &mut watch::Receiver<Option<TunnelState>>,
        target: TunnelState,
    ) -> Result<(), ControllerError> {
        let after = self.config.transition_timeout;
        let confirmed = async {
            while rx.changed().await.is_ok() {
                let reported = *rx.borrow_and_update();
                match reported {
                    Some(state) if state == target => return Ok(()),
                    // TOGGLE is an intermediate state, keep waiting for the outcome
                    Some(TunnelState::Toggle) | None => continue,
                    Some(state) => {
                        let reason = format!("backend reported {} instead of {}", state, target);
                        let err = match target {
                            TunnelState::Up => BackendError::StartFailed(reason),
                            _ => BackendError::CommandFailed(reason),
                        };
                        return Err(ControllerError::Backend(err));
                    }
                }
            }
            Err(ControllerError::Timeout {
                state: target,
                after,
            })
        };

        match tokio::time::timeout(after, confirmed).await {
            Ok(result) => result,
            Err(_) => Err(ControllerError::Timeout {
                state: target,
                after,
            }),
        }
    }

    /// Follow the tunnel's own notifications so an unexpected drop updates the stage
    fn ensure_monitor(&self, tunnel: &Arc<ManagedTunnel>) {
        let mut monitor = self.monitor.lock().unwrap_or_else(|e| e.into_inner());
        if monitor.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let mut rx = tunnel.subscribe();
        rx.borrow_and_update();
        let stages = self.stages.clone();
        let tunnel = tunnel.clone();

        *monitor = Some(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                rx.borrow_and_update();
                if let Some(stage) = stages.observe(&tunnel) {
                    debug!("[{}] Stage now {}", tunnel.name(), stage);
                }
            }
        }));
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        let monitor = self.monitor.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = monitor.take() {
            task.abort();
        }
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
