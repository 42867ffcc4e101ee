//! Command dispatch for the host shell

use std::sync::Arc;
use tracing::{debug, info, warn};
use wgbridge_control::{ControllerError, LifecycleController, StageListener, SubscriptionId};
use wgbridge_proto::{arguments, methods, ConnectionStage, MethodCall, MethodResult};

/// Routes method calls to the lifecycle controller and stage listeners to its relay
pub struct Bridge {
    controller: Arc<LifecycleController>,
}

impl Bridge {
    /// Attach to `controller` and start building its backend
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        controller.prepare_backend();
        Self { controller }
    }

    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    pub async fn handle(&self, call: MethodCall) -> MethodResult {
        debug!("Method call: {}", call.method);

        match call.method.as_str() {
            methods::INITIALIZE => self.initialize(&call),
            methods::START => {
                let config = call.argument(arguments::WG_QUICK_CONFIG).unwrap_or_default();
                respond(self.controller.connect(config).await)
            }
            methods::STOP => respond(self.controller.disconnect().await),
            methods::GET_STATS => self.get_stats(&call).await,
            methods::STAGE => MethodResult::success(self.stage().as_str()),
            methods::CHECK_PERMISSION => {
                self.controller.check_permission();
                MethodResult::success_null()
            }
            other => {
                debug!("Method {} not implemented", other);
                MethodResult::NotImplemented
            }
        }
    }

    pub fn stage(&self) -> ConnectionStage {
        self.controller.current_stage()
    }

    /// Attach the stage listener, replacing any previous one
    pub fn listen(&self, listener: Arc<dyn StageListener>) -> SubscriptionId {
        self.controller.relay().subscribe(listener)
    }

    /// Stop delivering stages to the current listener
    pub fn cancel(&self) -> bool {
        self.controller.relay().unsubscribe()
    }

    /// Stop delivering stages to `id`, unless it was already replaced
    pub fn release(&self, id: SubscriptionId) -> bool {
        self.controller.relay().release(id)
    }

    /// Outcome of the consent flow started by `checkPermission` or `start`
    pub fn on_permission_result(&self, request_code: i32, granted: bool) -> bool {
        self.controller.on_permission_result(request_code, granted)
    }

    /// Detach from the host shell. Stage events are dropped until a new listener attaches.
    pub fn detach(&self) {
        if self.cancel() {
            info!("Detached stage listener");
        }
    }

    fn initialize(&self, call: &MethodCall) -> MethodResult {
        let name = call
            .argument(arguments::LOCALIZED_DESCRIPTION)
            .unwrap_or_default();

        if let Err(e) = self.controller.initialize(name) {
            warn!("Initialize - {}", e);
            return failure(e);
        }

        self.controller.check_permission();
        MethodResult::success_null()
    }

    async fn get_stats(&self, call: &MethodCall) -> MethodResult {
        let name = call
            .raw_string()
            .or_else(|| call.argument(arguments::TUNNEL_NAME))
            .unwrap_or_default();

        let stats = match self.controller.get_stats(name).await {
            Ok(stats) => stats,
            Err(e) => return failure(e),
        };

        match stats.to_json() {
            Ok(json) => {
                debug!(
                    "[{}] Statistics - {} {}",
                    name, stats.total_download, stats.total_upload
                );
                MethodResult::success(json)
            }
            Err(e) => MethodResult::error("SERIALIZATION", e.to_string()),
        }
    }
}

fn respond(result: Result<(), ControllerError>) -> MethodResult {
    match result {
        Ok(()) => MethodResult::success_null(),
        Err(e) => failure(e),
    }
}

fn failure(err: ControllerError) -> MethodResult {
    MethodResult::error(err.code(), err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wgbridge_backend::{BackendProvider, MemoryBackend};
    use wgbridge_control::{AlwaysGranted, ControllerConfig};

    fn bridge() -> Bridge {
        let controller = LifecycleController::new(
            BackendProvider::ready(Arc::new(MemoryBackend::new())),
            Arc::new(AlwaysGranted),
            ControllerConfig::default(),
        );
        Bridge::new(Arc::new(controller))
    }

    #[tokio::test]
    async fn test_unknown_method_not_implemented() {
        let result = bridge().handle(MethodCall::without_arguments("reboot")).await;
        assert_eq!(result, MethodResult::NotImplemented);
    }

    #[tokio::test]
    async fn test_initialize_validates_name() {
        let bridge = bridge();

        let result = bridge
            .handle(MethodCall::new(
                methods::INITIALIZE,
                json!({ "localizedDescription": "way too long for an interface" }),
            ))
            .await;
        assert_eq!(result.error_code(), Some("INVALID_NAME"));

        let result = bridge
            .handle(MethodCall::without_arguments(methods::INITIALIZE))
            .await;
        assert_eq!(result.error_code(), Some("INVALID_NAME"));

        let result = bridge
            .handle(MethodCall::new(
                methods::INITIALIZE,
                json!({ "localizedDescription": "wg0" }),
            ))
            .await;
        assert_eq!(result, MethodResult::success_null());
        assert!(bridge.controller().permission().is_granted());
    }

    #[tokio::test]
    async fn test_stage_reports_last_known() {
        let result = bridge()
            .handle(MethodCall::without_arguments(methods::STAGE))
            .await;
        assert_eq!(result, MethodResult::success("none"));
    }

    #[tokio::test]
    async fn test_get_stats_argument_forms() {
        let bridge = bridge();

        let result = bridge
            .handle(MethodCall::without_arguments(methods::GET_STATS))
            .await;
        assert_eq!(result.error_code(), Some("NOT_INITIALIZED"));

        let result = bridge
            .handle(MethodCall::new(methods::GET_STATS, json!("wg0")))
            .await;
        assert_eq!(result.error_code(), Some("UNKNOWN_TUNNEL"));

        let result = bridge
            .handle(MethodCall::new(
                methods::GET_STATS,
                json!({ "tunnelName": "wg0" }),
            ))
            .await;
        assert_eq!(result.error_code(), Some("UNKNOWN_TUNNEL"));
    }

    #[tokio::test]
    async fn test_detach_drops_listener() {
        let bridge = bridge();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let id = bridge.listen(Arc::new(tx));

        bridge.detach();
        assert!(!bridge.release(id));
        assert!(!bridge.cancel());
    }
}
