//! Daemon round trips over a real localhost socket

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use wgbridge_daemon::{DaemonClient, DaemonService, ShutdownHandle};
use wgbridge_lib::{
    methods, AlwaysGranted, BackendProvider, Bridge, ConnectionStage, ControllerConfig,
    LifecycleController, MemoryBackend, MethodCall, MethodResult,
};

const CONFIG: &str = "[Interface]
PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=
Address = 10.0.0.2/32

[Peer]
PublicKey = xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=
AllowedIPs = 0.0.0.0/0
Endpoint = 198.51.100.4:51820
";

struct Running {
    addr: String,
    backend: Arc<MemoryBackend>,
    shutdown: ShutdownHandle,
    task: JoinHandle<()>,
}

async fn start_daemon() -> Running {
    let backend = Arc::new(MemoryBackend::new());
    let controller = LifecycleController::new(
        BackendProvider::ready(backend.clone()),
        Arc::new(AlwaysGranted),
        ControllerConfig::new().with_transition_timeout(Duration::from_secs(2)),
    );
    let service = DaemonService::new(Arc::new(Bridge::new(Arc::new(controller))));
    let shutdown = service.shutdown_handle();

    let listener = DaemonService::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let task = tokio::spawn(async move {
        service.run(listener).await.unwrap();
    });

    Running {
        addr,
        backend,
        shutdown,
        task,
    }
}

fn initialize(name: &str) -> MethodCall {
    MethodCall::new(methods::INITIALIZE, json!({ "localizedDescription": name }))
}

fn start() -> MethodCall {
    MethodCall::new(methods::START, json!({ "wgQuickConfig": CONFIG }))
}

#[tokio::test]
async fn test_ping() {
    let daemon = start_daemon().await;
    let mut client = DaemonClient::connect(&daemon.addr).await.unwrap();

    let status = client.ping().await.unwrap();
    assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(status.stage, ConnectionStage::None);
    assert_eq!(status.tunnel, None);
    assert!(chrono::DateTime::parse_from_rfc3339(&status.started_at).is_ok());

    client.invoke(initialize("wg0")).await.unwrap();
    assert_eq!(client.ping().await.unwrap().tunnel.as_deref(), Some("wg0"));

    daemon.shutdown.shutdown();
}

#[tokio::test]
async fn test_invoke_lifecycle() {
    let daemon = start_daemon().await;
    let mut client = DaemonClient::connect(&daemon.addr).await.unwrap();

    assert_eq!(
        client.invoke(initialize("wg0")).await.unwrap(),
        MethodResult::success_null()
    );
    assert_eq!(
        client.invoke(start()).await.unwrap(),
        MethodResult::success_null()
    );
    assert_eq!(
        client
            .invoke(MethodCall::without_arguments(methods::STAGE))
            .await
            .unwrap(),
        MethodResult::success("connected")
    );

    daemon.backend.record_traffic("wg0", 10, 20);
    let stats = client
        .invoke(MethodCall::new(methods::GET_STATS, json!("wg0")))
        .await
        .unwrap();
    assert_eq!(
        stats,
        MethodResult::success(r#"{"totalDownload":10,"totalUpload":20}"#)
    );

    assert!(client
        .invoke(MethodCall::without_arguments(methods::STOP))
        .await
        .unwrap()
        .is_success());
    assert_eq!(
        client
            .invoke(MethodCall::without_arguments("unknownMethod"))
            .await
            .unwrap(),
        MethodResult::NotImplemented
    );

    daemon.shutdown.shutdown();
}

#[tokio::test]
async fn test_stage_stream() {
    let daemon = start_daemon().await;

    let listener = DaemonClient::connect(&daemon.addr).await.unwrap();
    let mut stages = listener.listen().await.unwrap();

    let mut client = DaemonClient::connect(&daemon.addr).await.unwrap();
    client.invoke(initialize("wg0")).await.unwrap();
    client.invoke(start()).await.unwrap();
    client
        .invoke(MethodCall::without_arguments(methods::STOP))
        .await
        .unwrap();

    let mut received = Vec::new();
    for _ in 0..4 {
        let stage = tokio::time::timeout(Duration::from_secs(2), stages.recv())
            .await
            .expect("stage did not arrive");
        received.push(stage.expect("stream ended early"));
    }
    assert_eq!(
        received,
        vec![
            ConnectionStage::Connecting,
            ConnectionStage::Connected,
            ConnectionStage::Disconnecting,
            ConnectionStage::Disconnected,
        ]
    );

    stages.cancel().await.unwrap();
    daemon.shutdown.shutdown();
}

#[tokio::test]
async fn test_new_listener_replaces_old() {
    let daemon = start_daemon().await;

    let mut first = DaemonClient::connect(&daemon.addr)
        .await
        .unwrap()
        .listen()
        .await
        .unwrap();
    let mut second = DaemonClient::connect(&daemon.addr)
        .await
        .unwrap()
        .listen()
        .await
        .unwrap();

    let mut client = DaemonClient::connect(&daemon.addr).await.unwrap();
    client.invoke(initialize("wg0")).await.unwrap();
    client.invoke(start()).await.unwrap();

    let stage = tokio::time::timeout(Duration::from_secs(2), second.recv())
        .await
        .unwrap();
    assert_eq!(stage, Some(ConnectionStage::Connecting));

    let nothing = tokio::time::timeout(Duration::from_millis(100), first.recv()).await;
    assert!(nothing.is_err());

    daemon.shutdown.shutdown();
}

#[tokio::test]
async fn test_closed_listener_is_released() {
    let daemon = start_daemon().await;

    let stages = DaemonClient::connect(&daemon.addr)
        .await
        .unwrap()
        .listen()
        .await
        .unwrap();
    drop(stages);

    // Operations keep working once the listening client is gone
    let mut client = DaemonClient::connect(&daemon.addr).await.unwrap();
    client.invoke(initialize("wg0")).await.unwrap();
    assert!(client.invoke(start()).await.unwrap().is_success());

    daemon.shutdown.shutdown();
}

#[tokio::test]
async fn test_shutdown_request_stops_daemon() {
    let daemon = start_daemon().await;
    let mut client = DaemonClient::connect(&daemon.addr).await.unwrap();

    client.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), daemon.task)
        .await
        .expect("daemon did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_permission_result_code_checked() {
    let daemon = start_daemon().await;
    let mut client = DaemonClient::connect(&daemon.addr).await.unwrap();

    assert!(client.permission_result(10014, true).await.is_ok());
    assert!(client.permission_result(1, true).await.is_err());

    daemon.shutdown.shutdown();
}
