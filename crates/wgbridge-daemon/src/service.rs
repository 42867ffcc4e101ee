//! Daemon service implementation

use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};
use wgbridge_lib::{Bridge, ConnectionStage, StageListener, SubscriptionId};

use crate::error::DaemonError;
use crate::frame::{read_frame, write_frame};
use crate::protocol::{DaemonRequest, DaemonResponse, DaemonStatus};

struct Shared {
    bridge: Arc<Bridge>,
    start_time: Instant,
    started_at: String,
    version: String,
    shutdown: Arc<Notify>,
}

/// Stops a running [`DaemonService`]
#[derive(Clone)]
pub struct ShutdownHandle(Arc<Notify>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.notify_one();
    }
}

/// Serves the bridge to daemon clients
pub struct DaemonService {
    shared: Arc<Shared>,
}

impl DaemonService {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            shared: Arc::new(Shared {
                bridge,
                start_time: Instant::now(),
                started_at: chrono::Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                shutdown: Arc::new(Notify::new()),
            }),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shared.shutdown.clone())
    }

    pub async fn bind(addr: &str) -> Result<TcpListener, DaemonError> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| DaemonError::BindFailed(format!("{}: {}", addr, e)))
    }

    /// Accept clients until a shutdown is requested
    pub async fn run(&self, listener: TcpListener) -> Result<(), DaemonError> {
        let addr = listener
            .local_addr()
            .map_err(|e| DaemonError::BindFailed(e.to_string()))?;
        info!("Daemon listening on {}", addr);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Client connected from {}", peer);
                        let shared = self.shared.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, shared).await {
                                error!("Connection error: {}", e);
                            }
                            debug!("Client {} disconnected", peer);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
                _ = self.shared.shutdown.notified() => {
                    info!("Daemon shutting down");
                    break;
                }
            }
        }

        self.shared.bridge.detach();
        Ok(())
    }
}

/// Forwards stage changes to one client connection
struct StageForwarder(mpsc::UnboundedSender<DaemonResponse>);

impl StageListener for StageForwarder {
    fn on_stage(&self, stage: ConnectionStage) {
        let _ = self.0.send(DaemonResponse::Stage { stage });
    }
}

async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) -> Result<(), DaemonError> {
    let (mut reader, mut writer) = stream.into_split();

    // Responses and streamed stages share one ordered writer
    let (tx, mut rx) = mpsc::unbounded_channel::<DaemonResponse>();
    let writer_task = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &response).await {
                debug!("Write failed: {}", e);
                break;
            }
        }
    });

    let mut subscription: Option<SubscriptionId> = None;

    let result = loop {
        let request: DaemonRequest = match read_frame(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };

        let response = match request {
            DaemonRequest::Ping => DaemonResponse::Pong(DaemonStatus {
                version: shared.version.clone(),
                uptime_seconds: shared.start_time.elapsed().as_secs(),
                stage: shared.bridge.stage(),
                tunnel: shared.bridge.controller().tunnel_name(),
                started_at: shared.started_at.clone(),
            }),

            DaemonRequest::Invoke { call } => {
                DaemonResponse::Result(shared.bridge.handle(call).await)
            }

            DaemonRequest::Listen => {
                if tx.send(DaemonResponse::Listening).is_err() {
                    break Ok(());
                }
                let id = shared.bridge.listen(Arc::new(StageForwarder(tx.clone())));
                info!("Stage listener {} attached", id);
                subscription = Some(id);
                continue;
            }

            DaemonRequest::Cancel => {
                if let Some(id) = subscription.take() {
                    shared.bridge.release(id);
                }
                DaemonResponse::Ok
            }

            DaemonRequest::PermissionResult {
                request_code,
                granted,
            } => {
                if shared.bridge.on_permission_result(request_code, granted) {
                    DaemonResponse::Ok
                } else {
                    DaemonResponse::Error {
                        message: format!("Unknown permission request {}", request_code),
                    }
                }
            }

            DaemonRequest::Shutdown => {
                warn!("Shutdown requested by client");
                let _ = tx.send(DaemonResponse::Ok);
                shared.shutdown.notify_one();
                break Ok(());
            }
        };

        if tx.send(response).is_err() {
            break Ok(());
        }
    };

    if let Some(id) = subscription.take() {
        shared.bridge.release(id);
    }
    drop(tx);
    let _ = writer_task.await;

    result
}
