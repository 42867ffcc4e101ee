//! Daemon client

use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};
use wgbridge_lib::{ConnectionStage, MethodCall, MethodResult};

use crate::error::DaemonError;
use crate::frame::{read_frame, write_frame};
use crate::protocol::{DaemonRequest, DaemonResponse, DaemonStatus};

/// Default timeout for daemon operations
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for bridge calls, which may wait on a tunnel transition
const LONG_TIMEOUT: Duration = Duration::from_secs(45);

/// Client for communicating with the daemon
pub struct DaemonClient {
    stream: TcpStream,
}

impl DaemonClient {
    pub async fn connect(addr: &str) -> Result<Self, DaemonError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| DaemonError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        Ok(Self { stream })
    }

    /// Send a request and get a response with default timeout
    pub async fn send(&mut self, request: DaemonRequest) -> Result<DaemonResponse, DaemonError> {
        self.send_with_timeout(request, DEFAULT_TIMEOUT).await
    }

    /// Send a request and get a response with custom timeout
    pub async fn send_with_timeout(
        &mut self,
        request: DaemonRequest,
        timeout: Duration,
    ) -> Result<DaemonResponse, DaemonError> {
        tokio::time::timeout(timeout, self.send_internal(request))
            .await
            .map_err(|_| DaemonError::Timeout)?
    }

    async fn send_internal(
        &mut self,
        request: DaemonRequest,
    ) -> Result<DaemonResponse, DaemonError> {
        write_frame(&mut self.stream, &request).await?;
        read_frame(&mut self.stream)
            .await?
            .ok_or(DaemonError::Closed)
    }

    pub async fn ping(&mut self) -> Result<DaemonStatus, DaemonError> {
        match self.send(DaemonRequest::Ping).await? {
            DaemonResponse::Pong(status) => Ok(status),
            DaemonResponse::Error { message } => Err(DaemonError::ServerError(message)),
            _ => Err(DaemonError::UnexpectedResponse),
        }
    }

    /// Run a bridge method
    pub async fn invoke(&mut self, call: MethodCall) -> Result<MethodResult, DaemonError> {
        match self
            .send_with_timeout(DaemonRequest::Invoke { call }, LONG_TIMEOUT)
            .await?
        {
            DaemonResponse::Result(result) => Ok(result),
            DaemonResponse::Error { message } => Err(DaemonError::ServerError(message)),
            _ => Err(DaemonError::UnexpectedResponse),
        }
    }

    pub async fn permission_result(
        &mut self,
        request_code: i32,
        granted: bool,
    ) -> Result<(), DaemonError> {
        match self
            .send(DaemonRequest::PermissionResult {
                request_code,
                granted,
            })
            .await?
        {
            DaemonResponse::Ok => Ok(()),
            DaemonResponse::Error { message } => Err(DaemonError::ServerError(message)),
            _ => Err(DaemonError::UnexpectedResponse),
        }
    }

    pub async fn shutdown(&mut self) -> Result<(), DaemonError> {
        match self.send(DaemonRequest::Shutdown).await? {
            DaemonResponse::Ok => Ok(()),
            DaemonResponse::Error { message } => Err(DaemonError::ServerError(message)),
            _ => Err(DaemonError::UnexpectedResponse),
        }
    }

    /// Turn this connection into a stage stream
    ///
    /// Replaces whichever listener the daemon had before.
    pub async fn listen(mut self) -> Result<StageSubscription, DaemonError> {
        match self.send(DaemonRequest::Listen).await? {
            DaemonResponse::Listening => {
                info!("Listening for stage changes");
                Ok(StageSubscription {
                    stream: self.stream,
                })
            }
            DaemonResponse::Error { message } => Err(DaemonError::ServerError(message)),
            _ => Err(DaemonError::UnexpectedResponse),
        }
    }
}

/// Stage stream from the daemon
pub struct StageSubscription {
    stream: TcpStream,
}

impl StageSubscription {
    /// Next stage change. Returns `None` once the stream ended.
    pub async fn recv(&mut self) -> Option<ConnectionStage> {
        loop {
            match read_frame(&mut self.stream).await {
                Ok(Some(DaemonResponse::Stage { stage })) => return Some(stage),
                Ok(Some(other)) => {
                    debug!("Ignoring {:?} on stage stream", other);
                    if matches!(other, DaemonResponse::Ok) {
                        return None;
                    }
                }
                Ok(None) | Err(_) => return None,
            }
        }
    }

    /// Stop the stream and wait for the daemon to acknowledge
    pub async fn cancel(mut self) -> Result<(), DaemonError> {
        write_frame(&mut self.stream, &DaemonRequest::Cancel).await?;

        // Stages already in flight arrive before the acknowledgement
        let acknowledged = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match read_frame(&mut self.stream).await? {
                    Some(DaemonResponse::Ok) => return Ok(()),
                    Some(_) => continue,
                    None => return Err(DaemonError::Closed),
                }
            }
        })
        .await;

        match acknowledged {
            Ok(result) => result,
            Err(_) => Err(DaemonError::Timeout),
        }
    }
}
