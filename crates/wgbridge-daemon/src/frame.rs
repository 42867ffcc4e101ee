//! Length-prefixed JSON frames

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DaemonError;

/// Largest frame either side accepts
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), DaemonError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes =
        serde_json::to_vec(message).map_err(|e| DaemonError::SerializationFailed(e.to_string()))?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(DaemonError::FrameTooLarge(bytes.len()));
    }

    let len = (bytes.len() as u32).to_be_bytes();
    writer
        .write_all(&len)
        .await
        .map_err(|e| DaemonError::SendFailed(e.to_string()))?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| DaemonError::SendFailed(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| DaemonError::SendFailed(e.to_string()))
}

/// Read the next frame. `Ok(None)` means the peer closed the connection between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, DaemonError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(DaemonError::ReceiveFailed(e.to_string())),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(DaemonError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| DaemonError::ReceiveFailed(e.to_string()))?;

    serde_json::from_slice(&buf)
        .map(Some)
        .map_err(|e| DaemonError::DeserializationFailed(e.to_string()))
}
