//! Length-prefixed frame codec
//!
//! Wire format: 4-byte big-endian payload length, then the JSON payload.
//! Frames above 1MB are refused before the payload is read.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::Message;

/// Upper bound on a single frame's payload
const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Read one frame from a stream
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(map_eof)?;

    let len = u32::from_be_bytes(len_buf);
    if len == 0 {
        return Err(Error::Protocol("empty frame".into()));
    }
    if len > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_SIZE} byte limit"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(map_eof)?;

    Message::from_bytes(&payload).map_err(|e| Error::Protocol(format!("invalid frame: {e}")))
}

/// Write one frame to a stream
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    let payload = msg
        .to_bytes()
        .map_err(|e| Error::Protocol(format!("unserializable message: {e}")))?;
    let len = payload.len() as u32;
    if len > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_SIZE} byte limit"
        )));
    }

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// A peer hanging up mid-frame is a closed connection, not an IO fault
fn map_eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let sent = Message::Subscribed {
            room_id: Uuid::new_v4(),
        };
        write_frame(&mut client, &sent).await.unwrap();
        let received = read_frame(&mut server).await.unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn test_hangup_reads_as_connection_closed() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_refused() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let _ = tokio::io::AsyncWriteExt::write_all(
                &mut client,
                &(MAX_FRAME_SIZE + 1).to_be_bytes(),
            )
            .await;
        });
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_garbage_payload_is_a_protocol_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let payload = b"not json";
            let _ = tokio::io::AsyncWriteExt::write_all(
                &mut client,
                &(payload.len() as u32).to_be_bytes(),
            )
            .await;
            let _ = tokio::io::AsyncWriteExt::write_all(&mut client, payload).await;
        });
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
