//! TCP client for consuming a room's event stream

use std::net::SocketAddr;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, warn};
use uuid::Uuid;

use greenroom_core::RoomEvent;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Message;

/// One subscribed connection to a stream server
#[derive(Debug)]
pub struct StreamClient {
    room_id: Uuid,
    reader: ReadHalf<TcpStream>,
    writer: WriteHalf<TcpStream>,
}

impl StreamClient {
    /// Connect and subscribe to one room's stream. Fails if the server
    /// rejects the subscription.
    pub async fn subscribe(
        addr: SocketAddr,
        room_id: Uuid,
        credential: Option<String>,
    ) -> Result<Self> {
        debug!(addr = %addr, room_id = %room_id, "subscribing");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        write_frame(
            &mut writer,
            &Message::Subscribe {
                room_id,
                credential,
            },
        )
        .await?;

        match read_frame(&mut reader).await? {
            Message::Subscribed { .. } => {}
            Message::Rejected { reason } => return Err(Error::Rejected(reason)),
            other => {
                return Err(Error::Protocol(format!(
                    "expected subscription confirmation, got {other:?}"
                )))
            }
        }

        Ok(StreamClient {
            room_id,
            reader,
            writer,
        })
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Next raw frame from the server, keepalives included
    pub async fn next(&mut self) -> Result<Message> {
        read_frame(&mut self.reader).await
    }

    /// Next room event. Keepalives and pongs are skipped, lag notices are
    /// logged; `Ok(None)` means the stream is over.
    pub async fn next_event(&mut self) -> Result<Option<RoomEvent>> {
        loop {
            match self.next().await {
                Ok(Message::Event(event)) => return Ok(Some(event)),
                Ok(Message::KeepAlive | Message::Pong) => continue,
                Ok(Message::Lagged { skipped }) => {
                    warn!(room_id = %self.room_id, skipped, "stream lagged");
                    continue;
                }
                Ok(Message::Closed) => return Ok(None),
                Ok(other) => {
                    return Err(Error::Protocol(format!("unexpected frame: {other:?}")))
                }
                Err(Error::ConnectionClosed) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    /// Probe the connection; the server answers with `Pong`
    pub async fn ping(&mut self) -> Result<()> {
        write_frame(&mut self.writer, &Message::Ping).await
    }

    /// Tell the server we are done and drop the connection
    pub async fn unsubscribe(mut self) -> Result<()> {
        write_frame(&mut self.writer, &Message::Unsubscribe).await
    }
}
