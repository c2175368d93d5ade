//! TCP server pushing room event streams to subscribers
//!
//! Each connection carries one room subscription. The client's first
//! frame must be `Subscribe`; after the handshake the server writes
//! events, keepalives and lag notices until the room closes, the client
//! unsubscribes or the server shuts down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use greenroom_core::{EventFanout, IdentityGateway, RoomSubscription, StreamItem};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::Message;

/// How long a client gets to present its `Subscribe` frame
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound frames buffered per connection
const WRITE_QUEUE: usize = 64;

/// Stream server handle
pub struct StreamServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl StreamServer {
    /// Start the server on the given port. Port 0 binds an ephemeral port;
    /// `addr` reports what was actually bound.
    ///
    /// When an identity gateway is supplied, every subscriber must present
    /// a credential that the gateway accepts.
    pub async fn start(
        port: u16,
        events: EventFanout,
        identity: Option<Arc<dyn IdentityGateway>>,
    ) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "event stream server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(accept_loop(
            listener,
            events,
            identity,
            shutdown_tx.subscribe(),
        ));

        Ok(StreamServer {
            addr: bound_addr,
            shutdown_tx,
        })
    }

    /// The server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and close every open stream
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("event stream server shutting down");
    }
}

async fn accept_loop(
    listener: TcpListener,
    events: EventFanout,
    identity: Option<Arc<dyn IdentityGateway>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "new connection");
                        let events = events.clone();
                        let identity = identity.clone();
                        let shutdown = shutdown_rx.resubscribe();
                        tokio::spawn(handle_connection(stream, addr, events, identity, shutdown));
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("accept loop stopped");
                break;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: EventFanout,
    identity: Option<Arc<dyn IdentityGateway>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let room_id = match handshake(&mut reader, &mut writer, identity.as_deref()).await {
        Ok(room_id) => room_id,
        Err(e) => {
            debug!(addr = %addr, error = %e, "handshake failed");
            return;
        }
    };
    info!(addr = %addr, room_id = %room_id, "subscriber attached");

    let (msg_tx, msg_rx) = mpsc::channel::<Message>(WRITE_QUEUE);
    let writer_handle = tokio::spawn(writer_task(writer, msg_rx));

    let subscription = events.subscribe(room_id);
    let forward_handle = tokio::spawn(forward_task(subscription, msg_tx.clone()));

    // Read loop: pings and the eventual unsubscribe
    loop {
        tokio::select! {
            frame = read_frame(&mut reader) => {
                match frame {
                    Ok(Message::Ping) => {
                        if msg_tx.send(Message::Pong).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Unsubscribe) => {
                        debug!(addr = %addr, room_id = %room_id, "unsubscribed");
                        break;
                    }
                    Ok(other) => {
                        warn!(addr = %addr, "ignoring unexpected frame: {other:?}");
                    }
                    Err(Error::ConnectionClosed) => break,
                    Err(e) => {
                        warn!(addr = %addr, error = %e, "read error");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                let _ = msg_tx.send(Message::Closed).await;
                break;
            }
        }
    }

    forward_handle.abort();
    drop(msg_tx);
    let _ = writer_handle.await;

    info!(addr = %addr, room_id = %room_id, "subscriber detached");
}

/// Expect `Subscribe` as the first frame, check the credential when the
/// server demands one and confirm the stream
async fn handshake(
    reader: &mut ReadHalf<TcpStream>,
    writer: &mut WriteHalf<TcpStream>,
    identity: Option<&dyn IdentityGateway>,
) -> Result<Uuid> {
    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame(reader))
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

    let (room_id, credential) = match first {
        Message::Subscribe {
            room_id,
            credential,
        } => (room_id, credential),
        _ => {
            let reason = "first frame must be subscribe".to_string();
            let _ = write_frame(
                writer,
                &Message::Rejected {
                    reason: reason.clone(),
                },
            )
            .await;
            return Err(Error::Protocol(reason));
        }
    };

    if let Some(gate) = identity {
        let Some(credential) = credential else {
            return reject(writer, "credential required".to_string()).await;
        };
        match gate.verify(&credential).await {
            Ok(profile) => {
                debug!(user_id = %profile.user_id, room_id = %room_id, "subscriber verified");
            }
            Err(e) => {
                return reject(writer, format!("credential refused: {e}")).await;
            }
        }
    }

    write_frame(writer, &Message::Subscribed { room_id }).await?;
    Ok(room_id)
}

async fn reject(writer: &mut WriteHalf<TcpStream>, reason: String) -> Result<Uuid> {
    let _ = write_frame(
        writer,
        &Message::Rejected {
            reason: reason.clone(),
        },
    )
    .await;
    Err(Error::Rejected(reason))
}

/// Pump stream items into the connection's write queue. Ends after the
/// room's stream closes or the writer goes away.
async fn forward_task(mut subscription: RoomSubscription, msg_tx: mpsc::Sender<Message>) {
    loop {
        let msg = match subscription.next().await {
            StreamItem::Event(event) => Message::Event(event),
            StreamItem::KeepAlive => Message::KeepAlive,
            StreamItem::Lagged(skipped) => Message::Lagged { skipped },
            StreamItem::Closed => {
                let _ = msg_tx.send(Message::Closed).await;
                break;
            }
        };
        if msg_tx.send(msg).await.is_err() {
            break;
        }
    }
}

async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        let close_after = msg == Message::Closed;
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "write failed");
            break;
        }
        if close_after {
            break;
        }
    }
}
