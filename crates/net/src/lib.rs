//! Greenroom Network Library
//!
//! TCP transport for the lobby's live room event streams.
//!
//! # Architecture
//!
//! - **Server**: run next to the lobby, pushes each room's events to its
//!   subscribers
//! - **Client**: subscribes to one room and reads events
//! - **Protocol**: length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! // Serve the lobby's event fanout, verifying subscriber credentials
//! let server = StreamServer::start(DEFAULT_PORT, lobby.events().clone(), Some(identity)).await?;
//!
//! // A client follows one room
//! let mut client = StreamClient::subscribe(addr, room_id, Some(token)).await?;
//! while let Some(event) = client.next_event().await? {
//!     println!("{}: {}", event.room_id, event.kind());
//! }
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use client::StreamClient;
pub use error::{Error, Result};
pub use protocol::Message;
pub use server::StreamServer;

/// Default port for Greenroom stream servers
pub const DEFAULT_PORT: u16 = 7341;
