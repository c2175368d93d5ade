//! Wire protocol for the room event stream
//!
//! All messages are JSON-serialized and length-prefixed on the wire. A
//! connection carries exactly one subscription: the client opens with
//! `Subscribe` and the server answers `Subscribed` or `Rejected`, then
//! pushes room events until the room closes or either side hangs up.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use greenroom_core::RoomEvent;

/// Stream protocol messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Client asks for a room's event stream. The credential is checked
    /// against the identity service when the server is wired to one.
    Subscribe {
        room_id: Uuid,
        credential: Option<String>,
    },

    /// Client is done with the stream
    Unsubscribe,

    /// Client liveness probe
    Ping,

    /// Server accepted the subscription
    Subscribed { room_id: Uuid },

    /// Server declined the subscription
    Rejected { reason: String },

    /// A room event
    Event(RoomEvent),

    /// Quiet-period liveness signal from the server
    KeepAlive,

    /// Answer to `Ping`
    Pong,

    /// The subscriber fell behind and `skipped` events were dropped
    Lagged { skipped: u64 },

    /// The stream is over: the room closed or the server is going away
    Closed,
}

impl Message {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
