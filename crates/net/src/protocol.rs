//! Relay protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire.

use serde::{Deserialize, Serialize};
use stack_core::ChangeEvent;
use uuid::Uuid;

/// Relay protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Observer asks for change events, optionally scoped to one meeting
    Subscribe {
        meeting_id: Option<Uuid>,
        api_key: Option<String>,
    },

    /// Relay accepted the subscription
    Subscribed { meeting_id: Option<Uuid> },

    /// Relay refused the subscription
    Rejected { reason: String },

    /// A row-level change happened
    Change(ChangeEvent),

    /// Reachability check; answered with `Pong` even before subscribing
    Ping,

    /// Pong response to ping
    Pong,

    /// Relay is shutting down
    ServerShutdown,
}

impl Message {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
