//! Relay and transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed, oversized or unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Subscription rejected: {0}")]
    Rejected(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Timed out")]
    Timeout,
}

impl Error {
    /// The peer could not be reached or went away. A protocol error or a
    /// rejection means it answered, so those are not.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConnectionClosed | Error::NotConnected | Error::Timeout
        )
    }
}
