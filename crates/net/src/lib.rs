//! Stack networking
//!
//! Backend plumbing for the facilitation app.
//!
//! - **Connection**: retry, timeout, circuit breaking and request collapsing
//!   around every backend call
//! - **Realtime**: in-process change feed and per-meeting refetch subscriptions
//! - **Relay**: TCP server and client that forward change events to observers
//!   in other processes, using length-prefixed JSON frames
//!
//! # Usage
//!
//! ```ignore
//! let manager = Arc::new(ConnectionManager::new(ConnectionConfig::default()));
//! let meeting = manager
//!     .execute(manager.options(), || async { fetch_meeting(code).await })
//!     .await?;
//!
//! let feed = ChangeFeed::default();
//! db.set_change_hook(feed.hook());
//! let relay = RelayServer::start(addr, feed.clone(), None).await?;
//! ```

pub mod client;
pub mod connection;
pub mod error;
mod frame;
pub mod protocol;
pub mod realtime;
pub mod server;

pub use client::{probe, LinkState, RelayClient};
pub use connection::{
    backoff_delay, CallError, ConnectionConfig, ConnectionManager, ConnectionState,
    ExecuteOptions, ListenerId, Probe, ProbeFuture, Retryable,
};
pub use error::{Error, Result};
pub use protocol::Message;
pub use realtime::{subscribe, ChangeFeed, ChangeSource, SyncSubscription, ALL_TABLES};
pub use server::RelayServer;

/// Default port for the change relay
pub const DEFAULT_RELAY_PORT: u16 = 7341;
