//! Stack application layer
//!
//! Composes the core and the network crate into what a front-end talks to:
//! configuration, shared state, per-participant meeting sessions and the
//! housekeeping task.

pub mod config;
pub mod error;
pub mod housekeeping;
pub mod optimistic;
pub mod session;
pub mod state;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use session::{MeetingSession, SessionView};
pub use state::{AppState, CallResult};
