//! Data models for Stack Facilitation

mod change;
mod meeting;
mod participant;
mod queue_entry;

pub use change::*;
pub use meeting::*;
pub use participant::*;
pub use queue_entry::*;
