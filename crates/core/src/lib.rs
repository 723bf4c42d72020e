//! Stack Core Library
//!
//! Models, join codes, permissions, the speaking-queue state machine,
//! lifecycle operations and storage for Stack Facilitation.

pub mod code;
pub mod error;
pub mod invariants;
pub mod lifecycle;
pub mod models;
pub mod permissions;
pub mod queue;
pub mod storage;

pub use code::{
    generate_meeting_code, generate_secure_random_string, is_valid_meeting_code_format,
    normalize_meeting_code,
};
pub use error::{Error, Result};
pub use lifecycle::RenameOutcome;
pub use models::*;
pub use permissions::*;
pub use queue::{DirectResponseOverride, Responder, Speaker, SpeakingQueue};
pub use storage::{
    ChangeHook, Database, MeetingRepository, ParticipantRepository, QueueRepository, Storage,
};
