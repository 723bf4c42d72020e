//! Storage repository traits
//!
//! These traits define the backend data service contract, allowing for
//! different implementations (SQLite, mock, hosted backend).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Meeting, Participant, QueueEntry};
use crate::queue::Speaker;

/// Meeting repository operations
pub trait MeetingRepository {
    /// Create a new meeting
    fn create_meeting(&self, meeting: &Meeting) -> Result<()>;

    /// Find meeting by ID
    fn find_meeting_by_id(&self, id: Uuid) -> Result<Option<Meeting>>;

    /// Find an active meeting by normalized code
    fn find_active_meeting_by_code(&self, code: &str) -> Result<Option<Meeting>>;

    /// Whether a code is already taken
    fn meeting_code_exists(&self, code: &str) -> Result<bool>;

    /// Activate or deactivate a meeting
    fn set_meeting_active(&self, meeting_id: Uuid, is_active: bool) -> Result<()>;

    /// Persist the current speaker, or clear it
    fn set_current_speaker(&self, meeting_id: Uuid, speaker: Option<&Speaker>) -> Result<()>;

    /// Delete a meeting and everything in it
    fn delete_meeting(&self, meeting_id: Uuid) -> Result<()>;

    /// Meetings eligible for housekeeping
    fn find_stale_meetings(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>>;
}

/// Participant repository operations
pub trait ParticipantRepository {
    /// Create a participant
    fn create_participant(&self, participant: &Participant) -> Result<()>;

    /// Find participant by ID
    fn find_participant_by_id(&self, id: Uuid) -> Result<Option<Participant>>;

    /// Active participants in join order
    fn list_participants(&self, meeting_id: Uuid) -> Result<Vec<Participant>>;

    /// Update a display name
    fn rename_participant(&self, meeting_id: Uuid, participant_id: Uuid, name: &str)
        -> Result<()>;

    /// Raise or lower a hand
    fn set_hand_raised(&self, meeting_id: Uuid, participant_id: Uuid, raised: bool) -> Result<()>;

    /// Mark a participant as having left
    fn deactivate_participant(&self, meeting_id: Uuid, participant_id: Uuid) -> Result<()>;

    /// Delete a participant row
    fn delete_participant(&self, meeting_id: Uuid, participant_id: Uuid) -> Result<()>;

    /// Count active participants
    fn count_active_participants(&self, meeting_id: Uuid) -> Result<u64>;
}

/// Queue repository operations
pub trait QueueRepository {
    /// Append an entry
    fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()>;

    /// Find an entry by ID
    fn find_queue_entry(&self, id: Uuid) -> Result<Option<QueueEntry>>;

    /// Entries in insertion order
    fn list_queue(&self, meeting_id: Uuid) -> Result<Vec<QueueEntry>>;

    /// Delete a single entry
    fn delete_queue_entry(&self, meeting_id: Uuid, entry_id: Uuid) -> Result<()>;

    /// Delete all entries for a participant
    fn delete_queue_entries_for(&self, meeting_id: Uuid, participant_id: Uuid) -> Result<()>;
}

/// Combined storage interface
///
/// Provides access to all repository operations.
/// Implementations may be backed by SQLite, mocks, or network.
pub trait Storage: MeetingRepository + ParticipantRepository + QueueRepository {}

// Blanket implementation: any type implementing all traits implements Storage
impl<T> Storage for T where T: MeetingRepository + ParticipantRepository + QueueRepository {}
