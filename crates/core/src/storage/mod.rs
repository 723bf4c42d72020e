//! SQLite storage layer
//!
//! Stands in for the hosted backend: CRUD on meetings, participants and
//! queue rows, plus a change hook that fires after every successful
//! mutation so realtime subscribers can refetch.

mod meetings;
mod migrations;
mod parse;
mod participants;
mod queue;
mod traits;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ChangeEvent, ChangeKind, Meeting, Participant, QueueEntry, Table};
use crate::queue::Speaker;
use rusqlite::Connection;
use std::path::Path;
use tracing::instrument;

pub use meetings::MeetingStore;
pub use participants::ParticipantStore;
pub use queue::QueueStore;
pub use traits::{MeetingRepository, ParticipantRepository, QueueRepository, Storage};

/// Callback invoked after each committed change
pub type ChangeHook = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Main database handle
pub struct Database {
    conn: Connection,
    change_hook: Option<ChangeHook>,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self {
            conn,
            change_hook: None,
        };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self {
            conn,
            change_hook: None,
        };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    /// Install the change hook, replacing any previous one
    pub fn set_change_hook(&mut self, hook: ChangeHook) {
        self.change_hook = Some(hook);
    }

    pub fn meetings(&self) -> MeetingStore<'_> {
        MeetingStore::new(&self.conn)
    }

    pub fn participants(&self) -> ParticipantStore<'_> {
        ParticipantStore::new(&self.conn)
    }

    pub fn queue(&self) -> QueueStore<'_> {
        QueueStore::new(&self.conn)
    }

    fn notify(&self, table: Table, kind: ChangeKind, meeting_id: Uuid) {
        if let Some(hook) = &self.change_hook {
            hook(&ChangeEvent::new(table, kind, meeting_id));
        }
    }
}

impl MeetingRepository for Database {
    fn create_meeting(&self, meeting: &Meeting) -> Result<()> {
        self.meetings().create(meeting)?;
        self.notify(Table::Meetings, ChangeKind::Insert, meeting.id);
        Ok(())
    }

    fn find_meeting_by_id(&self, id: Uuid) -> Result<Option<Meeting>> {
        self.meetings().find_by_id(id)
    }

    fn find_active_meeting_by_code(&self, code: &str) -> Result<Option<Meeting>> {
        self.meetings().find_active_by_code(code)
    }

    fn meeting_code_exists(&self, code: &str) -> Result<bool> {
        self.meetings().code_exists(code)
    }

    fn set_meeting_active(&self, meeting_id: Uuid, is_active: bool) -> Result<()> {
        self.meetings().set_active(meeting_id, is_active)?;
        self.notify(Table::Meetings, ChangeKind::Update, meeting_id);
        Ok(())
    }

    fn set_current_speaker(&self, meeting_id: Uuid, speaker: Option<&Speaker>) -> Result<()> {
        if self.meetings().set_current_speaker(meeting_id, speaker)? > 0 {
            self.notify(Table::Meetings, ChangeKind::Update, meeting_id);
        }
        Ok(())
    }

    fn delete_meeting(&self, meeting_id: Uuid) -> Result<()> {
        self.meetings().delete(meeting_id)?;
        self.notify(Table::Meetings, ChangeKind::Delete, meeting_id);
        Ok(())
    }

    fn find_stale_meetings(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        self.meetings().find_stale(cutoff)
    }
}

impl ParticipantRepository for Database {
    fn create_participant(&self, participant: &Participant) -> Result<()> {
        self.participants().create(participant)?;
        self.notify(Table::Participants, ChangeKind::Insert, participant.meeting_id);
        Ok(())
    }

    fn find_participant_by_id(&self, id: Uuid) -> Result<Option<Participant>> {
        self.participants().find_by_id(id)
    }

    fn list_participants(&self, meeting_id: Uuid) -> Result<Vec<Participant>> {
        self.participants().list_for_meeting(meeting_id)
    }

    fn rename_participant(
        &self,
        meeting_id: Uuid,
        participant_id: Uuid,
        name: &str,
    ) -> Result<()> {
        if self.participants().rename(participant_id, name)? > 0 {
            self.notify(Table::Participants, ChangeKind::Update, meeting_id);
        }
        Ok(())
    }

    fn set_hand_raised(&self, meeting_id: Uuid, participant_id: Uuid, raised: bool) -> Result<()> {
        if self.participants().set_hand_raised(participant_id, raised)? > 0 {
            self.notify(Table::Participants, ChangeKind::Update, meeting_id);
        }
        Ok(())
    }

    fn deactivate_participant(&self, meeting_id: Uuid, participant_id: Uuid) -> Result<()> {
        if self.participants().deactivate(participant_id)? > 0 {
            self.notify(Table::Participants, ChangeKind::Update, meeting_id);
        }
        Ok(())
    }

    fn delete_participant(&self, meeting_id: Uuid, participant_id: Uuid) -> Result<()> {
        if self.participants().delete(participant_id)? > 0 {
            self.notify(Table::Participants, ChangeKind::Delete, meeting_id);
        }
        Ok(())
    }

    fn count_active_participants(&self, meeting_id: Uuid) -> Result<u64> {
        self.participants().count_active(meeting_id)
    }
}

impl QueueRepository for Database {
    fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        self.queue().insert(entry)?;
        self.notify(Table::QueueEntries, ChangeKind::Insert, entry.meeting_id);
        Ok(())
    }

    fn find_queue_entry(&self, id: Uuid) -> Result<Option<QueueEntry>> {
        self.queue().find_by_id(id)
    }

    fn list_queue(&self, meeting_id: Uuid) -> Result<Vec<QueueEntry>> {
        self.queue().list_for_meeting(meeting_id)
    }

    fn delete_queue_entry(&self, meeting_id: Uuid, entry_id: Uuid) -> Result<()> {
        if self.queue().delete(entry_id)? > 0 {
            self.notify(Table::QueueEntries, ChangeKind::Delete, meeting_id);
        }
        Ok(())
    }

    fn delete_queue_entries_for(&self, meeting_id: Uuid, participant_id: Uuid) -> Result<()> {
        if self
            .queue()
            .delete_for_participant(meeting_id, participant_id)?
            > 0
        {
            self.notify(Table::QueueEntries, ChangeKind::Delete, meeting_id);
        }
        Ok(())
    }
}
