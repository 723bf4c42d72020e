//! Queue entry storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{datetime_at, entry_type_at, uuid_at, OptionalExt};
use crate::error::Result;
use crate::models::QueueEntry;

pub struct QueueStore<'a> {
    conn: &'a Connection,
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: uuid_at(row, 0)?,
        meeting_id: uuid_at(row, 1)?,
        participant_id: uuid_at(row, 2)?,
        participant_name: row.get(3)?,
        entry_type: entry_type_at(row, 4)?,
        created_at: datetime_at(row, 5)?,
    })
}

impl<'a> QueueStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append an entry; `seq` is assigned by SQLite
    #[instrument(skip(self, entry), fields(meeting_id = %entry.meeting_id, entry_type = entry.entry_type.as_str()))]
    pub fn insert(&self, entry: &QueueEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO queue_entries (id, meeting_id, participant_id, participant_name, entry_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id.to_string(),
                entry.meeting_id.to_string(),
                entry.participant_id.to_string(),
                entry.participant_name,
                entry.entry_type.as_str(),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Find entry by ID
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<QueueEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT id, meeting_id, participant_id, participant_name, entry_type, created_at
                 FROM queue_entries WHERE id = ?1",
                params![id.to_string()],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Entries of a meeting in insertion order
    #[instrument(skip(self))]
    pub fn list_for_meeting(&self, meeting_id: Uuid) -> Result<Vec<QueueEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, meeting_id, participant_id, participant_name, entry_type, created_at
             FROM queue_entries WHERE meeting_id = ?1 ORDER BY seq",
        )?;

        let entries = stmt
            .query_map(params![meeting_id.to_string()], entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Delete one entry
    #[instrument(skip(self))]
    pub fn delete(&self, entry_id: Uuid) -> Result<usize> {
        let changed = self.conn.execute(
            "DELETE FROM queue_entries WHERE id = ?1",
            params![entry_id.to_string()],
        )?;
        Ok(changed)
    }

    /// Delete every pending entry of a participant
    #[instrument(skip(self))]
    pub fn delete_for_participant(&self, meeting_id: Uuid, participant_id: Uuid) -> Result<usize> {
        let changed = self.conn.execute(
            "DELETE FROM queue_entries WHERE meeting_id = ?1 AND participant_id = ?2",
            params![meeting_id.to_string(), participant_id.to_string()],
        )?;
        Ok(changed)
    }
}
