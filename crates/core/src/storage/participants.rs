//! Participant storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{datetime_at, uuid_at, OptionalExt};
use crate::error::Result;
use crate::models::Participant;

pub struct ParticipantStore<'a> {
    conn: &'a Connection,
}

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: uuid_at(row, 0)?,
        meeting_id: uuid_at(row, 1)?,
        name: row.get(2)?,
        is_facilitator: row.get::<_, i32>(3)? != 0,
        hand_raised: row.get::<_, i32>(4)? != 0,
        joined_at: datetime_at(row, 5)?,
        is_active: row.get::<_, i32>(6)? != 0,
    })
}

impl<'a> ParticipantStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a participant
    #[instrument(skip(self, participant), fields(meeting_id = %participant.meeting_id, facilitator = participant.is_facilitator))]
    pub fn create(&self, participant: &Participant) -> Result<()> {
        self.conn.execute(
            "INSERT INTO participants (id, meeting_id, name, is_facilitator, hand_raised, joined_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                participant.id.to_string(),
                participant.meeting_id.to_string(),
                participant.name,
                participant.is_facilitator as i32,
                participant.hand_raised as i32,
                participant.joined_at.to_rfc3339(),
                participant.is_active as i32,
            ],
        )?;
        Ok(())
    }

    /// Find participant by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Participant>> {
        let participant = self
            .conn
            .query_row(
                "SELECT id, meeting_id, name, is_facilitator, hand_raised, joined_at, is_active
                 FROM participants WHERE id = ?1",
                params![id.to_string()],
                participant_from_row,
            )
            .optional()?;
        Ok(participant)
    }

    /// Active participants of a meeting in join order
    #[instrument(skip(self))]
    pub fn list_for_meeting(&self, meeting_id: Uuid) -> Result<Vec<Participant>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, meeting_id, name, is_facilitator, hand_raised, joined_at, is_active
             FROM participants
             WHERE meeting_id = ?1 AND is_active = 1
             ORDER BY joined_at, rowid",
        )?;

        let participants = stmt
            .query_map(params![meeting_id.to_string()], participant_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(participants)
    }

    /// Update display name
    #[instrument(skip(self))]
    pub fn rename(&self, participant_id: Uuid, name: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE participants SET name = ?1 WHERE id = ?2",
            params![name, participant_id.to_string()],
        )?;
        Ok(changed)
    }

    /// Raise or lower a hand
    #[instrument(skip(self))]
    pub fn set_hand_raised(&self, participant_id: Uuid, raised: bool) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE participants SET hand_raised = ?1 WHERE id = ?2",
            params![raised as i32, participant_id.to_string()],
        )?;
        Ok(changed)
    }

    /// Mark a participant as gone without deleting the row
    #[instrument(skip(self))]
    pub fn deactivate(&self, participant_id: Uuid) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE participants SET is_active = 0, hand_raised = 0 WHERE id = ?1",
            params![participant_id.to_string()],
        )?;
        Ok(changed)
    }

    /// Delete participant row
    #[instrument(skip(self))]
    pub fn delete(&self, participant_id: Uuid) -> Result<usize> {
        let changed = self.conn.execute(
            "DELETE FROM participants WHERE id = ?1",
            params![participant_id.to_string()],
        )?;
        Ok(changed)
    }

    /// Number of active participants in a meeting
    pub fn count_active(&self, meeting_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM participants WHERE meeting_id = ?1 AND is_active = 1",
            params![meeting_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
