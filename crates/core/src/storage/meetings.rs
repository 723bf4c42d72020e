//! Meeting storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{datetime_at, datetime_opt_at, uuid_at, uuid_opt_at, OptionalExt};
use crate::error::Result;
use crate::models::Meeting;
use crate::queue::Speaker;

const MEETING_COLUMNS: &str =
    "id, code, title, facilitator_id, is_active, created_at, current_speaker, speaking_since, current_speaker_id";

pub struct MeetingStore<'a> {
    conn: &'a Connection,
}

fn meeting_from_row(row: &Row<'_>) -> rusqlite::Result<Meeting> {
    Ok(Meeting {
        id: uuid_at(row, 0)?,
        code: row.get(1)?,
        title: row.get(2)?,
        facilitator_id: uuid_at(row, 3)?,
        is_active: row.get::<_, i32>(4)? != 0,
        created_at: datetime_at(row, 5)?,
        current_speaker: row.get(6)?,
        speaking_since: datetime_opt_at(row, 7)?,
        current_speaker_id: uuid_opt_at(row, 8)?,
    })
}

impl<'a> MeetingStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new meeting
    #[instrument(skip(self, meeting), fields(meeting_id = %meeting.id, code = %meeting.code))]
    pub fn create(&self, meeting: &Meeting) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meetings (id, code, title, facilitator_id, is_active, created_at, current_speaker, speaking_since, current_speaker_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                meeting.id.to_string(),
                meeting.code,
                meeting.title,
                meeting.facilitator_id.to_string(),
                meeting.is_active as i32,
                meeting.created_at.to_rfc3339(),
                meeting.current_speaker,
                meeting.speaking_since.map(|t| t.to_rfc3339()),
                meeting.current_speaker_id.map(|id| id.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Find meeting by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Meeting>> {
        let sql = format!("SELECT {} FROM meetings WHERE id = ?1", MEETING_COLUMNS);
        let meeting = self
            .conn
            .query_row(&sql, params![id.to_string()], meeting_from_row)
            .optional()?;
        Ok(meeting)
    }

    /// Find an active meeting by its (already normalized) code
    #[instrument(skip(self))]
    pub fn find_active_by_code(&self, code: &str) -> Result<Option<Meeting>> {
        let sql = format!(
            "SELECT {} FROM meetings WHERE code = ?1 AND is_active = 1",
            MEETING_COLUMNS
        );
        let meeting = self
            .conn
            .query_row(&sql, params![code], meeting_from_row)
            .optional()?;
        Ok(meeting)
    }

    /// Whether any meeting, active or not, already holds this code
    pub fn code_exists(&self, code: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM meetings WHERE code = ?1",
            params![code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Activate or deactivate a meeting
    #[instrument(skip(self))]
    pub fn set_active(&self, meeting_id: Uuid, is_active: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE meetings SET is_active = ?1 WHERE id = ?2",
            params![is_active as i32, meeting_id.to_string()],
        )?;
        Ok(())
    }

    /// Record who holds the floor; `None` clears it
    #[instrument(skip(self))]
    pub fn set_current_speaker(&self, meeting_id: Uuid, speaker: Option<&Speaker>) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE meetings
             SET current_speaker = ?1, speaking_since = ?2, current_speaker_id = ?3
             WHERE id = ?4",
            params![
                speaker.map(|s| s.name.as_str()),
                speaker.map(|s| s.started_at.to_rfc3339()),
                speaker.map(|s| s.participant_id.to_string()),
                meeting_id.to_string()
            ],
        )?;
        Ok(rows)
    }

    /// Delete meeting (participants and queue rows cascade)
    #[instrument(skip(self))]
    pub fn delete(&self, meeting_id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM meetings WHERE id = ?1",
            params![meeting_id.to_string()],
        )?;
        Ok(())
    }

    /// Inactive meetings with no active participants created before `cutoff`
    #[instrument(skip(self))]
    pub fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id FROM meetings m
             WHERE m.is_active = 0
               AND m.created_at < ?1
               AND NOT EXISTS (
                   SELECT 1 FROM participants p
                   WHERE p.meeting_id = m.id AND p.is_active = 1
               )",
        )?;

        let ids = stmt
            .query_map(params![cutoff.to_rfc3339()], |row| {
                uuid_at(row, 0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ids)
    }
}
