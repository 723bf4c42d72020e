//! Meeting model - a room with a join code and a facilitator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A meeting room participants join by code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    /// Six character join code, stored uppercase. Immutable once created.
    pub code: String,
    pub title: String,
    /// Participant id of the facilitator
    pub facilitator_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Name of the participant currently holding the floor
    pub current_speaker: Option<String>,
    /// Participant id of the current speaker. Names may repeat, ids do not.
    pub current_speaker_id: Option<Uuid>,
    /// When the current speaker started (for elapsed-time display)
    pub speaking_since: Option<DateTime<Utc>>,
}

impl Meeting {
    pub fn new(code: String, title: String, facilitator_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            title,
            facilitator_id,
            is_active: true,
            created_at: Utc::now(),
            current_speaker: None,
            current_speaker_id: None,
            speaking_since: None,
        }
    }

    /// Check whether the given participant facilitates this meeting
    pub fn is_facilitated_by(&self, participant_id: Uuid) -> bool {
        self.facilitator_id == participant_id
    }
}
