//! Participant model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A person taking part in a meeting.
///
/// Display names are not unique; two participants may share a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub name: String,
    pub is_facilitator: bool,
    pub hand_raised: bool,
    pub joined_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Participant {
    pub fn new(meeting_id: Uuid, name: String, is_facilitator: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            meeting_id,
            name,
            is_facilitator,
            hand_raised: false,
            joined_at: Utc::now(),
            is_active: true,
        }
    }
}
