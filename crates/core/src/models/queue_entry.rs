//! Speaking queue entries

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// How a queue entry should be handled when its turn comes.
///
/// The type never changes ordering; it only tags the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    #[default]
    Speak,
    DirectResponse,
    ClarifyingQuestion,
    PointOfProcess,
    PointOfInfo,
    Clarification,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Speak => "speak",
            EntryType::DirectResponse => "direct-response",
            EntryType::ClarifyingQuestion => "clarifying-question",
            EntryType::PointOfProcess => "point-of-process",
            EntryType::PointOfInfo => "point-of-info",
            EntryType::Clarification => "clarification",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EntryType::Speak => "Speak",
            EntryType::DirectResponse => "Direct Response",
            EntryType::ClarifyingQuestion => "Clarifying Question",
            EntryType::PointOfProcess => "Point of Process",
            EntryType::PointOfInfo => "Point of Information",
            EntryType::Clarification => "Clarification",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speak" => Ok(EntryType::Speak),
            "direct-response" => Ok(EntryType::DirectResponse),
            "clarifying-question" => Ok(EntryType::ClarifyingQuestion),
            "point-of-process" => Ok(EntryType::PointOfProcess),
            "point-of-info" => Ok(EntryType::PointOfInfo),
            "clarification" => Ok(EntryType::Clarification),
            other => Err(Error::Validation(format!("unknown entry type '{}'", other))),
        }
    }
}

/// A participant waiting to speak.
///
/// `participant_name` is denormalized so the queue still renders after the
/// participant row is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub participant_id: Uuid,
    pub participant_name: String,
    pub entry_type: EntryType,
    pub created_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(
        meeting_id: Uuid,
        participant_id: Uuid,
        participant_name: String,
        entry_type: EntryType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            meeting_id,
            participant_id,
            participant_name,
            entry_type,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_str_roundtrip() {
        for ty in [
            EntryType::Speak,
            EntryType::DirectResponse,
            EntryType::ClarifyingQuestion,
            EntryType::PointOfProcess,
            EntryType::PointOfInfo,
            EntryType::Clarification,
        ] {
            assert_eq!(ty.as_str().parse::<EntryType>().unwrap(), ty);
        }
        assert!("shout".parse::<EntryType>().is_err());
    }

    #[test]
    fn test_entry_type_serde_is_kebab_case() {
        let json = serde_json::to_string(&EntryType::PointOfProcess).unwrap();
        assert_eq!(json, "\"point-of-process\"");
    }
}
