//! Row-level change notifications
//!
//! Every mutation performed by the storage layer produces one of these.
//! Subscribers refetch the affected collection instead of patching.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical tables a subscriber can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Meetings,
    Participants,
    QueueEntries,
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A change to one or more rows of a table, scoped to a meeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub meeting_id: Uuid,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind, meeting_id: Uuid) -> Self {
        Self {
            table,
            kind,
            meeting_id,
        }
    }
}
