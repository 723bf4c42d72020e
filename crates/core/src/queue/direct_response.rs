//! Direct-response override
//!
//! Ephemeral bookkeeping that lets one participant reply immediately
//! without reordering the persisted queue. Never written to storage.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::QueueEntry;

/// The participant currently responding out of turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Responder {
    pub participant_id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

/// At most one override is active at a time
#[derive(Debug, Clone, Default)]
pub struct DirectResponseOverride {
    active: Option<ActiveOverride>,
}

#[derive(Debug, Clone)]
struct ActiveOverride {
    responder: Responder,
    snapshot: Vec<QueueEntry>,
}

impl DirectResponseOverride {
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn responder(&self) -> Option<&Responder> {
        self.active.as_ref().map(|a| &a.responder)
    }

    pub fn participant_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|a| a.responder.participant_id)
    }

    /// Queue as it was when the override began
    pub fn snapshot(&self) -> Option<&[QueueEntry]> {
        self.active.as_ref().map(|a| a.snapshot.as_slice())
    }

    /// Activate. Returns false and leaves the existing override untouched
    /// when one is already active.
    pub(crate) fn begin(
        &mut self,
        participant_id: Uuid,
        name: String,
        snapshot: Vec<QueueEntry>,
    ) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some(ActiveOverride {
            responder: Responder {
                participant_id,
                name,
                started_at: Utc::now(),
            },
            snapshot,
        });
        true
    }

    /// Deactivate and hand back the snapshot minus the responder's entries
    pub(crate) fn end(&mut self) -> Option<(Responder, Vec<QueueEntry>)> {
        let active = self.active.take()?;
        let responder_id = active.responder.participant_id;
        let restored = active
            .snapshot
            .into_iter()
            .filter(|e| e.participant_id != responder_id)
            .collect();
        Some((active.responder, restored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryType;

    #[test]
    fn test_begin_refuses_while_active() {
        let meeting_id = Uuid::new_v4();
        let first = QueueEntry::new(meeting_id, Uuid::new_v4(), "A".into(), EntryType::Speak);
        let mut dr = DirectResponseOverride::default();

        assert!(dr.begin(first.participant_id, "A".into(), vec![first.clone()]));
        assert!(!dr.begin(Uuid::new_v4(), "B".into(), Vec::new()));
        assert_eq!(dr.responder().unwrap().name, "A");
        assert_eq!(dr.snapshot().unwrap(), &[first]);
    }

    #[test]
    fn test_end_drops_responder_entries() {
        let meeting_id = Uuid::new_v4();
        let responder = Uuid::new_v4();
        let snapshot = vec![
            QueueEntry::new(meeting_id, responder, "A".into(), EntryType::Speak),
            QueueEntry::new(meeting_id, Uuid::new_v4(), "B".into(), EntryType::Speak),
            QueueEntry::new(meeting_id, responder, "A".into(), EntryType::Clarification),
        ];
        let mut dr = DirectResponseOverride::default();
        dr.begin(responder, "A".into(), snapshot);

        let (who, restored) = dr.end().unwrap();
        assert_eq!(who.participant_id, responder);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].participant_name, "B");
        assert!(!dr.is_active());
        assert!(dr.end().is_none());
    }
}
