//! Speaking queue state machine
//!
//! Per meeting: `Idle -> Speaking -> Idle`, driven only by [`SpeakingQueue::advance`],
//! with an orthogonal direct-response override entered and exited through
//! [`SpeakingQueue::start_direct_response`] and
//! [`SpeakingQueue::finish_direct_response`].
//!
//! Ordering is strictly by insertion. Entry type tags an entry but never
//! moves it.

mod direct_response;

pub use direct_response::{DirectResponseOverride, Responder};

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants;
use crate::models::{EntryType, QueueEntry};

/// Whoever currently holds the floor through normal rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speaker {
    pub participant_id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

impl Speaker {
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }
}

/// Ordered waiting list, current speaker, and the direct-response override.
///
/// The entry list mirrors persisted rows; the override is kept apart so it
/// can never leak into storage.
#[derive(Debug, Clone, Default)]
pub struct SpeakingQueue {
    entries: Vec<QueueEntry>,
    current: Option<Speaker>,
    direct_response: DirectResponseOverride,
}

impl SpeakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted state
    pub fn from_parts(entries: Vec<QueueEntry>, current: Option<Speaker>) -> Self {
        Self {
            entries,
            current,
            direct_response: DirectResponseOverride::default(),
        }
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Speaker from normal rotation, ignoring any override
    pub fn rotation_speaker(&self) -> Option<&Speaker> {
        self.current.as_ref()
    }

    /// Name of whoever has the floor right now. An active direct response
    /// takes precedence over the rotation speaker.
    pub fn current_speaker(&self) -> Option<&str> {
        match self.direct_response.responder() {
            Some(responder) => Some(responder.name.as_str()),
            None => self.current.as_ref().map(|s| s.name.as_str()),
        }
    }

    pub fn direct_response(&self) -> &DirectResponseOverride {
        &self.direct_response
    }

    /// Replace the waiting list with freshly fetched rows.
    /// Speaker and override are left alone.
    pub fn replace_entries(&mut self, entries: Vec<QueueEntry>) {
        self.entries = entries;
    }

    pub fn set_rotation_speaker(&mut self, current: Option<Speaker>) {
        self.current = current;
    }

    /// Append an entry at the tail.
    ///
    /// A second direct-response request while one is in progress is rejected;
    /// every other kind of join is accepted at any time.
    pub fn join(&mut self, entry: QueueEntry) -> Result<()> {
        if entry.entry_type == EntryType::DirectResponse {
            if let Some(responder) = self.direct_response.responder() {
                return Err(Error::DirectResponseActive(responder.name.clone()));
            }
        }
        debug!(
            participant = %entry.participant_name,
            entry_type = entry.entry_type.as_str(),
            position = self.entries.len(),
            "Queue join"
        );
        self.entries.push(entry);
        Ok(())
    }

    /// Remove a single entry by id
    pub fn remove_entry(&mut self, entry_id: Uuid) -> Option<QueueEntry> {
        let index = self.entries.iter().position(|e| e.id == entry_id)?;
        Some(self.entries.remove(index))
    }

    /// A participant leaves the queue.
    ///
    /// Drops their first pending entry. If they currently hold the floor,
    /// the floor passes to the next in line.
    pub fn leave(&mut self, participant_id: Uuid) -> Option<QueueEntry> {
        let removed = self
            .entries
            .iter()
            .position(|e| e.participant_id == participant_id)
            .map(|i| self.entries.remove(i));

        let was_speaking = self
            .current
            .as_ref()
            .is_some_and(|s| s.participant_id == participant_id);
        if was_speaking {
            self.advance();
        }

        removed
    }

    /// Next speaker: pop the head and give it the floor. An empty queue
    /// leaves nobody speaking.
    ///
    /// While a direct response is active the responder's own entries are
    /// skipped; they are already speaking and do not consume a slot.
    pub fn advance(&mut self) -> Option<QueueEntry> {
        self.advance_skipping(self.direct_response.participant_id())
    }

    /// [`advance`](Self::advance) with the skipped participant given
    /// explicitly, for callers that hold the override elsewhere.
    pub fn advance_skipping(&mut self, skip: Option<Uuid>) -> Option<QueueEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| Some(e.participant_id) != skip);

        match index {
            Some(i) => {
                let entry = self.entries.remove(i);
                self.current = Some(Speaker {
                    participant_id: entry.participant_id,
                    name: entry.participant_name.clone(),
                    started_at: Utc::now(),
                });
                Some(entry)
            }
            None => {
                self.current = None;
                None
            }
        }
    }

    /// Let `participant` reply immediately.
    ///
    /// `snapshot` is the queue as the caller sees it; it is restored by
    /// [`finish_direct_response`](Self::finish_direct_response).
    pub fn start_direct_response(
        &mut self,
        participant_id: Uuid,
        name: &str,
        snapshot: Vec<QueueEntry>,
    ) -> Result<()> {
        if !self
            .direct_response
            .begin(participant_id, name.to_string(), snapshot)
        {
            let active = self
                .direct_response
                .responder()
                .map(|r| r.name.clone())
                .unwrap_or_default();
            return Err(Error::DirectResponseActive(active));
        }
        invariants::assert_queue_invariants(self);
        debug!(participant = %name, "Direct response started");
        Ok(())
    }

    /// End the direct response and restore the snapshot without the
    /// responder. Returns `None` when no override was active.
    ///
    /// The returned list is the snapshot verbatim. The live entries keep
    /// the snapshot's order but drop whoever was advanced out during the
    /// override, and anyone who joined meanwhile stays at the tail.
    pub fn finish_direct_response(&mut self) -> Option<Vec<QueueEntry>> {
        let (responder, restored) = self.direct_response.end()?;
        invariants::assert_restored_queue_invariants(&restored, responder.participant_id);

        let live: HashSet<Uuid> = self.entries.iter().map(|e| e.id).collect();
        let snapshot_ids: HashSet<Uuid> = restored.iter().map(|e| e.id).collect();
        let joined = self
            .entries
            .iter()
            .filter(|e| !snapshot_ids.contains(&e.id))
            .filter(|e| e.participant_id != responder.participant_id)
            .cloned();
        self.entries = restored
            .iter()
            .filter(|e| live.contains(&e.id))
            .cloned()
            .chain(joined)
            .collect();

        debug!(
            participant = %responder.name,
            restored = restored.len(),
            waiting = self.entries.len(),
            "Direct response finished"
        );
        invariants::assert_queue_invariants(self);
        Some(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(meeting_id: Uuid, name: &str) -> QueueEntry {
        QueueEntry::new(meeting_id, Uuid::new_v4(), name.to_string(), EntryType::Speak)
    }

    fn queue_of(names: &[&str]) -> SpeakingQueue {
        let meeting_id = Uuid::new_v4();
        let mut queue = SpeakingQueue::new();
        for name in names {
            queue.join(entry(meeting_id, name)).unwrap();
        }
        queue
    }

    fn names(entries: &[QueueEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.participant_name.as_str()).collect()
    }

    #[test]
    fn test_advance_pops_head() {
        let mut queue = queue_of(&["A", "B", "C"]);
        queue.advance();
        assert_eq!(queue.current_speaker(), Some("A"));
        assert_eq!(names(queue.entries()), vec!["B", "C"]);
    }

    #[test]
    fn test_advance_drains_queue() {
        let mut queue = queue_of(&["A", "B", "C", "D"]);
        for _ in 0..4 {
            assert!(queue.advance().is_some());
            assert!(queue.current_speaker().is_some());
        }
        assert!(queue.is_empty());
        assert!(queue.advance().is_none());
        assert_eq!(queue.current_speaker(), None);
    }

    #[test]
    fn test_entry_type_does_not_reorder() {
        let meeting_id = Uuid::new_v4();
        let mut queue = SpeakingQueue::new();
        queue.join(entry(meeting_id, "A")).unwrap();
        queue
            .join(QueueEntry::new(
                meeting_id,
                Uuid::new_v4(),
                "B".into(),
                EntryType::PointOfProcess,
            ))
            .unwrap();
        queue.advance();
        assert_eq!(queue.current_speaker(), Some("A"));
    }

    #[test]
    fn test_direct_response_restores_snapshot() {
        let mut queue = queue_of(&["A", "B"]);
        let b = queue.entries()[1].clone();
        let snapshot = queue.entries().to_vec();

        queue
            .start_direct_response(b.participant_id, "B", snapshot)
            .unwrap();
        assert_eq!(queue.current_speaker(), Some("B"));
        assert_eq!(names(queue.entries()), vec!["A", "B"]);

        let restored = queue.finish_direct_response().unwrap();
        assert_eq!(names(&restored), vec!["A"]);
        assert!(!queue.direct_response().is_active());
        assert_eq!(names(queue.entries()), vec!["A"]);
    }

    #[test]
    fn test_second_direct_response_rejected() {
        let mut queue = queue_of(&["A", "B", "C"]);
        let snapshot = queue.entries().to_vec();
        let a = snapshot[0].clone();
        let c = snapshot[2].clone();

        queue
            .start_direct_response(a.participant_id, "A", snapshot.clone())
            .unwrap();
        let err = queue
            .start_direct_response(c.participant_id, "C", Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::DirectResponseActive(_)));

        assert_eq!(queue.current_speaker(), Some("A"));
        assert_eq!(queue.direct_response().snapshot().unwrap(), snapshot.as_slice());
    }

    #[test]
    fn test_finish_without_override_is_noop() {
        let mut queue = queue_of(&["A"]);
        assert!(queue.finish_direct_response().is_none());
        assert_eq!(names(queue.entries()), vec!["A"]);
    }

    #[test]
    fn test_speak_join_accepted_during_override() {
        let mut queue = queue_of(&["A"]);
        let a = queue.entries()[0].clone();
        queue
            .start_direct_response(a.participant_id, "A", queue.entries().to_vec())
            .unwrap();

        let meeting_id = a.meeting_id;
        assert!(queue.join(entry(meeting_id, "Z")).is_ok());

        let second = QueueEntry::new(
            meeting_id,
            Uuid::new_v4(),
            "Y".into(),
            EntryType::DirectResponse,
        );
        assert!(matches!(
            queue.join(second),
            Err(Error::DirectResponseActive(_))
        ));
    }

    #[test]
    fn test_advance_skips_responder_during_override() {
        let mut queue = queue_of(&["A", "B"]);
        let a = queue.entries()[0].clone();
        queue
            .start_direct_response(a.participant_id, "A", queue.entries().to_vec())
            .unwrap();

        let popped = queue.advance().unwrap();
        assert_eq!(popped.participant_name, "B");
        assert_eq!(queue.rotation_speaker().unwrap().name, "B");
        // Responder still has the floor until finished
        assert_eq!(queue.current_speaker(), Some("A"));
    }

    #[test]
    fn test_leave_while_speaking_promotes_next() {
        let mut queue = queue_of(&["A", "B", "C"]);
        queue.advance();
        assert_eq!(queue.current_speaker(), Some("A"));

        let a = queue.rotation_speaker().unwrap().participant_id;
        queue.leave(a);
        assert_eq!(queue.current_speaker(), Some("B"));
        assert_eq!(names(queue.entries()), vec!["C"]);
    }

    #[test]
    fn test_leave_pending_entry() {
        let mut queue = queue_of(&["A", "B", "C"]);
        let b = queue.entries()[1].participant_id;
        let removed = queue.leave(b).unwrap();
        assert_eq!(removed.participant_name, "B");
        assert_eq!(names(queue.entries()), vec!["A", "C"]);
        assert_eq!(queue.current_speaker(), None);
    }

    #[test]
    fn test_leave_by_id_with_duplicate_names() {
        let mut queue = queue_of(&["Sam", "Sam", "Cara"]);
        let second_sam = queue.entries()[1].participant_id;
        queue.advance();
        let speaking = queue.rotation_speaker().unwrap().participant_id;
        assert_ne!(speaking, second_sam);

        let removed = queue.leave(second_sam).unwrap();
        assert_eq!(removed.participant_id, second_sam);
        assert_eq!(queue.rotation_speaker().unwrap().participant_id, speaking);
        assert_eq!(names(queue.entries()), vec!["Cara"]);
    }

    #[test]
    fn test_finish_after_advance_during_override() {
        let mut queue = queue_of(&["A", "B", "C"]);
        let b = queue.entries()[1].clone();
        queue
            .start_direct_response(b.participant_id, "B", queue.entries().to_vec())
            .unwrap();

        let popped = queue.advance().unwrap();
        assert_eq!(popped.participant_name, "A");

        let restored = queue.finish_direct_response().unwrap();
        assert_eq!(names(&restored), vec!["A", "C"]);
        // A already spoke, so only C is still waiting
        assert_eq!(names(queue.entries()), vec!["C"]);
        assert_eq!(queue.current_speaker(), Some("A"));
    }

    #[test]
    fn test_finish_keeps_joins_made_during_override() {
        let mut queue = queue_of(&["A", "B"]);
        let a = queue.entries()[0].clone();
        queue
            .start_direct_response(a.participant_id, "A", queue.entries().to_vec())
            .unwrap();
        queue.join(entry(a.meeting_id, "Z")).unwrap();

        let restored = queue.finish_direct_response().unwrap();
        assert_eq!(names(&restored), vec!["B"]);
        assert_eq!(names(queue.entries()), vec!["B", "Z"]);
    }

    #[test]
    fn test_failed_start_keeps_first_responder() {
        let mut queue = queue_of(&["A", "B"]);
        let snapshot = queue.entries().to_vec();
        let a = snapshot[0].clone();
        let b = snapshot[1].clone();

        queue
            .start_direct_response(a.participant_id, "A", snapshot)
            .unwrap();
        let err = queue
            .start_direct_response(b.participant_id, "B", Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::DirectResponseActive(ref name) if name == "A"));
        assert_eq!(queue.direct_response().participant_id(), Some(a.participant_id));
    }
}
