//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use std::collections::HashSet;

use uuid::Uuid;

use crate::code::{is_valid_meeting_code_format, CODE_ALPHABET};
use crate::models::{Meeting, Participant, QueueEntry};
use crate::queue::SpeakingQueue;

/// Validate that a freshly created meeting is internally consistent
pub fn assert_meeting_invariants(meeting: &Meeting) {
    debug_assert!(
        is_valid_meeting_code_format(&meeting.code),
        "Meeting {} has malformed code {:?}",
        meeting.id,
        meeting.code
    );

    debug_assert!(
        meeting.code.bytes().all(|b| CODE_ALPHABET.contains(&b)),
        "Meeting {} code {:?} uses characters outside the generator alphabet",
        meeting.id,
        meeting.code
    );

    debug_assert!(
        !meeting.title.trim().is_empty(),
        "Meeting {} has empty title",
        meeting.id
    );
}

/// Validate the active participant list of a meeting
pub fn assert_participant_list_invariants(participants: &[Participant], meeting: &Meeting) {
    // The facilitator may have left, but there is never more than one
    let facilitators: Vec<_> = participants.iter().filter(|p| p.is_facilitator).collect();
    debug_assert!(
        facilitators.len() <= 1,
        "Meeting {} has {} facilitators",
        meeting.id,
        facilitators.len()
    );

    if let Some(facilitator) = facilitators.first() {
        debug_assert!(
            facilitator.id == meeting.facilitator_id,
            "Meeting {} facilitator flag on {} but meeting names {}",
            meeting.id,
            facilitator.id,
            meeting.facilitator_id
        );
    }

    debug_assert!(
        participants.iter().all(|p| p.meeting_id == meeting.id),
        "Participant list for meeting {} contains foreign participants",
        meeting.id
    );
}

/// Validate queue/override consistency
pub fn assert_queue_invariants(queue: &SpeakingQueue) {
    let override_state = queue.direct_response();
    debug_assert!(
        override_state.is_active() == override_state.snapshot().is_some(),
        "Direct response active flag disagrees with snapshot presence"
    );

    debug_assert!(
        ids_unique(queue.entries()),
        "Queue holds the same entry twice"
    );

    if let Some(snapshot) = override_state.snapshot() {
        debug_assert!(
            ids_unique(snapshot),
            "Direct response snapshot holds the same entry twice"
        );
    }
}

/// The queue handed back after a direct response never contains the responder
pub fn assert_restored_queue_invariants(restored: &[QueueEntry], responder_id: Uuid) {
    debug_assert!(
        restored.iter().all(|e| e.participant_id != responder_id),
        "Restored queue still contains responder {}",
        responder_id
    );
    debug_assert!(
        ids_unique(restored),
        "Restored queue holds the same entry twice"
    );
}

fn ids_unique(entries: &[QueueEntry]) -> bool {
    let mut seen = HashSet::with_capacity(entries.len());
    entries.iter().all(|e| seen.insert(e.id))
}
