//! Meeting, participant and queue lifecycle
//!
//! Every operation here runs against a [`Storage`] implementation and
//! enforces role checks before touching it. Validation happens before the
//! first storage call so bad input never costs a round trip.

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::code::{generate_meeting_code, is_valid_meeting_code_format, normalize_meeting_code};
use crate::error::{Error, Result};
use crate::invariants::{assert_meeting_invariants, assert_participant_list_invariants};
use crate::models::{EntryType, Meeting, Participant, QueueEntry};
use crate::permissions::{MeetingAction, MeetingRole, PermissionMatrix};
use crate::queue::{Speaker, SpeakingQueue};
use crate::storage::Storage;

/// How many fresh codes to try before reporting a collision
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// Outcome of a rename request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// Name stored
    Renamed(String),
    /// Trimmed name was empty or identical; nothing written
    Unchanged,
}

fn require_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

fn require_participant<S: Storage + ?Sized>(storage: &S, participant_id: Uuid) -> Result<Participant> {
    storage
        .find_participant_by_id(participant_id)?
        .filter(|p| p.is_active)
        .ok_or_else(|| Error::NotFound(format!("participant {}", participant_id)))
}

/// Load the actor and check it may perform `action` in `meeting_id`
fn authorize<S: Storage + ?Sized>(
    storage: &S,
    actor_id: Uuid,
    meeting_id: Uuid,
    action: MeetingAction,
) -> Result<Participant> {
    let actor = require_participant(storage, actor_id)?;
    if actor.meeting_id != meeting_id {
        return Err(Error::PermissionDenied(
            "actor is not part of this meeting".into(),
        ));
    }
    if !PermissionMatrix::can_perform(MeetingRole::from_flag(actor.is_facilitator), action) {
        return Err(Error::PermissionDenied(format!(
            "{:?} requires the facilitator role",
            action
        )));
    }
    Ok(actor)
}

/// Create a meeting and its facilitator
#[instrument(skip(storage))]
pub fn create_meeting<S: Storage + ?Sized>(
    storage: &S,
    title: &str,
    facilitator_name: &str,
) -> Result<(Meeting, Participant)> {
    let title = require_name(title, "Meeting title")?;
    let facilitator_name = require_name(facilitator_name, "Facilitator name")?;

    let mut code = None;
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let candidate = generate_meeting_code();
        if !storage.meeting_code_exists(&candidate)? {
            code = Some(candidate);
            break;
        }
        warn!(attempt, "Meeting code collision");
    }
    let code = code.ok_or(Error::CodeCollision(MAX_CODE_ATTEMPTS))?;

    let facilitator_id = Uuid::new_v4();
    let meeting = Meeting::new(code, title, facilitator_id);
    assert_meeting_invariants(&meeting);

    let mut facilitator = Participant::new(meeting.id, facilitator_name, true);
    facilitator.id = facilitator_id;

    storage.create_meeting(&meeting)?;
    storage.create_participant(&facilitator)?;

    info!(meeting_id = %meeting.id, code = %meeting.code, "Meeting created");
    Ok((meeting, facilitator))
}

/// Look up an active meeting by its join code (case-insensitive)
#[instrument(skip(storage))]
pub fn get_meeting_by_code<S: Storage + ?Sized>(storage: &S, code: &str) -> Result<Meeting> {
    let code = normalize_meeting_code(code);
    if !is_valid_meeting_code_format(&code) {
        return Err(Error::InvalidCode(code));
    }
    storage
        .find_active_meeting_by_code(&code)?
        .ok_or(Error::MeetingNotFound(code))
}

/// Join a meeting by code.
///
/// A meeting has exactly one facilitator, created with it, so asking to
/// join as facilitator is refused.
#[instrument(skip(storage))]
pub fn join_meeting<S: Storage + ?Sized>(
    storage: &S,
    code: &str,
    name: &str,
    is_facilitator: bool,
) -> Result<(Meeting, Participant)> {
    let name = require_name(name, "Name")?;
    let meeting = get_meeting_by_code(storage, code)?;

    if is_facilitator {
        return Err(Error::PermissionDenied(
            "meeting already has a facilitator".into(),
        ));
    }

    let participant = Participant::new(meeting.id, name, false);
    storage.create_participant(&participant)?;

    if cfg!(debug_assertions) {
        assert_participant_list_invariants(&storage.list_participants(meeting.id)?, &meeting);
    }

    info!(meeting_id = %meeting.id, participant_id = %participant.id, "Participant joined");
    Ok((meeting, participant))
}

/// Facilitator renames a participant
#[instrument(skip(storage))]
pub fn rename_participant<S: Storage + ?Sized>(
    storage: &S,
    actor_id: Uuid,
    participant_id: Uuid,
    new_name: &str,
) -> Result<RenameOutcome> {
    let target = require_participant(storage, participant_id)?;
    authorize(storage, actor_id, target.meeting_id, MeetingAction::RenameParticipant)?;

    let trimmed = new_name.trim();
    if trimmed.is_empty() || trimmed == target.name {
        return Ok(RenameOutcome::Unchanged);
    }

    storage.rename_participant(target.meeting_id, participant_id, trimmed)?;

    // Keep the persisted speaker name in step with the participant row
    let queue = load_queue(storage, target.meeting_id)?;
    if let Some(speaker) = queue.rotation_speaker().filter(|s| s.participant_id == participant_id) {
        let renamed = Speaker {
            name: trimmed.to_string(),
            ..speaker.clone()
        };
        storage.set_current_speaker(target.meeting_id, Some(&renamed))?;
    }
    Ok(RenameOutcome::Renamed(trimmed.to_string()))
}

/// Facilitator removes a participant and their queue entries.
///
/// A missing participant surfaces as the usual not-found error.
#[instrument(skip(storage))]
pub fn remove_participant<S: Storage + ?Sized>(
    storage: &S,
    actor_id: Uuid,
    participant_id: Uuid,
) -> Result<()> {
    let target = storage
        .find_participant_by_id(participant_id)?
        .ok_or_else(|| Error::NotFound(format!("participant {}", participant_id)))?;
    authorize(storage, actor_id, target.meeting_id, MeetingAction::RemoveParticipant)?;

    if target.is_facilitator {
        return Err(Error::Validation(
            "the facilitator cannot be removed".into(),
        ));
    }

    storage.delete_queue_entries_for(target.meeting_id, participant_id)?;
    storage.delete_participant(target.meeting_id, participant_id)?;
    release_floor(storage, target.meeting_id, participant_id)?;
    info!(meeting_id = %target.meeting_id, participant_id = %participant_id, "Participant removed");
    Ok(())
}

/// A participant leaves on their own.
///
/// Their pending entries go with them. When the last active participant
/// leaves, the room is deactivated so housekeeping can reclaim it.
#[instrument(skip(storage))]
pub fn leave_meeting<S: Storage + ?Sized>(storage: &S, participant_id: Uuid) -> Result<()> {
    let participant = require_participant(storage, participant_id)?;
    let meeting_id = participant.meeting_id;

    storage.delete_queue_entries_for(meeting_id, participant_id)?;
    storage.deactivate_participant(meeting_id, participant_id)?;
    release_floor(storage, meeting_id, participant_id)?;

    if storage.count_active_participants(meeting_id)? == 0 {
        storage.set_meeting_active(meeting_id, false)?;
        info!(meeting_id = %meeting_id, "Last participant left, meeting deactivated");
    }
    Ok(())
}

/// Raise or lower a participant's hand
#[instrument(skip(storage))]
pub fn set_hand_raised<S: Storage + ?Sized>(
    storage: &S,
    participant_id: Uuid,
    raised: bool,
) -> Result<()> {
    let participant = require_participant(storage, participant_id)?;
    storage.set_hand_raised(participant.meeting_id, participant_id, raised)
}

/// Facilitator closes the room to new joins
#[instrument(skip(storage))]
pub fn deactivate_meeting<S: Storage + ?Sized>(
    storage: &S,
    actor_id: Uuid,
    meeting_id: Uuid,
) -> Result<()> {
    authorize(storage, actor_id, meeting_id, MeetingAction::DeactivateMeeting)?;
    storage.set_meeting_active(meeting_id, false)
}

/// Delete a meeting. The actor must be the meeting's facilitator.
#[instrument(skip(storage))]
pub fn delete_meeting<S: Storage + ?Sized>(
    storage: &S,
    actor_id: Uuid,
    meeting_id: Uuid,
) -> Result<()> {
    let meeting = storage
        .find_meeting_by_id(meeting_id)?
        .ok_or_else(|| Error::MeetingNotFound(meeting_id.to_string()))?;
    if !meeting.is_facilitated_by(actor_id) {
        return Err(Error::PermissionDenied(
            "only the facilitator can delete a meeting".into(),
        ));
    }
    storage.delete_meeting(meeting_id)?;
    info!(meeting_id = %meeting_id, "Meeting deleted");
    Ok(())
}

/// Delete inactive, empty meetings older than `retention`
#[instrument(skip(storage))]
pub fn purge_stale_meetings<S: Storage + ?Sized>(storage: &S, retention: Duration) -> Result<usize> {
    let cutoff = Utc::now() - retention;
    let stale = storage.find_stale_meetings(cutoff)?;
    for meeting_id in &stale {
        storage.delete_meeting(*meeting_id)?;
    }
    if !stale.is_empty() {
        info!(purged = stale.len(), "Purged stale meetings");
    }
    Ok(stale.len())
}

/// Current persisted queue state for a meeting
pub fn load_queue<S: Storage + ?Sized>(storage: &S, meeting_id: Uuid) -> Result<SpeakingQueue> {
    let meeting = storage
        .find_meeting_by_id(meeting_id)?
        .ok_or_else(|| Error::MeetingNotFound(meeting_id.to_string()))?;
    let entries = storage.list_queue(meeting_id)?;
    Ok(SpeakingQueue::from_parts(entries, persisted_speaker(&meeting)))
}

/// Speaker recorded on the meeting row.
///
/// Rows written before speakers were tracked by id have no speaker.
pub fn persisted_speaker(meeting: &Meeting) -> Option<Speaker> {
    let participant_id = meeting.current_speaker_id?;
    let name = meeting.current_speaker.clone()?;
    Some(Speaker {
        participant_id,
        name,
        started_at: meeting.speaking_since.unwrap_or(meeting.created_at),
    })
}

/// Add the participant to the tail of their meeting's queue
#[instrument(skip(storage))]
pub fn join_queue<S: Storage + ?Sized>(
    storage: &S,
    participant_id: Uuid,
    entry_type: EntryType,
) -> Result<QueueEntry> {
    let participant = authorize_self(storage, participant_id, MeetingAction::JoinQueue)?;
    let entry = QueueEntry::new(
        participant.meeting_id,
        participant.id,
        participant.name,
        entry_type,
    );
    storage.insert_queue_entry(&entry)?;
    Ok(entry)
}

fn authorize_self<S: Storage + ?Sized>(
    storage: &S,
    participant_id: Uuid,
    action: MeetingAction,
) -> Result<Participant> {
    let participant = require_participant(storage, participant_id)?;
    authorize(storage, participant_id, participant.meeting_id, action)
}

/// Remove the caller's own pending entry (or all of them when `entry_id`
/// is `None`). If the caller holds the floor, the next in line takes it.
#[instrument(skip(storage))]
pub fn leave_queue<S: Storage + ?Sized>(
    storage: &S,
    participant_id: Uuid,
    entry_id: Option<Uuid>,
) -> Result<()> {
    let participant = authorize_self(storage, participant_id, MeetingAction::LeaveQueue)?;
    let meeting_id = participant.meeting_id;

    match entry_id {
        Some(entry_id) => {
            let entry = storage
                .find_queue_entry(entry_id)?
                .ok_or_else(|| Error::NotFound(format!("queue entry {}", entry_id)))?;
            if entry.participant_id != participant_id {
                return Err(Error::PermissionDenied(
                    "cannot remove another participant's entry".into(),
                ));
            }
            storage.delete_queue_entry(meeting_id, entry_id)?;
        }
        None => storage.delete_queue_entries_for(meeting_id, participant_id)?,
    }

    release_floor(storage, meeting_id, participant_id)
}

/// Pass the floor on when `participant_id` holds it
fn release_floor<S: Storage + ?Sized>(
    storage: &S,
    meeting_id: Uuid,
    participant_id: Uuid,
) -> Result<()> {
    let queue = load_queue(storage, meeting_id)?;
    if queue
        .rotation_speaker()
        .is_some_and(|s| s.participant_id == participant_id)
    {
        persist_advance(storage, meeting_id, queue, None)?;
    }
    Ok(())
}

/// Facilitator moves the floor to the head of the queue
#[instrument(skip(storage))]
pub fn advance_speaker<S: Storage + ?Sized>(
    storage: &S,
    actor_id: Uuid,
    meeting_id: Uuid,
) -> Result<Option<QueueEntry>> {
    advance_speaker_skipping(storage, actor_id, meeting_id, None)
}

/// Advance while a direct response is in progress: the responder's own
/// entries stay in place and are passed over.
#[instrument(skip(storage))]
pub fn advance_speaker_skipping<S: Storage + ?Sized>(
    storage: &S,
    actor_id: Uuid,
    meeting_id: Uuid,
    responder: Option<Uuid>,
) -> Result<Option<QueueEntry>> {
    authorize(storage, actor_id, meeting_id, MeetingAction::AdvanceSpeaker)?;
    let queue = load_queue(storage, meeting_id)?;
    persist_advance(storage, meeting_id, queue, responder)
}

fn persist_advance<S: Storage + ?Sized>(
    storage: &S,
    meeting_id: Uuid,
    mut queue: SpeakingQueue,
    skip: Option<Uuid>,
) -> Result<Option<QueueEntry>> {
    let popped = queue.advance_skipping(skip);
    if let Some(entry) = &popped {
        storage.delete_queue_entry(meeting_id, entry.id)?;
    }
    let speaker = queue.rotation_speaker();
    storage.set_current_speaker(meeting_id, speaker)?;
    info!(
        meeting_id = %meeting_id,
        speaker = speaker.map(|s| s.name.as_str()).unwrap_or("-"),
        remaining = queue.len(),
        "Speaker advanced"
    );
    Ok(popped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, MeetingRepository, ParticipantRepository, QueueRepository};

    fn setup() -> (Database, Meeting, Participant) {
        let db = Database::open_in_memory().unwrap();
        let (meeting, facilitator) = create_meeting(&db, "Budget", "Fran").unwrap();
        (db, meeting, facilitator)
    }

    #[test]
    fn test_create_meeting_persists_facilitator() {
        let (db, meeting, facilitator) = setup();
        assert!(facilitator.is_facilitator);
        assert_eq!(meeting.facilitator_id, facilitator.id);
        assert!(is_valid_meeting_code_format(&meeting.code));

        let participants = db.list_participants(meeting.id).unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].name, "Fran");
    }

    #[test]
    fn test_create_meeting_rejects_empty_title() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            create_meeting(&db, "   ", "Fran"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let (db, meeting, _) = setup();
        let found = get_meeting_by_code(&db, &meeting.code.to_lowercase()).unwrap();
        assert_eq!(found.id, meeting.id);
    }

    #[test]
    fn test_join_errors_are_distinguishable() {
        let (db, _, _) = setup();
        assert!(matches!(
            join_meeting(&db, "ZZ9", "Ann", false),
            Err(Error::InvalidCode(_))
        ));
        assert!(matches!(
            join_meeting(&db, "ZZZZZZ", "Ann", false),
            Err(Error::MeetingNotFound(_))
        ));
    }

    #[test]
    fn test_join_inactive_meeting_not_found() {
        let (db, meeting, facilitator) = setup();
        deactivate_meeting(&db, facilitator.id, meeting.id).unwrap();
        assert!(matches!(
            join_meeting(&db, &meeting.code, "Ann", false),
            Err(Error::MeetingNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_names_allowed() {
        let (db, meeting, _) = setup();
        join_meeting(&db, &meeting.code, "Sam", false).unwrap();
        join_meeting(&db, &meeting.code, "Sam", false).unwrap();
        assert_eq!(db.list_participants(meeting.id).unwrap().len(), 3);
    }

    #[test]
    fn test_second_facilitator_refused() {
        let (db, meeting, _) = setup();
        assert!(matches!(
            join_meeting(&db, &meeting.code, "Eve", true),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_rename_rules() {
        let (db, meeting, facilitator) = setup();
        let (_, ann) = join_meeting(&db, &meeting.code, "Ann", false).unwrap();

        assert_eq!(
            rename_participant(&db, facilitator.id, ann.id, "  Ann ").unwrap(),
            RenameOutcome::Unchanged
        );
        assert_eq!(
            rename_participant(&db, facilitator.id, ann.id, "").unwrap(),
            RenameOutcome::Unchanged
        );
        assert_eq!(
            rename_participant(&db, facilitator.id, ann.id, " Annie ").unwrap(),
            RenameOutcome::Renamed("Annie".into())
        );
        assert_eq!(db.find_participant_by_id(ann.id).unwrap().unwrap().name, "Annie");

        // Participants cannot rename each other
        assert!(matches!(
            rename_participant(&db, ann.id, facilitator.id, "Boss"),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_remove_participant() {
        let (db, meeting, facilitator) = setup();
        let (_, ann) = join_meeting(&db, &meeting.code, "Ann", false).unwrap();
        join_queue(&db, ann.id, EntryType::Speak).unwrap();

        remove_participant(&db, facilitator.id, ann.id).unwrap();
        assert!(db.find_participant_by_id(ann.id).unwrap().is_none());
        assert!(db.list_queue(meeting.id).unwrap().is_empty());

        // Second removal reports the standard not-found
        assert!(matches!(
            remove_participant(&db, facilitator.id, ann.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_requires_facilitator() {
        let (db, meeting, facilitator) = setup();
        let (_, ann) = join_meeting(&db, &meeting.code, "Ann", false).unwrap();

        assert!(matches!(
            delete_meeting(&db, ann.id, meeting.id),
            Err(Error::PermissionDenied(_))
        ));
        delete_meeting(&db, facilitator.id, meeting.id).unwrap();
        assert!(db.find_meeting_by_id(meeting.id).unwrap().is_none());
    }

    #[test]
    fn test_last_leave_deactivates_and_purge_reclaims() {
        let (db, meeting, facilitator) = setup();
        leave_meeting(&db, facilitator.id).unwrap();

        let stored = db.find_meeting_by_id(meeting.id).unwrap().unwrap();
        assert!(!stored.is_active);

        // Within retention: kept
        assert_eq!(purge_stale_meetings(&db, Duration::hours(1)).unwrap(), 0);
        // Negative retention moves the cutoff into the future
        assert_eq!(purge_stale_meetings(&db, Duration::hours(-1)).unwrap(), 1);
        assert!(db.find_meeting_by_id(meeting.id).unwrap().is_none());
    }

    #[test]
    fn test_advance_persists_speaker() {
        let (db, meeting, facilitator) = setup();
        for name in ["A", "B", "C"] {
            let (_, p) = join_meeting(&db, &meeting.code, name, false).unwrap();
            join_queue(&db, p.id, EntryType::Speak).unwrap();
        }

        let popped = advance_speaker(&db, facilitator.id, meeting.id)
            .unwrap()
            .unwrap();
        assert_eq!(popped.participant_name, "A");

        let queue = load_queue(&db, meeting.id).unwrap();
        assert_eq!(queue.current_speaker(), Some("A"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_advance_skips_responder_entries() {
        let (db, meeting, facilitator) = setup();
        let (_, a) = join_meeting(&db, &meeting.code, "A", false).unwrap();
        let (_, b) = join_meeting(&db, &meeting.code, "B", false).unwrap();
        join_queue(&db, a.id, EntryType::Speak).unwrap();
        join_queue(&db, b.id, EntryType::Speak).unwrap();

        let popped = advance_speaker_skipping(&db, facilitator.id, meeting.id, Some(a.id))
            .unwrap()
            .unwrap();
        assert_eq!(popped.participant_name, "B");

        let queue = load_queue(&db, meeting.id).unwrap();
        assert_eq!(queue.current_speaker(), Some("B"));
        assert_eq!(queue.entries()[0].participant_name, "A");
    }

    #[test]
    fn test_advance_on_empty_clears_speaker() {
        let (db, meeting, facilitator) = setup();
        let (_, a) = join_meeting(&db, &meeting.code, "A", false).unwrap();
        join_queue(&db, a.id, EntryType::Speak).unwrap();

        advance_speaker(&db, facilitator.id, meeting.id).unwrap();
        assert!(advance_speaker(&db, facilitator.id, meeting.id)
            .unwrap()
            .is_none());
        assert_eq!(load_queue(&db, meeting.id).unwrap().current_speaker(), None);
    }

    #[test]
    fn test_advance_requires_facilitator() {
        let (db, meeting, _) = setup();
        let (_, a) = join_meeting(&db, &meeting.code, "A", false).unwrap();
        assert!(matches!(
            advance_speaker(&db, a.id, meeting.id),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_speaker_leaving_queue_promotes_next() {
        let (db, meeting, facilitator) = setup();
        let (_, a) = join_meeting(&db, &meeting.code, "A", false).unwrap();
        let (_, b) = join_meeting(&db, &meeting.code, "B", false).unwrap();
        join_queue(&db, a.id, EntryType::Speak).unwrap();
        join_queue(&db, b.id, EntryType::ClarifyingQuestion).unwrap();

        advance_speaker(&db, facilitator.id, meeting.id).unwrap();
        leave_queue(&db, a.id, None).unwrap();

        let queue = load_queue(&db, meeting.id).unwrap();
        assert_eq!(queue.current_speaker(), Some("B"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cannot_remove_foreign_entry() {
        let (db, meeting, _) = setup();
        let (_, a) = join_meeting(&db, &meeting.code, "A", false).unwrap();
        let (_, b) = join_meeting(&db, &meeting.code, "B", false).unwrap();
        let entry = join_queue(&db, a.id, EntryType::Speak).unwrap();

        assert!(matches!(
            leave_queue(&db, b.id, Some(entry.id)),
            Err(Error::PermissionDenied(_))
        ));
        leave_queue(&db, a.id, Some(entry.id)).unwrap();
        assert!(db.list_queue(meeting.id).unwrap().is_empty());
    }

    #[test]
    fn test_hand_raise() {
        let (db, meeting, _) = setup();
        let (_, a) = join_meeting(&db, &meeting.code, "A", false).unwrap();
        set_hand_raised(&db, a.id, true).unwrap();
        assert!(db.find_participant_by_id(a.id).unwrap().unwrap().hand_raised);
        assert!(db.find_meeting_by_id(meeting.id).unwrap().is_some());
    }

    #[test]
    fn test_namesake_leaving_queue_keeps_speaker() {
        let (db, meeting, facilitator) = setup();
        let (_, sam1) = join_meeting(&db, &meeting.code, "Sam", false).unwrap();
        let (_, sam2) = join_meeting(&db, &meeting.code, "Sam", false).unwrap();
        let (_, cara) = join_meeting(&db, &meeting.code, "Cara", false).unwrap();
        for p in [&sam1, &sam2, &cara] {
            join_queue(&db, p.id, EntryType::Speak).unwrap();
        }

        advance_speaker(&db, facilitator.id, meeting.id).unwrap();
        leave_queue(&db, sam2.id, None).unwrap();

        let queue = load_queue(&db, meeting.id).unwrap();
        assert_eq!(queue.rotation_speaker().unwrap().participant_id, sam1.id);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.entries()[0].participant_id, cara.id);
    }

    #[test]
    fn test_speaker_leaving_meeting_passes_floor() {
        let (db, meeting, facilitator) = setup();
        let (_, a) = join_meeting(&db, &meeting.code, "A", false).unwrap();
        let (_, b) = join_meeting(&db, &meeting.code, "B", false).unwrap();
        join_queue(&db, a.id, EntryType::Speak).unwrap();
        join_queue(&db, b.id, EntryType::Speak).unwrap();

        advance_speaker(&db, facilitator.id, meeting.id).unwrap();
        leave_meeting(&db, a.id).unwrap();
        let queue = load_queue(&db, meeting.id).unwrap();
        assert_eq!(queue.rotation_speaker().unwrap().participant_id, b.id);
        assert!(queue.is_empty());

        // Nobody left to promote
        leave_meeting(&db, b.id).unwrap();
        let stored = db.find_meeting_by_id(meeting.id).unwrap().unwrap();
        assert_eq!(stored.current_speaker, None);
        assert_eq!(stored.current_speaker_id, None);
    }

    #[test]
    fn test_removing_speaker_passes_floor() {
        let (db, meeting, facilitator) = setup();
        let (_, a) = join_meeting(&db, &meeting.code, "A", false).unwrap();
        let (_, b) = join_meeting(&db, &meeting.code, "B", false).unwrap();
        join_queue(&db, a.id, EntryType::Speak).unwrap();
        join_queue(&db, b.id, EntryType::Speak).unwrap();

        advance_speaker(&db, facilitator.id, meeting.id).unwrap();
        remove_participant(&db, facilitator.id, a.id).unwrap();
        assert_eq!(load_queue(&db, meeting.id).unwrap().current_speaker(), Some("B"));
    }

    #[test]
    fn test_renaming_speaker_updates_floor() {
        let (db, meeting, facilitator) = setup();
        let (_, a) = join_meeting(&db, &meeting.code, "A", false).unwrap();
        let (_, b) = join_meeting(&db, &meeting.code, "B", false).unwrap();
        join_queue(&db, a.id, EntryType::Speak).unwrap();
        join_queue(&db, b.id, EntryType::Speak).unwrap();

        advance_speaker(&db, facilitator.id, meeting.id).unwrap();
        let before = load_queue(&db, meeting.id).unwrap();
        rename_participant(&db, facilitator.id, a.id, "Alex").unwrap();

        let after = load_queue(&db, meeting.id).unwrap();
        let speaker = after.rotation_speaker().unwrap();
        assert_eq!(speaker.name, "Alex");
        assert_eq!(speaker.participant_id, a.id);
        assert_eq!(speaker.started_at, before.rotation_speaker().unwrap().started_at);

        // Leaving still works after the rename
        leave_queue(&db, a.id, None).unwrap();
        assert_eq!(load_queue(&db, meeting.id).unwrap().current_speaker(), Some("B"));
    }
}
