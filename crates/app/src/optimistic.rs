//! Optimistic local edits with explicit rollback
//!
//! A command is applied to the local view before the backend confirms it.
//! It records the last known good value so a failed call can put the view
//! back exactly as it was.

use stack_core::Participant;
use uuid::Uuid;

/// A reversible edit to locally held participants
pub trait LocalCommand {
    fn apply(&self, participants: &mut [Participant]) -> bool;
    fn revert(&self, participants: &mut [Participant]) -> bool;
}

/// Rename one participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCommand {
    pub participant_id: Uuid,
    /// Last known good name
    pub previous: String,
    pub next: String,
}

impl RenameCommand {
    pub fn new(participant_id: Uuid, previous: String, next: String) -> Self {
        Self {
            participant_id,
            previous,
            next,
        }
    }

    fn set(&self, participants: &mut [Participant], name: &str) -> bool {
        match participants.iter_mut().find(|p| p.id == self.participant_id) {
            Some(participant) => {
                participant.name = name.to_string();
                true
            }
            None => false,
        }
    }
}

impl LocalCommand for RenameCommand {
    fn apply(&self, participants: &mut [Participant]) -> bool {
        self.set(participants, &self.next)
    }

    fn revert(&self, participants: &mut [Participant]) -> bool {
        self.set(participants, &self.previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_then_revert() {
        let meeting_id = Uuid::new_v4();
        let mut participants = vec![
            Participant::new(meeting_id, "Ana".into(), true),
            Participant::new(meeting_id, "Bo".into(), false),
        ];
        let cmd = RenameCommand::new(participants[1].id, "Bo".into(), "Bob".into());

        assert!(cmd.apply(&mut participants));
        assert_eq!(participants[1].name, "Bob");
        assert_eq!(participants[0].name, "Ana");

        assert!(cmd.revert(&mut participants));
        assert_eq!(participants[1].name, "Bo");
    }

    #[test]
    fn test_missing_participant() {
        let cmd = RenameCommand::new(Uuid::new_v4(), "a".into(), "b".into());
        assert!(!cmd.apply(&mut []));
    }
}
