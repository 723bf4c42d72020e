//! Permission system for meeting operations

/// Actions that can be performed in a meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingAction {
    // Meeting management
    DeleteMeeting,
    DeactivateMeeting,

    // Participant management
    RenameParticipant,
    RemoveParticipant,

    // Speaking queue
    JoinQueue,
    LeaveQueue,
    AdvanceSpeaker,
    StartDirectResponse,
    FinishDirectResponse,
    RaiseHand,
}

/// Whether an actor holds the facilitator role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MeetingRole {
    Participant,
    Facilitator,
}

impl MeetingRole {
    pub fn from_flag(is_facilitator: bool) -> Self {
        if is_facilitator {
            MeetingRole::Facilitator
        } else {
            MeetingRole::Participant
        }
    }
}

/// Permission matrix for meeting roles
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Check if a role has permission to perform an action
    pub fn can_perform(role: MeetingRole, action: MeetingAction) -> bool {
        match action {
            // Administrative rights stay with the facilitator
            MeetingAction::DeleteMeeting
            | MeetingAction::DeactivateMeeting
            | MeetingAction::RenameParticipant
            | MeetingAction::RemoveParticipant
            | MeetingAction::AdvanceSpeaker
            | MeetingAction::StartDirectResponse
            | MeetingAction::FinishDirectResponse => role == MeetingRole::Facilitator,

            MeetingAction::JoinQueue | MeetingAction::LeaveQueue | MeetingAction::RaiseHand => {
                role >= MeetingRole::Participant
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facilitator_permissions() {
        let role = MeetingRole::Facilitator;
        assert!(PermissionMatrix::can_perform(role, MeetingAction::RenameParticipant));
        assert!(PermissionMatrix::can_perform(role, MeetingAction::AdvanceSpeaker));
        assert!(PermissionMatrix::can_perform(role, MeetingAction::JoinQueue));
    }

    #[test]
    fn test_participant_permissions() {
        let role = MeetingRole::from_flag(false);
        assert!(PermissionMatrix::can_perform(role, MeetingAction::JoinQueue));
        assert!(PermissionMatrix::can_perform(role, MeetingAction::RaiseHand));
        assert!(!PermissionMatrix::can_perform(role, MeetingAction::RemoveParticipant));
        assert!(!PermissionMatrix::can_perform(role, MeetingAction::DeleteMeeting));
    }
}
