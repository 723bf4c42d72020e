//! Meeting session
//!
//! One participant's handle on one meeting. Every backend call goes through
//! [`AppState::call`], so retries, timeouts and the offline circuit apply
//! uniformly. The local [`SessionView`] is refreshed from the backend after
//! each mutation and whenever a realtime change arrives.
//!
//! The direct-response override lives only in this view. It is never
//! written to storage.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stack_core::code::{is_valid_meeting_code_format, normalize_meeting_code};
use stack_core::invariants::{assert_participant_list_invariants, assert_queue_invariants};
use stack_core::{
    lifecycle, EntryType, Error as CoreError, Meeting, MeetingAction, MeetingRepository,
    MeetingRole, Participant, ParticipantRepository, PermissionMatrix, QueueEntry,
    QueueRepository, RenameOutcome, SpeakingQueue, Table,
};
use stack_net::{realtime, CallError, ChangeSource, SyncSubscription, ALL_TABLES};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::optimistic::{LocalCommand, RenameCommand};
use crate::state::{AppState, CallResult};

/// Last known server state plus the local override
#[derive(Debug, Clone)]
pub struct SessionView {
    pub meeting: Meeting,
    pub participants: Vec<Participant>,
    pub queue: SpeakingQueue,
}

/// Cloneable handle; clones share the same view
#[derive(Clone)]
pub struct MeetingSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: Arc<AppState>,
    participant_id: Uuid,
    role: MeetingRole,
    view: Mutex<SessionView>,
}

fn rejected<T>(error: CoreError) -> CallResult<T> {
    Err(CallError::Application(Arc::new(error)))
}

impl MeetingSession {
    /// Create a meeting and enter it as its facilitator
    pub async fn create(state: Arc<AppState>, title: &str, facilitator_name: &str) -> CallResult<Self> {
        let title = title.to_string();
        let name = facilitator_name.to_string();
        let (meeting, me) = state
            .call(None, move |db| lifecycle::create_meeting(db, &title, &name))
            .await?;
        Self::open(state, meeting, me).await
    }

    /// Join by code. The code format is checked before any backend call.
    pub async fn join(state: Arc<AppState>, code: &str, name: &str) -> CallResult<Self> {
        let code = normalize_meeting_code(code);
        if !is_valid_meeting_code_format(&code) {
            return rejected(CoreError::InvalidCode(code));
        }
        let name = name.to_string();
        let (meeting, me) = state
            .call(None, move |db| lifecycle::join_meeting(db, &code, &name, false))
            .await?;
        Self::open(state, meeting, me).await
    }

    async fn open(state: Arc<AppState>, meeting: Meeting, me: Participant) -> CallResult<Self> {
        info!(meeting_id = %meeting.id, participant_id = %me.id, facilitator = me.is_facilitator, "Session opened");
        let session = Self {
            inner: Arc::new(SessionInner {
                state,
                participant_id: me.id,
                role: MeetingRole::from_flag(me.is_facilitator),
                view: Mutex::new(SessionView {
                    meeting,
                    participants: vec![me],
                    queue: SpeakingQueue::new(),
                }),
            }),
        };
        session.refresh_all().await?;
        Ok(session)
    }

    fn state(&self) -> &AppState {
        &self.inner.state
    }

    fn lock_view(&self) -> MutexGuard<'_, SessionView> {
        self.inner.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn participant_id(&self) -> Uuid {
        self.inner.participant_id
    }

    pub fn is_facilitator(&self) -> bool {
        self.inner.role == MeetingRole::Facilitator
    }

    pub fn meeting_id(&self) -> Uuid {
        self.lock_view().meeting.id
    }

    pub fn code(&self) -> String {
        self.lock_view().meeting.code.clone()
    }

    /// Snapshot of the local view
    pub fn view(&self) -> SessionView {
        self.lock_view().clone()
    }

    /// Who has the floor, counting an active direct response
    pub fn current_speaker(&self) -> Option<String> {
        self.lock_view().queue.current_speaker().map(str::to_string)
    }

    fn authorize(&self, action: MeetingAction) -> CallResult<()> {
        if PermissionMatrix::can_perform(self.inner.role, action) {
            Ok(())
        } else {
            rejected(CoreError::PermissionDenied(format!(
                "{:?} requires the facilitator role",
                action
            )))
        }
    }

    /// Refetch one collection
    pub async fn refresh(&self, table: Table) -> CallResult<()> {
        let meeting_id = self.meeting_id();
        match table {
            Table::Meetings => {
                let meeting = self
                    .state()
                    .call(Some(format!("meeting:{}", meeting_id)), move |db| {
                        db.find_meeting_by_id(meeting_id)?
                            .ok_or_else(|| CoreError::MeetingNotFound(meeting_id.to_string()))
                    })
                    .await?;
                let mut view = self.lock_view();
                view.queue
                    .set_rotation_speaker(lifecycle::persisted_speaker(&meeting));
                view.meeting = meeting;
            }
            Table::Participants => {
                let participants = self
                    .state()
                    .call(Some(format!("participants:{}", meeting_id)), move |db| {
                        db.list_participants(meeting_id)
                    })
                    .await?;
                let mut view = self.lock_view();
                assert_participant_list_invariants(&participants, &view.meeting);
                view.participants = participants;
            }
            Table::QueueEntries => {
                let persisted = self
                    .state()
                    .call(Some(format!("queue:{}", meeting_id)), move |db| {
                        lifecycle::load_queue(db, meeting_id)
                    })
                    .await?;
                let mut view = self.lock_view();
                view.queue.replace_entries(persisted.entries().to_vec());
                view.queue
                    .set_rotation_speaker(persisted.rotation_speaker().cloned());
                assert_queue_invariants(&view.queue);
            }
        }
        debug!(meeting_id = %meeting_id, table = ?table, "View refreshed");
        Ok(())
    }

    pub async fn refresh_all(&self) -> CallResult<()> {
        for table in ALL_TABLES {
            self.refresh(table).await?;
        }
        Ok(())
    }

    /// Keep the view in sync with `source` until the subscription drops
    pub fn attach_realtime<S: ChangeSource + ?Sized>(&self, source: &S) -> SyncSubscription {
        let session = self.clone();
        realtime::subscribe(source, self.meeting_id(), &ALL_TABLES, move |table| {
            let session = session.clone();
            async move {
                if let Err(e) = session.refresh(table).await {
                    warn!(table = ?table, error = %e, "Refetch after change failed");
                }
            }
        })
    }

    /// Get in line. A second direct response is refused while one is in
    /// progress; every other kind of entry is accepted.
    pub async fn join_queue(&self, entry_type: EntryType) -> CallResult<QueueEntry> {
        if entry_type == EntryType::DirectResponse {
            let active = self
                .lock_view()
                .queue
                .direct_response()
                .responder()
                .map(|r| r.name.clone());
            if let Some(name) = active {
                return rejected(CoreError::DirectResponseActive(name));
            }
        }

        let participant_id = self.participant_id();
        let entry = self
            .state()
            .call(None, move |db| {
                lifecycle::join_queue(db, participant_id, entry_type)
            })
            .await?;
        self.refresh(Table::QueueEntries).await?;
        Ok(entry)
    }

    /// Withdraw one of our entries, or all of them
    pub async fn leave_queue(&self, entry_id: Option<Uuid>) -> CallResult<()> {
        let participant_id = self.participant_id();
        self.state()
            .call(None, move |db| {
                lifecycle::leave_queue(db, participant_id, entry_id)
            })
            .await?;
        self.refresh(Table::QueueEntries).await
    }

    /// Next speaker. During a direct response the responder's entries are
    /// passed over.
    pub async fn advance(&self) -> CallResult<Option<QueueEntry>> {
        self.authorize(MeetingAction::AdvanceSpeaker)?;
        let (meeting_id, responder) = {
            let view = self.lock_view();
            (view.meeting.id, view.queue.direct_response().participant_id())
        };
        let actor = self.participant_id();
        let popped = self
            .state()
            .call(None, move |db| {
                lifecycle::advance_speaker_skipping(db, actor, meeting_id, responder)
            })
            .await?;
        self.refresh(Table::QueueEntries).await?;
        Ok(popped)
    }

    /// Give `participant_id` the floor immediately, snapshotting the queue
    pub fn start_direct_response(&self, participant_id: Uuid) -> CallResult<()> {
        self.authorize(MeetingAction::StartDirectResponse)?;
        let mut view = self.lock_view();
        let Some(name) = view
            .participants
            .iter()
            .find(|p| p.id == participant_id)
            .map(|p| p.name.clone())
        else {
            return rejected(CoreError::NotFound(format!("participant {}", participant_id)));
        };

        let snapshot = view.queue.entries().to_vec();
        if let Err(e) = view.queue.start_direct_response(participant_id, &name, snapshot) {
            return rejected(e);
        }
        assert_queue_invariants(&view.queue);
        info!(participant = %name, "Direct response started");
        Ok(())
    }

    /// End the direct response. Returns the restored queue, or `None` when
    /// none was active. The responder's pending entries are dropped from
    /// storage since they have now spoken, and the view is then refetched
    /// so advances and joins made meanwhile show up.
    pub async fn finish_direct_response(&self) -> CallResult<Option<Vec<QueueEntry>>> {
        self.authorize(MeetingAction::FinishDirectResponse)?;
        let (meeting_id, responder, restored) = {
            let mut view = self.lock_view();
            let responder = view.queue.direct_response().participant_id();
            let restored = view.queue.finish_direct_response();
            assert_queue_invariants(&view.queue);
            (view.meeting.id, responder, restored)
        };

        let (Some(responder), Some(restored)) = (responder, restored) else {
            return Ok(None);
        };

        self.state()
            .call(None, move |db| db.delete_queue_entries_for(meeting_id, responder))
            .await?;
        self.refresh(Table::QueueEntries).await?;
        info!(restored = restored.len(), "Direct response finished");
        Ok(Some(restored))
    }

    /// Rename a participant, showing the new name at once and reverting to
    /// the last known good name if the backend refuses.
    pub async fn rename_participant(
        &self,
        participant_id: Uuid,
        new_name: &str,
    ) -> CallResult<RenameOutcome> {
        self.authorize(MeetingAction::RenameParticipant)?;
        let next = new_name.trim().to_string();

        let command = {
            let mut view = self.lock_view();
            let Some(current) = view
                .participants
                .iter()
                .find(|p| p.id == participant_id)
                .map(|p| p.name.clone())
            else {
                return rejected(CoreError::NotFound(format!("participant {}", participant_id)));
            };
            if next.is_empty() || next == current {
                return Ok(RenameOutcome::Unchanged);
            }
            let command = RenameCommand::new(participant_id, current, next.clone());
            command.apply(&mut view.participants);
            command
        };

        let actor = self.participant_id();
        let result = self
            .state()
            .call(None, move |db| {
                lifecycle::rename_participant(db, actor, participant_id, &next)
            })
            .await;

        if let Err(e) = &result {
            command.revert(&mut self.lock_view().participants);
            warn!(participant_id = %participant_id, error = %e, "Rename failed, reverted");
        }
        result
    }

    /// Remove another participant from the meeting
    pub async fn remove_participant(&self, participant_id: Uuid) -> CallResult<()> {
        self.authorize(MeetingAction::RemoveParticipant)?;
        let actor = self.participant_id();
        self.state()
            .call(None, move |db| {
                lifecycle::remove_participant(db, actor, participant_id)
            })
            .await?;
        self.refresh(Table::Participants).await?;
        self.refresh(Table::QueueEntries).await
    }

    pub async fn set_hand_raised(&self, raised: bool) -> CallResult<()> {
        let participant_id = self.participant_id();
        self.state()
            .call(None, move |db| {
                lifecycle::set_hand_raised(db, participant_id, raised)
            })
            .await?;
        self.refresh(Table::Participants).await
    }

    /// Leave the meeting for good
    pub async fn leave(self) -> CallResult<()> {
        let participant_id = self.participant_id();
        self.state()
            .call(None, move |db| lifecycle::leave_meeting(db, participant_id))
            .await?;
        info!(participant_id = %participant_id, "Left meeting");
        Ok(())
    }

    /// Close the room to new joins
    pub async fn deactivate_meeting(&self) -> CallResult<()> {
        self.authorize(MeetingAction::DeactivateMeeting)?;
        let (actor, meeting_id) = (self.participant_id(), self.meeting_id());
        self.state()
            .call(None, move |db| {
                lifecycle::deactivate_meeting(db, actor, meeting_id)
            })
            .await?;
        self.refresh(Table::Meetings).await
    }

    pub async fn delete_meeting(self) -> CallResult<()> {
        self.authorize(MeetingAction::DeleteMeeting)?;
        let (actor, meeting_id) = (self.participant_id(), self.meeting_id());
        self.state()
            .call(None, move |db| lifecycle::delete_meeting(db, actor, meeting_id))
            .await
    }
}
