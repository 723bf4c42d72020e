//! Realtime sync adapter
//!
//! Change events fan out through a [`ChangeFeed`]. A [`SyncSubscription`]
//! watches one meeting and, on any matching event, refetches the affected
//! collection rather than merging patches. Dropping the subscription tears
//! it down.

use std::future::Future;

use stack_core::{ChangeEvent, ChangeHook, Table};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default buffered events per subscriber before it is considered lagging
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// All three logical tables
pub const ALL_TABLES: [Table; 3] = [Table::Meetings, Table::Participants, Table::QueueEntries];

/// Anything that can hand out a stream of change events
pub trait ChangeSource {
    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// In-process broadcast of change events
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        debug!(receivers, "Change published");
    }

    /// Hook suitable for [`stack_core::Database::set_change_hook`]
    pub fn hook(&self) -> ChangeHook {
        let feed = self.clone();
        Box::new(move |event: &ChangeEvent| feed.publish(event.clone()))
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeSource for ChangeFeed {
    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

/// Live subscription for one meeting. Aborts its task on drop.
pub struct SyncSubscription {
    meeting_id: Uuid,
    task: JoinHandle<()>,
}

impl SyncSubscription {
    pub fn meeting_id(&self) -> Uuid {
        self.meeting_id
    }

    /// Explicit teardown; same as dropping
    pub fn unsubscribe(self) {}
}

impl Drop for SyncSubscription {
    fn drop(&mut self) {
        self.task.abort();
        debug!(meeting_id = %self.meeting_id, "Realtime subscription closed");
    }
}

/// Watch `tables` of `meeting_id` on `source` and call `refetch` with the
/// table that changed. Events are handled one at a time in arrival order.
///
/// If the subscriber falls behind and events are dropped, every watched
/// table is refetched so the view converges on the latest server state.
pub fn subscribe<S, F, Fut>(
    source: &S,
    meeting_id: Uuid,
    tables: &[Table],
    refetch: F,
) -> SyncSubscription
where
    S: ChangeSource + ?Sized,
    F: Fn(Table) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut rx = source.subscribe_changes();
    let tables = tables.to_vec();

    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.meeting_id == meeting_id && tables.contains(&event.table) {
                        debug!(table = ?event.table, kind = ?event.kind, "Refetching after change");
                        refetch(event.table).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(meeting_id = %meeting_id, missed, "Realtime subscriber lagged, refetching all");
                    for table in &tables {
                        refetch(*table).await;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(meeting_id = %meeting_id, "Change source closed");
                    break;
                }
            }
        }
    });

    SyncSubscription { meeting_id, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stack_core::ChangeKind;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_refetch_on_matching_change() {
        let feed = ChangeFeed::default();
        let meeting_id = Uuid::new_v4();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = subscribe(&feed, meeting_id, &ALL_TABLES, move |table| {
            let sink = sink.clone();
            async move { sink.lock().await.push(table) }
        });

        feed.publish(ChangeEvent::new(Table::QueueEntries, ChangeKind::Insert, meeting_id));
        feed.publish(ChangeEvent::new(Table::Participants, ChangeKind::Update, Uuid::new_v4()));
        feed.publish(ChangeEvent::new(Table::Participants, ChangeKind::Delete, meeting_id));
        settle().await;

        assert_eq!(
            *seen.lock().await,
            vec![Table::QueueEntries, Table::Participants]
        );
    }

    #[tokio::test]
    async fn test_table_filter() {
        let feed = ChangeFeed::default();
        let meeting_id = Uuid::new_v4();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = subscribe(&feed, meeting_id, &[Table::Meetings], move |table| {
            let sink = sink.clone();
            async move { sink.lock().await.push(table) }
        });

        feed.publish(ChangeEvent::new(Table::QueueEntries, ChangeKind::Insert, meeting_id));
        feed.publish(ChangeEvent::new(Table::Meetings, ChangeKind::Update, meeting_id));
        settle().await;

        assert_eq!(*seen.lock().await, vec![Table::Meetings]);
    }

    #[tokio::test]
    async fn test_drop_tears_down() {
        let feed = ChangeFeed::default();
        let meeting_id = Uuid::new_v4();
        let seen = Arc::new(Mutex::new(0usize));

        let sink = seen.clone();
        let sub = subscribe(&feed, meeting_id, &ALL_TABLES, move |_| {
            let sink = sink.clone();
            async move { *sink.lock().await += 1 }
        });
        assert_eq!(sub.meeting_id(), meeting_id);
        sub.unsubscribe();
        settle().await;

        feed.publish(ChangeEvent::new(Table::Meetings, ChangeKind::Update, meeting_id));
        settle().await;
        assert_eq!(*seen.lock().await, 0);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_feed_hook_publishes() {
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe_changes();
        let hook = feed.hook();
        let event = ChangeEvent::new(Table::Meetings, ChangeKind::Insert, Uuid::new_v4());
        hook(&event);
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}
