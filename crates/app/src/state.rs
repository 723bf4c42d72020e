//! Application state management

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use stack_core::{Database, Error as CoreError};
use stack_net::{CallError, ChangeFeed, ConnectionConfig, ConnectionManager, ExecuteOptions};
use tracing::info;

use crate::error::Result;

pub const DATABASE_FILE: &str = "stack.db";

/// Result of a call routed through the connection manager
pub type CallResult<T> = std::result::Result<T, CallError<CoreError>>;

/// Shared state owned by the host and handed to every session
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub feed: ChangeFeed,
    pub connection: Arc<ConnectionManager>,
}

impl AppState {
    /// Open the database under `data_dir` and wire its changes into a feed
    pub fn open(data_dir: &Path, connection: ConnectionManager) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DATABASE_FILE);
        let db = Database::open(&db_path)?;
        info!(path = %db_path.display(), "Database opened");
        Ok(Self::with_database(db, connection))
    }

    /// In-memory database with default connection settings
    pub fn in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(
            db,
            ConnectionManager::new(ConnectionConfig::default()),
        ))
    }

    pub fn with_database(mut db: Database, connection: ConnectionManager) -> Self {
        let feed = ChangeFeed::default();
        db.set_change_hook(feed.hook());
        Self {
            db: Arc::new(Mutex::new(db)),
            feed,
            connection: Arc::new(connection),
        }
    }

    /// Run `f` against the database under the connection manager's policy.
    ///
    /// The closure runs on the blocking pool, so it may be invoked more
    /// than once if the first attempt fails with a connection error. A
    /// closure that panics surfaces as [`CoreError::Internal`] and is not
    /// retried.
    pub async fn call<T, F>(&self, dedupe_key: Option<String>, f: F) -> CallResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&Database) -> stack_core::Result<T> + Clone + Send + Sync + 'static,
    {
        let mut opts: ExecuteOptions = self.connection.options();
        opts.dedupe_key = dedupe_key;

        self.connection
            .execute(opts, || {
                let db = Arc::clone(&self.db);
                let f = f.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        let db = db.lock().unwrap_or_else(PoisonError::into_inner);
                        f(&*db)
                    })
                    .await
                    .map_err(|e| CoreError::Internal(e.to_string()))?
                }
            })
            .await
    }
}
