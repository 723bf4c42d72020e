//! Periodic purge of stale meetings
//!
//! Inactive meetings with no active participants that are older than the
//! retention window are deleted along with their rows.

use std::sync::Arc;

use stack_core::lifecycle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HousekeepingConfig;
use crate::state::{AppState, CallResult};

/// One purge pass
pub async fn run_once(state: &AppState, retention: chrono::Duration) -> CallResult<usize> {
    let purged = state
        .call(Some("housekeeping".to_string()), move |db| {
            lifecycle::purge_stale_meetings(db, retention)
        })
        .await?;
    if purged > 0 {
        info!(purged, "Housekeeping removed stale meetings");
    } else {
        debug!("Housekeeping found nothing to purge");
    }
    Ok(purged)
}

/// Run [`run_once`] every `config.interval()`
pub fn spawn(state: Arc<AppState>, config: HousekeepingConfig) -> JoinHandle<()> {
    let retention = config.retention();
    let period = config.interval();
    info!(retention_hours = config.retention_hours, interval_secs = period.as_secs(), "Housekeeping scheduled");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = run_once(&state, retention).await {
                warn!(error = %e, "Housekeeping pass failed");
            }
        }
    })
}
