use std::sync::Arc;

use chrono::{Timelike, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    db::Store,
    services::{email::BulkMailer, scheduler::ReminderScheduler},
};

/// Seconds from `second` (0-59) to the next minute boundary.
fn secs_until_next_minute(second: u32) -> u64 {
    60 - u64::from(second.min(59))
}

/// Spawn a background task that wakes up on every minute boundary and runs
/// one scheduler tick. Only one process should run this.
///
/// Each tick runs in its own task so a slow tick never pushes the loop past
/// the next boundary. Ticks never overlap: when the previous one is still
/// running at a boundary, that minute is skipped with a warning, which can
/// still miss an exact-minute due-soon sweep if a tick outlasts a full minute.
pub fn start(store: Arc<dyn Store>, mailer: Arc<BulkMailer>, clock: Arc<dyn Clock>) {
    info!("In-process scheduler tick enabled");
    let running = Arc::new(Mutex::new(()));
    tokio::spawn(async move {
        loop {
            let sleep_secs = secs_until_next_minute(Utc::now().second());
            tokio::time::sleep(tokio::time::Duration::from_secs(sleep_secs)).await;

            let Ok(guard) = running.clone().try_lock_owned() else {
                warn!("Previous scheduler tick still running, skipping this minute");
                continue;
            };
            let (store, mailer, clock) = (store.clone(), mailer.clone(), clock.clone());
            tokio::spawn(async move {
                ReminderScheduler::new(store.as_ref(), mailer.as_ref(), clock.as_ref())
                    .tick()
                    .await;
                drop(guard);
            });
        }
    });
}
