use std::sync::Arc;

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, CounterVec, Gauge};
use tracing::{debug, warn};

use crate::db::Store;

lazy_static! {
    // ── Event counters ──────────────────────────────────────────────────────
    pub static ref NOTIFICATIONS_CREATED: CounterVec = register_counter_vec!(
        "measures_notifications_created_total",
        "Notifications created, by kind prefix",
        &["kind"]
    ).unwrap();

    pub static ref EMAILS_SENT: CounterVec = register_counter_vec!(
        "measures_emails_sent_total",
        "Emails accepted by the relay, by cadence",
        &["cadence"]
    ).unwrap();

    pub static ref EMAIL_FAILURES: CounterVec = register_counter_vec!(
        "measures_email_failures_total",
        "Emails that failed to send, by cadence",
        &["cadence"]
    ).unwrap();

    pub static ref SCHEDULER_RUNS: CounterVec = register_counter_vec!(
        "measures_scheduler_runs_total",
        "Scheduler invocations by cadence and outcome",
        &["cadence", "outcome"]
    ).unwrap();

    // ── Business gauges ─────────────────────────────────────────────────────
    pub static ref OPEN_ASSISTANCE: Gauge = register_gauge!(
        "measures_open_assistance_requests",
        "Assistance requests awaiting an admin decision"
    ).unwrap();
}

/// Kind label with the lead time stripped (`due_7d` -> `due`) to keep cardinality bounded.
pub fn kind_label(kind: &str) -> &str {
    match kind.rsplit_once('_') {
        Some((prefix, suffix))
            if suffix.ends_with('d') && suffix[..suffix.len() - 1].parse::<u32>().is_ok() =>
        {
            prefix
        }
        _ => kind,
    }
}

pub fn notification_created(kind: &str) {
    NOTIFICATIONS_CREATED.with_label_values(&[kind_label(kind)]).inc();
}

pub fn mail_batch(cadence: &str, sent: usize, failed: usize) {
    EMAILS_SENT.with_label_values(&[cadence]).inc_by(sent as f64);
    EMAIL_FAILURES.with_label_values(&[cadence]).inc_by(failed as f64);
}

pub fn scheduler_run(cadence: &str, outcome: &str) {
    SCHEDULER_RUNS.with_label_values(&[cadence, outcome]).inc();
}

/// Recount open assistance requests into the gauge. Returns the count, or
/// `None` when the store could not be read.
pub async fn refresh_open_assistance(store: &dyn Store) -> Option<usize> {
    match store.list_open_requests().await {
        Ok(open) => {
            OPEN_ASSISTANCE.set(open.len() as f64);
            debug!("Metrics: {} open assistance request(s)", open.len());
            Some(open.len())
        }
        Err(e) => {
            warn!("Metrics: collection failed: {}", e);
            None
        }
    }
}

/// Spawn the background gauge collector (refreshes every 5 minutes).
pub fn start(store: Arc<dyn Store>) {
    tokio::spawn(async move {
        loop {
            refresh_open_assistance(store.as_ref()).await;
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
        }
    });
}
