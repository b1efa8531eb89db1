// Library exports for the API binary, the scheduler CLI and tests
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;

use clock::Clock;
use config::Config;
use db::Store;
use services::{email::BulkMailer, scheduler::ReminderScheduler};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub mailer: Arc<BulkMailer>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn scheduler(&self) -> ReminderScheduler<'_> {
        ReminderScheduler::new(self.store.as_ref(), self.mailer.as_ref(), self.clock.as_ref())
    }
}
