//! Trigger surface for an external cron.
//!
//! Usage:
//!   scheduler notify-due [--days N] [--dry-run] [--no-email] [--ignore-send-window] [--at RFC3339]
//!   scheduler progress-report [--force]
//!   scheduler due-reminders
//!
//! Reads the same environment as the API (`DATABASE_URL`, `SMTP_*`, ...).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use measures_api::{
    clock::{Clock, FixedClock, SystemClock},
    config::Config,
    db::{self, PgStore},
    services::{
        email::BulkMailer,
        scheduler::{DueSweepOptions, ReminderScheduler, RunStatus},
    },
};

#[derive(Parser)]
#[command(name = "scheduler", about = "Run one measures scheduler cadence")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create due-soon notifications and email company users
    NotifyDue {
        /// Lead time in days (defaults to the stored notification config)
        #[arg(long)]
        days: Option<i64>,
        /// Report what would be created without writing or sending anything
        #[arg(long)]
        dry_run: bool,
        /// Create notifications but send no email
        #[arg(long)]
        no_email: bool,
        /// Run even outside the configured send minute
        #[arg(long)]
        ignore_send_window: bool,
        /// Pretend the current time is this instant (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Send the periodic progress report to admins
    ProgressReport {
        /// Send even when disabled or not yet due
        #[arg(long)]
        force: bool,
    },
    /// Send the per-company due-date reminder digest
    DueReminders,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    let store = PgStore::new(pool);
    let mailer = BulkMailer::from_config(&config);

    match args.command {
        Command::NotifyDue {
            days,
            dry_run,
            no_email,
            ignore_send_window,
            at,
        } => {
            let clock: Arc<dyn Clock> = match at {
                Some(at) => {
                    tracing::info!("Replaying sweep at {at}");
                    Arc::new(FixedClock(at))
                }
                None => Arc::new(SystemClock),
            };
            let opts = DueSweepOptions {
                lead_days: days,
                dry_run,
                skip_email: no_email,
                ignore_send_window,
            };
            let summary = ReminderScheduler::new(&store, &mailer, clock.as_ref())
                .notify_due(opts)
                .await?;
            println!(
                "{}Notifications created: {}. Emails queued: {}. Emails actually sent: {}.",
                if dry_run { "(DRY-RUN) " } else { "" },
                summary.created,
                summary.emails_queued,
                summary.emails_sent
            );
        }
        Command::ProgressReport { force } => {
            let outcome = ReminderScheduler::new(&store, &mailer, &SystemClock)
                .send_progress_report(force)
                .await;
            println!("{}: {}", outcome.status.as_str(), outcome.message);
            if outcome.status == RunStatus::Error {
                anyhow::bail!(outcome.message);
            }
        }
        Command::DueReminders => {
            let outcome = ReminderScheduler::new(&store, &mailer, &SystemClock)
                .send_due_date_reminders()
                .await;
            println!("{}: {}", outcome.status.as_str(), outcome.message);
            if outcome.status == RunStatus::Error {
                anyhow::bail!(outcome.message);
            }
        }
    }

    Ok(())
}
