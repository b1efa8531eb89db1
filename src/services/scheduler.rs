use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    db::Store,
    error::{EngineError, EngineResult},
    models::{
        assignment::Assignment,
        company::User,
        notification::{due_kind, reminder_kind, NewNotification},
        settings::{NotificationConfig, ReportFrequency, SystemSettings, MAX_DAYS_AHEAD},
    },
    services::{
        email::{text_to_html, wrap_html, BulkMailer, MailJob},
        metrics,
        notifications::NotificationService,
        report,
    },
};

// ─── Results ─────────────────────────────────────────────────────────────────

/// Flags of one due-soon sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct DueSweepOptions {
    /// Overrides `NotificationConfig::lead_days`.
    pub lead_days: Option<i64>,
    pub dry_run: bool,
    pub skip_email: bool,
    pub ignore_send_window: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SweepSummary {
    pub created: usize,
    pub emails_queued: usize,
    pub emails_sent: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Skipped,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Skipped => "skipped",
            RunStatus::Error => "error",
        }
    }
}

/// Result of a parameterless cadence.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub message: String,
}

impl RunOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            message: message.into(),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Skipped,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            message: message.into(),
        }
    }
}

// ─── Gating ──────────────────────────────────────────────────────────────────

/// The due-soon sweep only fires on the configured UTC minute.
pub fn in_send_window(cfg: &NotificationConfig, now: DateTime<Utc>) -> bool {
    now.hour() as i32 == cfg.send_hour_utc && now.minute() as i32 == cfg.send_minute_utc
}

/// Whether the periodic progress report should go out at `now`.
///
/// Nothing fires before `progress_report_hour`. Weekly reports match the ISO
/// weekday (1 = Monday); monthly reports match the day of month, clamped to
/// the last day of short months. A report that was never sent is due as soon
/// as the calendar condition holds.
pub fn progress_report_due(settings: &SystemSettings, now: DateTime<Utc>) -> bool {
    if (now.hour() as i32) < settings.progress_report_hour {
        return false;
    }

    let elapsed_at_least = |min: Duration| {
        settings
            .last_progress_report_sent
            .map_or(true, |last| now - last >= min)
    };

    match settings.progress_report_frequency {
        ReportFrequency::Daily => elapsed_at_least(Duration::hours(23)),
        ReportFrequency::Weekly => {
            now.weekday().number_from_monday() as i32 == settings.progress_report_day
                && elapsed_at_least(Duration::days(6))
        }
        ReportFrequency::Monthly => {
            let day = settings
                .progress_report_day
                .clamp(1, last_day_of_month(now.year(), now.month()) as i32);
            now.day() as i32 == day && elapsed_at_least(Duration::days(28))
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// `now + days`, or `None` when that falls outside the representable range.
pub fn days_ahead(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|d| now.checked_add_signed(d))
}

/// `[start, end)` covering the whole UTC day `days_before` days from now.
pub fn digest_window(
    now: DateTime<Utc>,
    days_before: i64,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = days_ahead(now, days_before)?
        .date_naive()
        .and_time(chrono::NaiveTime::default())
        .and_utc();
    Some((start, days_ahead(start, 1)?))
}

fn check_days_ahead(name: &str, days: i64) -> EngineResult<()> {
    if (0..=MAX_DAYS_AHEAD).contains(&days) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "{name} must be between 0 and {MAX_DAYS_AHEAD}, got {days}"
        )))
    }
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

/// Runs the three cadences against one store, mailer and clock.
///
/// Stateless between invocations: every run loads its configuration from the
/// store, and the `(assignment_id, kind)` key is what keeps re-runs harmless.
pub struct ReminderScheduler<'a> {
    store: &'a dyn Store,
    mailer: &'a BulkMailer,
    clock: &'a dyn Clock,
}

impl<'a> ReminderScheduler<'a> {
    pub fn new(store: &'a dyn Store, mailer: &'a BulkMailer, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            mailer,
            clock,
        }
    }

    /// Due-soon sweep: one notification per assignment due within the lead
    /// time, emailed to the company's active users.
    pub async fn notify_due(&self, opts: DueSweepOptions) -> EngineResult<SweepSummary> {
        let result = self.run_notify_due(opts).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(_) => "error",
        };
        metrics::scheduler_run("notify_due", outcome);
        if let Err(e) = &result {
            error!("Due-soon sweep aborted: {e}");
        }
        result
    }

    async fn run_notify_due(&self, opts: DueSweepOptions) -> EngineResult<SweepSummary> {
        let now = self.clock.now();
        let cfg = self.store.load_notification_config().await?;

        if !opts.ignore_send_window && !in_send_window(&cfg, now) {
            info!(
                "Not the configured send time (now {}Z, configured {}Z), skipping",
                now.format("%H:%M"),
                cfg.send_time()
            );
            return Ok(SweepSummary::default());
        }

        let lead_days = opts.lead_days.unwrap_or(cfg.lead_days as i64);
        check_days_ahead("lead days", lead_days)?;
        let kind = due_kind(lead_days);
        let horizon = days_ahead(now, lead_days)
            .ok_or_else(|| EngineError::Validation(format!("lead days {lead_days} out of range")))?;

        let due = self.store.assignments_due_between(now, horizon).await?;
        info!(
            "{}Due-soon sweep {kind}: {} candidate(s) before {horizon}",
            if opts.dry_run { "(DRY-RUN) " } else { "" },
            due.len()
        );

        let mut summary = SweepSummary::default();
        let mut jobs = Vec::new();
        let mut companies: HashMap<Uuid, String> = HashMap::new();
        let mut users: HashMap<Uuid, Vec<User>> = HashMap::new();

        for assignment in &due {
            if self.store.notification_exists(assignment.id, &kind).await? {
                debug!("Assignment {} already notified for {kind}", assignment.id);
                continue;
            }

            let company_name = self.company_name(&mut companies, assignment.company_id).await?;
            let (subject, body) = report::render_due_soon(assignment, &company_name, lead_days);

            if opts.dry_run {
                info!(
                    "[DRY-RUN] Would create notification for assignment {} ({subject})",
                    assignment.id
                );
                continue;
            }

            let new = NewNotification {
                company_id: assignment.company_id,
                user_id: None,
                assignment_id: Some(assignment.id),
                kind: kind.clone(),
                subject: subject.clone(),
                body: body.clone(),
                notify_at: now,
            };
            if NotificationService::create_once(self.store, &new).await?.is_none() {
                continue;
            }
            summary.created += 1;

            if opts.skip_email {
                continue;
            }
            if !users.contains_key(&assignment.company_id) {
                let fetched = self.store.active_company_users(assignment.company_id).await?;
                users.insert(assignment.company_id, fetched);
            }
            let recipients = users
                .get(&assignment.company_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if recipients.is_empty() {
                warn!("No active users for company '{company_name}', nothing queued");
            }
            let html = wrap_html(&subject, &text_to_html(&body));
            for user in recipients {
                jobs.push(MailJob::text(&user.email, &subject, &body).with_html(html.clone()));
            }
        }

        summary.emails_queued = jobs.len();
        if !jobs.is_empty() {
            let outcome = self.mailer.send_detailed(&jobs).await;
            metrics::mail_batch("notify_due", outcome.sent, outcome.failed);
            summary.emails_sent = outcome.sent;

            if outcome.sent > 0 {
                let ids = self.store.unsent_notification_ids(&kind).await?;
                self.store.mark_email_sent(&ids, self.clock.now()).await?;
            }
        }

        info!(
            "{}Notifications created: {}. Emails queued: {}. Emails actually sent: {}.",
            if opts.dry_run { "(DRY-RUN) " } else { "" },
            summary.created,
            summary.emails_queued,
            summary.emails_sent
        );
        Ok(summary)
    }

    /// Periodic progress report to admins and the additional recipients.
    /// `force` bypasses the enabled flag and the cadence check.
    pub async fn send_progress_report(&self, force: bool) -> RunOutcome {
        let outcome = self
            .run_progress_report(force)
            .await
            .unwrap_or_else(|e| RunOutcome::error(format!("Failed to send progress report: {e}")));
        record("progress_report", &outcome);
        outcome
    }

    async fn run_progress_report(&self, force: bool) -> EngineResult<RunOutcome> {
        let now = self.clock.now();
        let settings = self.store.load_system_settings().await?;

        if !force {
            if !settings.progress_report_enabled {
                return Ok(RunOutcome::skipped("Progress reports are disabled"));
            }
            if !progress_report_due(&settings, now) {
                return Ok(RunOutcome::skipped("Progress report is not due yet"));
            }
        }
        if !self.mailer.is_configured() {
            return Ok(RunOutcome::skipped(
                "Mail not configured, cannot send progress report",
            ));
        }

        let recipients = report_recipients(
            self.store.active_admin_emails().await?,
            settings.additional_recipients(),
        );
        if recipients.is_empty() {
            return Ok(RunOutcome::skipped("No recipients for progress report"));
        }

        let companies = self.store.list_companies().await?;
        let assignments = self.store.list_assignments(None).await?;
        let since = settings
            .last_progress_report_sent
            .unwrap_or_else(|| now - Duration::days(7));
        let new_requests = self.store.count_open_requests_since(since).await?;

        let stats = report::aggregate(&companies, &assignments, new_requests, now);
        let mail = report::render_progress_report(&stats, settings.progress_report_frequency);

        let jobs: Vec<MailJob> = recipients
            .iter()
            .map(|to| MailJob::text(to, &mail.subject, &mail.text).with_html(mail.html.clone()))
            .collect();
        let outcome = self.mailer.send_detailed(&jobs).await;
        metrics::mail_batch("progress_report", outcome.sent, outcome.failed);

        if outcome.sent == 0 {
            return Ok(RunOutcome::error(format!(
                "Progress report could not be delivered to any of {} recipient(s)",
                recipients.len()
            )));
        }

        self.store.stamp_progress_report_sent(now).await?;
        Ok(RunOutcome::success(format!(
            "Progress report sent to {} of {} recipient(s)",
            outcome.sent,
            recipients.len()
        )))
    }

    /// Daily digest: one email per company listing everything due exactly
    /// `reminder_days_before` days from now.
    pub async fn send_due_date_reminders(&self) -> RunOutcome {
        let outcome = self
            .run_due_date_reminders()
            .await
            .unwrap_or_else(|e| RunOutcome::error(format!("Failed to send reminders: {e}")));
        record("due_reminders", &outcome);
        outcome
    }

    async fn run_due_date_reminders(&self) -> EngineResult<RunOutcome> {
        let now = self.clock.now();
        let settings = self.store.load_system_settings().await?;

        if !settings.reminder_email_enabled {
            return Ok(RunOutcome::skipped("Reminder emails are disabled"));
        }
        if !self.mailer.is_configured() {
            return Ok(RunOutcome::skipped("Mail not configured, cannot send reminders"));
        }

        let days_before = settings.reminder_days_before as i64;
        check_days_ahead("reminder days before", days_before)?;
        let kind = reminder_kind(days_before);
        let (start, end) = digest_window(now, days_before).ok_or_else(|| {
            EngineError::Validation(format!("reminder days before {days_before} out of range"))
        })?;
        let due = self.store.assignments_due_between(start, end).await?;

        let mut by_company: BTreeMap<Uuid, Vec<&Assignment>> = BTreeMap::new();
        for assignment in &due {
            if self.store.notification_exists(assignment.id, &kind).await? {
                continue;
            }
            by_company.entry(assignment.company_id).or_default().push(assignment);
        }

        let mut digests = 0;
        let mut covered = 0;
        for (company_id, assignments) in &by_company {
            let Some(company) = self.store.find_company(*company_id).await? else {
                continue;
            };
            let users = self.store.active_company_users(*company_id).await?;
            if users.is_empty() {
                warn!("No active users for company {}", company.name);
                continue;
            }

            let mail = report::render_reminder_digest(&company.name, assignments, days_before);
            let jobs: Vec<MailJob> = users
                .iter()
                .map(|u| {
                    MailJob::text(&u.email, &mail.subject, &mail.text).with_html(mail.html.clone())
                })
                .collect();
            let outcome = self.mailer.send_detailed(&jobs).await;
            metrics::mail_batch("due_reminders", outcome.sent, outcome.failed);

            if outcome.sent == 0 {
                warn!("Reminder digest to {} was not delivered", company.name);
                continue;
            }

            let mut recorded = Vec::with_capacity(assignments.len());
            for assignment in assignments {
                let new = NewNotification {
                    company_id: *company_id,
                    user_id: None,
                    assignment_id: Some(assignment.id),
                    kind: kind.clone(),
                    subject: mail.subject.clone(),
                    body: mail.text.clone(),
                    notify_at: now,
                };
                if let Some(n) = NotificationService::create_once(self.store, &new).await? {
                    recorded.push(n.id);
                }
            }
            self.store.mark_email_sent(&recorded, now).await?;

            info!(
                "Reminder sent to {} ({} recipient(s), {} measure(s))",
                company.name,
                outcome.sent,
                assignments.len()
            );
            digests += 1;
            covered += assignments.len();
        }

        self.store.stamp_reminder_check(now).await?;

        if due.is_empty() {
            return Ok(RunOutcome::success(format!(
                "No assignments due in {days_before} days"
            )));
        }
        Ok(RunOutcome::success(format!(
            "Sent {digests} reminder digest(s) for {covered} assignment(s)"
        )))
    }

    /// One scheduler tick: every cadence with default flags.
    pub async fn tick(&self) {
        match self.notify_due(DueSweepOptions::default()).await {
            Ok(s) if s.created > 0 => info!("Tick: due-soon sweep created {}", s.created),
            Ok(_) => {}
            Err(e) => warn!("Tick: due-soon sweep failed: {e}"),
        }

        let report = self.send_progress_report(false).await;
        if report.status != RunStatus::Skipped {
            info!("Tick: progress report {}: {}", report.status.as_str(), report.message);
        }

        let reminders = self.send_due_date_reminders().await;
        if reminders.status == RunStatus::Error {
            warn!("Tick: reminders failed: {}", reminders.message);
        }
    }

    async fn company_name(
        &self,
        cache: &mut HashMap<Uuid, String>,
        company_id: Uuid,
    ) -> EngineResult<String> {
        if let Some(name) = cache.get(&company_id) {
            return Ok(name.clone());
        }
        let name = self
            .store
            .find_company(company_id)
            .await?
            .map(|c| c.name)
            .unwrap_or_else(|| "Your company".into());
        cache.insert(company_id, name.clone());
        Ok(name)
    }
}

/// Admins first, then additional recipients, without case-insensitive duplicates.
fn report_recipients(admins: Vec<String>, additional: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    admins
        .into_iter()
        .chain(additional)
        .filter(|email| seen.insert(email.to_ascii_lowercase()))
        .collect()
}

fn record(cadence: &str, outcome: &RunOutcome) {
    metrics::scheduler_run(cadence, outcome.status.as_str());
    match outcome.status {
        RunStatus::Success => info!("{cadence}: {}", outcome.message),
        RunStatus::Skipped => debug!("{cadence} skipped: {}", outcome.message),
        RunStatus::Error => error!("{cadence}: {}", outcome.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn weekly(day: i32, last: Option<DateTime<Utc>>) -> SystemSettings {
        SystemSettings {
            progress_report_frequency: ReportFrequency::Weekly,
            progress_report_day: day,
            progress_report_hour: 8,
            last_progress_report_sent: last,
            ..SystemSettings::default()
        }
    }

    #[test]
    fn send_window_is_an_exact_minute() {
        let cfg = NotificationConfig {
            lead_days: 7,
            send_hour_utc: 8,
            send_minute_utc: 0,
        };
        assert!(in_send_window(&cfg, at(2025, 3, 3, 8, 0)));
        assert!(!in_send_window(&cfg, at(2025, 3, 3, 8, 1)));
        assert!(!in_send_window(&cfg, at(2025, 3, 3, 9, 0)));
    }

    #[test]
    fn daily_needs_23_hours() {
        let settings = SystemSettings {
            progress_report_frequency: ReportFrequency::Daily,
            last_progress_report_sent: Some(at(2025, 3, 3, 9, 0)),
            ..SystemSettings::default()
        };
        assert!(!progress_report_due(&settings, at(2025, 3, 4, 7, 59)));
        assert!(!progress_report_due(&settings, at(2025, 3, 4, 7, 0)));
        assert!(progress_report_due(&settings, at(2025, 3, 4, 8, 0)));
    }

    #[test]
    fn weekly_matches_iso_weekday_and_elapsed_days() {
        // 2025-03-03 is a Monday.
        let monday = at(2025, 3, 3, 8, 30);
        assert!(progress_report_due(&weekly(1, None), monday));
        assert!(!progress_report_due(&weekly(2, None), monday));
        assert!(!progress_report_due(
            &weekly(1, Some(at(2025, 2, 27, 8, 30))),
            monday
        ));
        assert!(progress_report_due(
            &weekly(1, Some(at(2025, 2, 24, 8, 30))),
            monday
        ));
    }

    #[test]
    fn nothing_fires_before_the_report_hour() {
        assert!(!progress_report_due(&weekly(1, None), at(2025, 3, 3, 7, 59)));
    }

    #[test]
    fn monthly_clamps_to_short_months() {
        let settings = SystemSettings {
            progress_report_frequency: ReportFrequency::Monthly,
            progress_report_day: 31,
            last_progress_report_sent: Some(at(2025, 1, 31, 8, 0)),
            ..SystemSettings::default()
        };
        assert!(progress_report_due(&settings, at(2025, 2, 28, 9, 0)));
        assert!(!progress_report_due(&settings, at(2025, 2, 27, 9, 0)));
    }

    #[test]
    fn digest_window_is_one_utc_day() {
        let (start, end) = digest_window(at(2025, 3, 3, 17, 45), 7).unwrap();
        assert_eq!(start, at(2025, 3, 10, 0, 0));
        assert_eq!(end, at(2025, 3, 11, 0, 0));
    }

    #[test]
    fn out_of_range_offsets_do_not_overflow() {
        let now = at(2025, 3, 3, 17, 45);
        assert_eq!(days_ahead(now, 1_000_000_000), None);
        assert_eq!(days_ahead(now, i64::MAX), None);
        assert_eq!(digest_window(now, 1_000_000_000), None);
        assert!(check_days_ahead("lead days", MAX_DAYS_AHEAD).is_ok());
        assert!(matches!(
            check_days_ahead("lead days", MAX_DAYS_AHEAD + 1),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn recipients_are_deduplicated() {
        let r = report_recipients(
            vec!["admin@x.io".into()],
            vec!["Admin@x.io".into(), "board@x.io".into()],
        );
        assert_eq!(r, vec!["admin@x.io", "board@x.io"]);
    }
}
