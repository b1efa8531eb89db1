use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    models::{
        assignment::{Assignment, AssignmentStatus},
        company::Company,
        settings::ReportFrequency,
    },
    services::{
        email::{escape_html, wrap_html},
        overdue::assignment_is_overdue,
    },
};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatusCounts {
    pub total: usize,
    pub not_started: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub needs_assistance: usize,
    pub overdue: usize,
}

impl StatusCounts {
    fn add(&mut self, a: &Assignment, now: DateTime<Utc>) {
        self.total += 1;
        match a.status {
            AssignmentStatus::NotStarted => self.not_started += 1,
            AssignmentStatus::InProgress => self.in_progress += 1,
            AssignmentStatus::Completed => self.completed += 1,
            AssignmentStatus::NeedsAssistance => self.needs_assistance += 1,
        }
        if assignment_is_overdue(a, now) {
            self.overdue += 1;
        }
    }

    /// Share of completed assignments, 0..=100.
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 * 100.0 / self.total as f64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyStats {
    pub company_id: Uuid,
    pub company_name: String,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub completion_rate: f64,
}

/// System-wide and per-company counts. Shared by the dashboard and the
/// periodic progress report.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressStats {
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub completion_rate: f64,
    /// Assistance requests opened since the previous report.
    pub new_assistance_requests: i64,
    /// Companies ordered from least to most complete.
    pub companies: Vec<CompanyStats>,
}

pub fn aggregate(
    companies: &[Company],
    assignments: &[Assignment],
    new_assistance_requests: i64,
    now: DateTime<Utc>,
) -> ProgressStats {
    let mut overall = StatusCounts::default();
    let mut per_company: HashMap<Uuid, StatusCounts> = HashMap::new();

    for a in assignments {
        overall.add(a, now);
        per_company.entry(a.company_id).or_default().add(a, now);
    }

    let mut rows: Vec<CompanyStats> = companies
        .iter()
        .map(|c| {
            let counts = per_company.remove(&c.id).unwrap_or_default();
            CompanyStats {
                company_id: c.id,
                company_name: c.name.clone(),
                completion_rate: counts.completion_rate(),
                counts,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.completion_rate
            .total_cmp(&b.completion_rate)
            .then_with(|| a.company_name.cmp(&b.company_name))
    });

    ProgressStats {
        generated_at: now,
        completion_rate: overall.completion_rate(),
        counts: overall,
        new_assistance_requests,
        companies: rows,
    }
}

/// A rendered email: subject, plain text and HTML alternative.
#[derive(Debug, Clone)]
pub struct RenderedMail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub fn render_progress_report(stats: &ProgressStats, frequency: ReportFrequency) -> RenderedMail {
    let period = match frequency {
        ReportFrequency::Daily => "Daily",
        ReportFrequency::Weekly => "Weekly",
        ReportFrequency::Monthly => "Monthly",
    };
    let subject = format!(
        "{period} progress report ({})",
        stats.generated_at.format("%Y-%m-%d")
    );
    let c = &stats.counts;

    let mut text = format!(
        "{subject}\n\n\
         Assignments: {}\n\
         Completed: {} ({:.0}%)\n\
         In progress: {}\n\
         Not started: {}\n\
         Needs assistance: {}\n\
         Overdue: {}\n\
         New assistance requests: {}\n\n\
         By company (least complete first):\n",
        c.total,
        c.completed,
        stats.completion_rate,
        c.in_progress,
        c.not_started,
        c.needs_assistance,
        c.overdue,
        stats.new_assistance_requests,
    );
    for row in &stats.companies {
        text.push_str(&format!(
            "- {}: {}/{} completed ({:.0}%), {} overdue, {} need assistance\n",
            row.company_name,
            row.counts.completed,
            row.counts.total,
            row.completion_rate,
            row.counts.overdue,
            row.counts.needs_assistance,
        ));
    }

    let rows: String = stats
        .companies
        .iter()
        .map(|row| {
            format!(
                r#"<tr><td style="padding:6px 8px;border-bottom:1px solid #e2e8f0">{}</td><td style="padding:6px 8px;border-bottom:1px solid #e2e8f0;text-align:right">{}/{}</td><td style="padding:6px 8px;border-bottom:1px solid #e2e8f0;text-align:right">{:.0}%</td><td style="padding:6px 8px;border-bottom:1px solid #e2e8f0;text-align:right">{}</td><td style="padding:6px 8px;border-bottom:1px solid #e2e8f0;text-align:right">{}</td></tr>"#,
                escape_html(&row.company_name),
                row.counts.completed,
                row.counts.total,
                row.completion_rate,
                row.counts.overdue,
                row.counts.needs_assistance,
            )
        })
        .collect();

    let content = format!(
        r#"<p style="margin:0 0 16px;font-size:15px;color:#334155;line-height:1.7">
{} assignments, {} completed ({:.0}%), {} in progress, {} not started, {} needing assistance, {} overdue. {} new assistance request(s).
</p>
<table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="font-size:14px;color:#334155;border-collapse:collapse">
<tr><th align="left" style="padding:6px 8px">Company</th><th align="right" style="padding:6px 8px">Done</th><th align="right" style="padding:6px 8px">Rate</th><th align="right" style="padding:6px 8px">Overdue</th><th align="right" style="padding:6px 8px">Assistance</th></tr>
{rows}
</table>"#,
        c.total,
        c.completed,
        stats.completion_rate,
        c.in_progress,
        c.not_started,
        c.needs_assistance,
        c.overdue,
        stats.new_assistance_requests,
    );

    RenderedMail {
        html: wrap_html(&subject, &content),
        subject,
        text,
    }
}

/// One email per company listing every assignment due on the digest day.
pub fn render_reminder_digest(
    company_name: &str,
    assignments: &[&Assignment],
    days_before: i64,
) -> RenderedMail {
    let subject = if assignments.len() == 1 {
        format!("Reminder: 1 measure due in {days_before} day(s)")
    } else {
        format!(
            "Reminder: {} measures due in {days_before} day(s)",
            assignments.len()
        )
    };

    let mut text = format!("Hello {company_name},\n\nThe following measures are due soon:\n\n");
    let mut items = String::new();
    for a in assignments {
        let due = a
            .due_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        text.push_str(&format!("- {} (due {due}, {})\n", a.measure_name, a.status.label()));
        items.push_str(&format!(
            "<li>{} (due {due}, {})</li>",
            escape_html(&a.measure_name),
            a.status.label()
        ));
    }

    let content = format!(
        r#"<p style="margin:0 0 12px;font-size:15px;color:#334155">Hello {},</p>
<p style="margin:0 0 12px;font-size:15px;color:#334155">The following measures are due soon:</p>
<ul style="margin:0;padding-left:20px;font-size:15px;color:#334155;line-height:1.7">{items}</ul>"#,
        escape_html(company_name)
    );

    RenderedMail {
        html: wrap_html(&subject, &content),
        subject,
        text,
    }
}

/// Subject and body of a due-soon notification.
pub fn render_due_soon(
    assignment: &Assignment,
    company_name: &str,
    lead_days: i64,
) -> (String, String) {
    let due = assignment
        .due_at
        .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "N/A".into());
    let subject = format!(
        "Measure due in {lead_days} day(s): {}",
        assignment.measure_name
    );
    let body = format!(
        "Hi,\n\n\
         {company_name} has a measure approaching its due date.\n\n\
         Measure: {}\n\
         Due at: {due}\n\
         Status: {}\n\n\
         Please log in to review progress and complete any remaining steps.",
        assignment.measure_name,
        assignment.status.label()
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 5, 9, 0, 0).unwrap()
    }

    fn company(name: &str) -> Company {
        Company {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: now(),
        }
    }

    fn assignment(company: &Company, status: AssignmentStatus, due_in_days: i64) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            company_id: company.id,
            measure_id: Uuid::new_v4(),
            measure_name: "Reduce waste".into(),
            status,
            urgency: 1,
            start_date: None,
            end_date: None,
            due_at: Some(now() + Duration::days(due_in_days)),
            target: None,
            departments: None,
            responsible: None,
            participants: None,
            created_at: now(),
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[test]
    fn aggregates_counts_and_orders_by_completion() {
        let acme = company("Acme");
        let bolt = company("Bolt");
        let empty = company("Zed");
        let assignments = vec![
            assignment(&acme, AssignmentStatus::Completed, -3),
            assignment(&acme, AssignmentStatus::Completed, 4),
            assignment(&bolt, AssignmentStatus::InProgress, -1),
            assignment(&bolt, AssignmentStatus::NeedsAssistance, 10),
        ];

        let stats = aggregate(&[acme, bolt, empty], &assignments, 2, now());

        assert_eq!(stats.counts.total, 4);
        assert_eq!(stats.counts.completed, 2);
        assert_eq!(stats.counts.overdue, 1);
        assert_eq!(stats.counts.needs_assistance, 1);
        assert_eq!(stats.completion_rate, 50.0);
        let names: Vec<_> = stats.companies.iter().map(|c| c.company_name.as_str()).collect();
        assert_eq!(names, vec!["Bolt", "Zed", "Acme"]);
    }

    #[test]
    fn report_lists_every_company() {
        let acme = company("Acme & Co");
        let assignments = vec![assignment(&acme, AssignmentStatus::InProgress, 2)];
        let stats = aggregate(&[acme], &assignments, 0, now());
        let mail = render_progress_report(&stats, ReportFrequency::Weekly);

        assert!(mail.subject.starts_with("Weekly progress report"));
        assert!(mail.text.contains("- Acme & Co: 0/1 completed"));
        assert!(mail.html.contains("Acme &amp; Co"));
    }

    #[test]
    fn due_soon_mentions_company_and_lead_time() {
        let acme = company("Acme");
        let a = assignment(&acme, AssignmentStatus::InProgress, 5);
        let (subject, body) = render_due_soon(&a, "Acme", 7);
        assert_eq!(subject, "Measure due in 7 day(s): Reduce waste");
        assert!(body.contains("Acme has a measure approaching its due date."));
        assert!(body.contains("Status: In Progress"));
    }

    #[test]
    fn digest_subject_counts_measures() {
        let acme = company("Acme");
        let a = assignment(&acme, AssignmentStatus::NotStarted, 7);
        let b = assignment(&acme, AssignmentStatus::InProgress, 7);
        let mail = render_reminder_digest("Acme", &[&a, &b], 7);
        assert_eq!(mail.subject, "Reminder: 2 measures due in 7 day(s)");
        assert_eq!(mail.text.matches("Reduce waste").count(), 2);
    }
}
