use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound for `lead_days` and `reminder_days_before` (about ten years).
pub const MAX_DAYS_AHEAD: i64 = 3650;

/// Singleton controlling the due-soon sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationConfig {
    pub lead_days: i32,
    pub send_hour_utc: i32,
    pub send_minute_utc: i32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            lead_days: 7,
            send_hour_utc: 8,
            send_minute_utc: 0,
        }
    }
}

impl NotificationConfig {
    pub fn send_time(&self) -> String {
        format!("{:02}:{:02}", self.send_hour_utc, self.send_minute_utc)
    }

    pub fn apply(&mut self, req: &UpdateNotificationConfigRequest) -> Result<(), String> {
        if let Some(days) = req.lead_days {
            if !(0..=MAX_DAYS_AHEAD).contains(&(days as i64)) {
                return Err(format!("lead_days must be between 0 and {MAX_DAYS_AHEAD}"));
            }
            self.lead_days = days;
        }
        if let Some(time) = &req.send_time {
            let (hour, minute) = parse_send_time(time)
                .ok_or_else(|| "Invalid send_time, use HH:MM (e.g. 08:00)".to_string())?;
            self.send_hour_utc = hour;
            self.send_minute_utc = minute;
        }
        Ok(())
    }
}

/// Parse "HH:MM" (UTC) into hour and minute.
pub fn parse_send_time(s: &str) -> Option<(i32, i32)> {
    let (h, m) = s.trim().split_once(':')?;
    let hour = h.parse::<i32>().ok().filter(|h| (0..=23).contains(h))?;
    let minute = m.parse::<i32>().ok().filter(|m| (0..=59).contains(m))?;
    Some((hour, minute))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl ReportFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFrequency::Daily => "daily",
            ReportFrequency::Weekly => "weekly",
            ReportFrequency::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for ReportFrequency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ReportFrequency::Daily),
            "weekly" => Ok(ReportFrequency::Weekly),
            "monthly" => Ok(ReportFrequency::Monthly),
            _ => Err(anyhow::anyhow!("Unknown report frequency: {s}")),
        }
    }
}

/// Singleton with the progress-report and reminder-digest cadences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    pub progress_report_enabled: bool,
    pub progress_report_frequency: ReportFrequency,
    /// ISO weekday (1 = Monday .. 7 = Sunday) for weekly, day of month for monthly.
    pub progress_report_day: i32,
    pub progress_report_hour: i32,
    /// Comma-separated extra recipients, stored as entered.
    pub progress_report_additional_emails: Option<String>,
    pub last_progress_report_sent: Option<DateTime<Utc>>,
    pub reminder_email_enabled: bool,
    pub reminder_days_before: i32,
    pub last_reminder_check: Option<DateTime<Utc>>,
    pub assistance_email_enabled: bool,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            progress_report_enabled: true,
            progress_report_frequency: ReportFrequency::Weekly,
            progress_report_day: 1,
            progress_report_hour: 8,
            progress_report_additional_emails: None,
            last_progress_report_sent: None,
            reminder_email_enabled: true,
            reminder_days_before: 7,
            last_reminder_check: None,
            assistance_email_enabled: true,
        }
    }
}

impl SystemSettings {
    /// Apply a partial update, validating the merged result.
    pub fn apply(&mut self, req: UpdateSystemSettingsRequest) -> Result<(), String> {
        let mut next = self.clone();
        if let Some(v) = req.progress_report_enabled {
            next.progress_report_enabled = v;
        }
        if let Some(v) = req.progress_report_frequency {
            next.progress_report_frequency = v;
        }
        if let Some(v) = req.progress_report_day {
            next.progress_report_day = v;
        }
        if let Some(v) = req.progress_report_hour {
            next.progress_report_hour = v;
        }
        if let Some(v) = req.progress_report_additional_emails {
            let trimmed = v.trim().to_string();
            next.progress_report_additional_emails = (!trimmed.is_empty()).then_some(trimmed);
        }
        if let Some(v) = req.reminder_email_enabled {
            next.reminder_email_enabled = v;
        }
        if let Some(v) = req.reminder_days_before {
            next.reminder_days_before = v;
        }
        if let Some(v) = req.assistance_email_enabled {
            next.assistance_email_enabled = v;
        }

        let day_range = match next.progress_report_frequency {
            ReportFrequency::Daily => 1..=31,
            ReportFrequency::Weekly => 1..=7,
            ReportFrequency::Monthly => 1..=31,
        };
        if !day_range.contains(&next.progress_report_day) {
            return Err(format!(
                "progress_report_day {} is out of range for {} reports",
                next.progress_report_day,
                next.progress_report_frequency.as_str()
            ));
        }
        if !(0..=23).contains(&next.progress_report_hour) {
            return Err("progress_report_hour must be between 0 and 23".into());
        }
        if !(0..=MAX_DAYS_AHEAD).contains(&(next.reminder_days_before as i64)) {
            return Err(format!(
                "reminder_days_before must be between 0 and {MAX_DAYS_AHEAD}"
            ));
        }
        if let Some(bad) = next
            .additional_recipients()
            .into_iter()
            .find(|e| !e.contains('@'))
        {
            return Err(format!("Invalid additional recipient: {bad}"));
        }

        *self = next;
        Ok(())
    }

    pub fn additional_recipients(&self) -> Vec<String> {
        self.progress_report_additional_emails
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Body for PUT /admin/settings/notifications.
#[derive(Debug, Deserialize)]
pub struct UpdateNotificationConfigRequest {
    pub lead_days: Option<i32>,
    /// "HH:MM", UTC.
    pub send_time: Option<String>,
}

/// Body for PUT /admin/settings/system. Absent fields keep their value.
#[derive(Debug, Deserialize)]
pub struct UpdateSystemSettingsRequest {
    pub progress_report_enabled: Option<bool>,
    pub progress_report_frequency: Option<ReportFrequency>,
    pub progress_report_day: Option<i32>,
    pub progress_report_hour: Option<i32>,
    pub progress_report_additional_emails: Option<String>,
    pub reminder_email_enabled: Option<bool>,
    pub reminder_days_before: Option<i32>,
    pub assistance_email_enabled: Option<bool>,
}
