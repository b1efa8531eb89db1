use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, SmtpSecurity};

/// One outgoing email. `html`, when present, is sent as the alternative part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailJob {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html: Option<String>,
}

impl MailJob {
    pub fn text(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            html: None,
        }
    }

    pub fn with_html(mut self, html: String) -> Self {
        self.html = Some(html);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport is not configured")]
    Unavailable,

    #[error("invalid address '{0}'")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("recipient rejected: {0}")]
    Rejected(String),
}

/// Opens authenticated connections to the mail relay.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Connect and authenticate once. The connection is used for a whole batch.
    async fn connect(&self) -> Result<Box<dyn MailConnection>, MailError>;
}

#[async_trait]
pub trait MailConnection: Send {
    async fn send_one(&mut self, job: &MailJob) -> Result<(), MailError>;
    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub sent: usize,
    pub failed: usize,
}

/// Sends batches of jobs over a single connection.
///
/// A failing recipient is logged and counted; it never stops the rest of the
/// batch. Without a transport every job is logged and nothing is sent.
#[derive(Clone)]
pub struct BulkMailer {
    transport: Option<Arc<dyn MailTransport>>,
}

impl BulkMailer {
    pub fn new(transport: Option<Arc<dyn MailTransport>>) -> Self {
        Self { transport }
    }

    pub fn unconfigured() -> Self {
        Self { transport: None }
    }

    pub fn from_config(config: &Config) -> Self {
        match SmtpMailTransport::new(config) {
            Some(smtp) => {
                info!(
                    "SMTP transport configured ({}:{})",
                    config.smtp_host.as_deref().unwrap_or_default(),
                    config.smtp_port
                );
                Self::new(Some(Arc::new(smtp)))
            }
            None => {
                warn!("SMTP not configured, emails will only be logged");
                Self::unconfigured()
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    /// Send every job and return how many went out.
    pub async fn send(&self, jobs: &[MailJob]) -> usize {
        self.send_detailed(jobs).await.sent
    }

    pub async fn send_detailed(&self, jobs: &[MailJob]) -> BatchOutcome {
        if jobs.is_empty() {
            return BatchOutcome::default();
        }

        let Some(transport) = &self.transport else {
            for job in jobs {
                info!("[mail disabled] to={} subject={:?}", job.to, job.subject);
            }
            return BatchOutcome::default();
        };

        let mut conn = match transport.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Mail batch of {} aborted, cannot connect: {e}", jobs.len());
                return BatchOutcome {
                    sent: 0,
                    failed: jobs.len(),
                };
            }
        };

        let mut outcome = BatchOutcome::default();
        for job in jobs {
            match conn.send_one(job).await {
                Ok(()) => {
                    debug!("Mail sent to {}", job.to);
                    outcome.sent += 1;
                }
                Err(e) => {
                    warn!("Failed to send email to {}: {e}", job.to);
                    outcome.failed += 1;
                }
            }
        }
        conn.close().await;

        info!(
            "Mail batch done: {} sent, {} failed",
            outcome.sent, outcome.failed
        );
        outcome
    }
}

// ─── SMTP via lettre ─────────────────────────────────────────────────────────

/// Builds a lettre transport per batch, capped at one pooled connection so the
/// whole batch rides a single authenticated session.
pub struct SmtpMailTransport {
    host: String,
    port: u16,
    security: SmtpSecurity,
    credentials: Option<Credentials>,
    from: Mailbox,
    timeout: Duration,
}

impl SmtpMailTransport {
    /// Returns None if SMTP is not configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.clone()?;
        let from: Mailbox = config.smtp_from.as_deref()?.parse().ok()?;

        let credentials = match (&config.smtp_username, &config.smtp_password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
            _ => None,
        };

        Some(Self {
            host,
            port: config.smtp_port,
            security: config.smtp_security,
            credentials,
            from,
            timeout: Duration::from_secs(config.smtp_timeout_secs),
        })
    }

    fn build(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let builder = match self.security {
            SmtpSecurity::Ssl => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
                .map_err(|e| MailError::Transport(e.to_string()))?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                    .map_err(|e| MailError::Transport(e.to_string()))?
            }
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host),
        };

        let builder = builder
            .port(self.port)
            .timeout(Some(self.timeout))
            .pool_config(PoolConfig::new().max_size(1));

        let builder = match &self.credentials {
            Some(creds) => builder.credentials(creds.clone()),
            None => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn connect(&self) -> Result<Box<dyn MailConnection>, MailError> {
        let transport = self.build()?;
        // Opens the pooled connection and runs EHLO/AUTH once.
        match transport.test_connection().await {
            Ok(true) => {}
            Ok(false) => return Err(MailError::Transport("relay refused the session".into())),
            Err(e) => return Err(MailError::Transport(e.to_string())),
        }

        Ok(Box::new(SmtpConnection {
            transport: Some(transport),
            from: self.from.clone(),
        }))
    }
}

struct SmtpConnection {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpConnection {
    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    fn build_message(&self, job: &MailJob) -> Result<Message, MailError> {
        let to: Mailbox = job
            .to
            .parse()
            .map_err(|_| MailError::Address(job.to.clone()))?;

        let builder = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(self.from.clone())
            .to(to)
            .subject(job.subject.as_str());

        let message = match &job.html {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(job.body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            ),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(job.body.clone()),
        };

        message.map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailConnection for SmtpConnection {
    async fn send_one(&mut self, job: &MailJob) -> Result<(), MailError> {
        let message = self.build_message(job)?;
        let transport = self.transport.as_ref().ok_or(MailError::Unavailable)?;

        transport.send(message).await.map_err(|e| {
            if e.is_permanent() {
                MailError::Rejected(e.to_string())
            } else {
                MailError::Transport(e.to_string())
            }
        })?;
        Ok(())
    }

    async fn close(&mut self) {
        // Dropping the transport shuts its pooled connection down.
        self.transport.take();
    }
}

/// Wraps inner HTML content in the shared email layout.
pub fn wrap_html(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width,initial-scale=1">
  <title>{title}</title>
</head>
<body style="margin:0;padding:0;background-color:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Helvetica,Arial,sans-serif">
  <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="background-color:#f1f5f9;padding:32px 16px">
    <tr>
      <td align="center">
        <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="max-width:640px">
          <tr>
            <td style="background:#ffffff;border-radius:12px;padding:32px">
              <h1 style="margin:0 0 20px;font-size:20px;color:#0f172a">{title}</h1>
              {content}
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#
    )
}

/// Escape text for inclusion in HTML bodies.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Plain text rendered as HTML paragraphs.
pub fn text_to_html(body: &str) -> String {
    format!(
        r#"<p style="margin:0;font-size:15px;color:#334155;line-height:1.7">{}</p>"#,
        escape_html(body).replace('\n', "<br>")
    )
}
