use std::env;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    StartTls,
    /// Implicit TLS, usually port 465.
    Ssl,
    None,
}

impl std::str::FromStr for SmtpSecurity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starttls" | "tls" => Ok(SmtpSecurity::StartTls),
            "ssl" => Ok(SmtpSecurity::Ssl),
            "none" | "plain" => Ok(SmtpSecurity::None),
            _ => Err(anyhow::anyhow!("Unknown SMTP_SECURITY: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
    pub cron_key: String,
    pub scheduler_tick: bool,
    // SMTP (optional)
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_security: SmtpSecurity,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let smtp_port: Option<u16> = env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok());
        let smtp_security = match env::var("SMTP_SECURITY").ok().filter(|s| !s.is_empty()) {
            Some(v) => v.parse()?,
            None if smtp_port == Some(465) => SmtpSecurity::Ssl,
            None => SmtpSecurity::StartTls,
        };
        let smtp_port = smtp_port.unwrap_or(match smtp_security {
            SmtpSecurity::Ssl => 465,
            _ => 587,
        });
        let smtp_username = env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
            cron_key: env::var("CRON_KEY")
                .unwrap_or_else(|_| "change_this_cron_key".into()),
            scheduler_tick: env::var("SCHEDULER_TICK")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            smtp_host: env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()),
            smtp_port,
            smtp_security,
            smtp_from: env::var("SMTP_FROM")
                .ok()
                .filter(|s| !s.is_empty())
                .or_else(|| smtp_username.clone()),
            smtp_username,
            smtp_password: env::var("SMTP_PASSWORD").ok().filter(|s| !s.is_empty()),
            smtp_timeout_secs: env::var("SMTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "20".into())
                .parse()?,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
