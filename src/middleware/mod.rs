pub mod auth;
pub mod cron_key;
