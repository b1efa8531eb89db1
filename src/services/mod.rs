pub mod activity;
pub mod assignments;
pub mod assistance;
pub mod email;
pub mod metrics;
pub mod notifications;
pub mod overdue;
pub mod report;
pub mod scheduler;
pub mod status;
pub mod ticker;
