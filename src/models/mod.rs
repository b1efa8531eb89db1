pub mod assignment;
pub mod assistance;
pub mod auth;
pub mod company;
pub mod notification;
pub mod settings;
