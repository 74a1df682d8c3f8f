pub mod admin;
pub mod appointments;
pub mod auth;
pub mod billing;
pub mod garages;
pub mod uploads;
