pub mod admin_service;
pub mod appointment_service;
pub mod auth;
pub mod billing_service;
pub mod garage_service;
pub mod stripe;
pub mod upload_service;
pub mod webhook;
