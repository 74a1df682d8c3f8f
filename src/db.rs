pub mod account_repo;
pub use account_repo::AccountRepository;
pub mod garage_repo;
pub use garage_repo::GarageRepository;
pub mod appointment_repo;
pub use appointment_repo::AppointmentRepository;
pub mod billing_repo;
pub use billing_repo::BillingEventRepository;
pub mod admin_repo;
pub use admin_repo::AdminRepository;
