// src/services/admin_service.rs

use crate::{
    common::{
        error::AppError,
        policy::{require_role, Caller},
    },
    db::AdminRepository,
    models::{admin::AdminStats, auth::Role},
};

#[derive(Clone)]
pub struct AdminService {
    admin_repo: AdminRepository,
}

impl AdminService {
    pub fn new(admin_repo: AdminRepository) -> Self {
        Self { admin_repo }
    }

    pub async fn stats(&self, caller: &Caller) -> Result<AdminStats, AppError> {
        require_role(caller, Role::Admin)?;
        self.admin_repo.get_stats().await
    }
}
