// src/models/admin.rs

use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::{appointment::AppointmentStatus, auth::Role};

// Painel do administrador
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: i64,
    pub total_garages: i64,
    pub total_appointments: i64,
    pub users_by_role: Vec<RoleCount>,
    pub appointments_by_status: Vec<StatusCount>,
    pub pending_garages: i64,      // Aguardando aprovação
    pub active_subscriptions: i64,
    pub recent_users: i64,         // Cadastros nos últimos 30 dias
    pub monthly_appointments: Vec<MonthlyCount>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct RoleCount {
    pub role: Role,
    pub count: i64,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct StatusCount {
    pub status: AppointmentStatus,
    pub count: i64,
}

// Série mensal (6 meses, preenchida com zero)
#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct MonthlyCount {
    #[schema(example = "2025-05")]
    pub month: String,
    pub count: i64,
}
