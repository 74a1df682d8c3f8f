// src/models/appointment.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{auth::AccountSummary, garage::GarageSummary};

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "appointment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Done,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Done => "DONE",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    /// Tabela de transições:
    /// PENDING -> CONFIRMED | CANCELLED, CONFIRMED -> DONE | CANCELLED.
    /// Reafirmar o status atual não é uma transição.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Done) | (Confirmed, Cancelled)
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Como o `respond` trata mudanças de status fora da tabela.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Rejeita transições fora da tabela com erro de validação.
    #[default]
    Strict,
    /// Qualquer status pode sobrescrever qualquer outro (correções manuais).
    Permissive,
}

impl std::str::FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(TransitionPolicy::Strict),
            "permissive" => Ok(TransitionPolicy::Permissive),
            other => Err(format!("política de transição desconhecida: {other}")),
        }
    }
}

// --- Entidade ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub garage_id: Uuid,
    #[schema(example = "Toyota Camry")]
    pub car_model: String,
    #[schema(example = "2019")]
    pub car_year: String,
    pub description: String,
    pub photos: Vec<String>,
    pub status: AppointmentStatus,
    #[schema(example = "350.00")]
    pub cost_estimate: Option<Decimal>,
    #[schema(example = 2)]
    pub duration_days: Option<i32>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub owner_notes: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Linha do JOIN appointments + accounts + garages
#[derive(Debug, Clone, FromRow)]
pub struct AppointmentRow {
    #[sqlx(flatten)]
    pub appointment: Appointment,
    pub user_name: String,
    pub user_email: String,
    pub garage_name: String,
    pub garage_location: String,
    pub garage_phone: Option<String>,
    pub garage_owner_id: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDetail {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub user: AccountSummary,
    pub garage: GarageSummary,
    #[serde(skip)]
    pub garage_owner_id: Uuid,
}

impl From<AppointmentRow> for AppointmentDetail {
    fn from(row: AppointmentRow) -> Self {
        let user = AccountSummary {
            id: row.appointment.user_id,
            name: row.user_name,
            email: row.user_email,
        };
        let garage = GarageSummary {
            id: row.appointment.garage_id,
            name: row.garage_name,
            location: row.garage_location,
            phone: row.garage_phone,
        };
        Self {
            appointment: row.appointment,
            user,
            garage,
            garage_owner_id: row.garage_owner_id,
        }
    }
}

// --- Payloads ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentPayload {
    pub garage_id: Uuid,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "Toyota Camry")]
    pub car_model: String,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "2019")]
    pub car_year: String,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "Barulho na suspensão dianteira")]
    pub description: String,

    #[serde(default)]
    pub photos: Vec<String>,
}

fn validate_positive(val: &Decimal) -> Result<(), ValidationError> {
    if *val <= Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.message = Some("must_be_positive".into());
        return Err(err);
    }
    Ok(())
}

// Resposta do dono (orçamento, confirmação, conclusão)
#[derive(Debug, Default, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RespondAppointmentPayload {
    #[validate(custom(function = "validate_positive"))]
    #[schema(example = "350.00")]
    pub cost_estimate: Option<Decimal>,

    #[validate(range(min = 1, message = "must_be_positive"))]
    #[schema(example = 2)]
    pub duration_days: Option<i32>,

    /// RFC 3339 ou `YYYY-MM-DD`
    #[schema(example = "2025-06-01")]
    pub appointment_date: Option<String>,

    pub owner_notes: Option<String>,

    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AppointmentFilter {
    pub garage_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}
