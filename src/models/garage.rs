// src/models/garage.rs

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::auth::AccountSummary;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "specialty", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Specialty {
    Mechanic,
    Electric,
    BodyRepair,
    AllServices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "subscription_plan", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Monthly,
    Yearly,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Monthly => "monthly",
            SubscriptionPlan::Yearly => "yearly",
        }
    }

    /// Fim do período de uma assinatura que começa em `start`.
    pub fn period_end_from(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            SubscriptionPlan::Monthly => Months::new(1),
            SubscriptionPlan::Yearly => Months::new(12),
        };
        start.checked_add_months(months).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl std::str::FromStr for SubscriptionPlan {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(SubscriptionPlan::Monthly),
            "yearly" => Ok(SubscriptionPlan::Yearly),
            _ => Err(()),
        }
    }
}

// --- Entidade ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Garage {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[schema(example = "AutoFix Pro")]
    pub name: String,
    // Campo legado, sempre igual a `address`
    #[schema(example = "123 Main Street")]
    pub location: String,
    #[schema(example = "123 Main Street")]
    pub address: String,
    pub phone: Option<String>,
    pub description: Option<String>,
    pub specialties: Vec<Specialty>,
    pub photos: Vec<String>,
    pub is_approved: bool,
    pub subscription_active: bool,
    pub subscription_plan: Option<SubscriptionPlan>,
    pub subscription_ends_at: Option<DateTime<Utc>>,

    // Identificadores do provedor de pagamento não saem da API
    #[serde(skip_serializing, default)]
    #[schema(ignore)]
    pub stripe_customer_id: Option<String>,
    #[serde(skip_serializing, default)]
    #[schema(ignore)]
    pub subscription_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Garage {
    /// Visível ao público e apta a receber agendamentos.
    pub fn is_bookable(&self) -> bool {
        self.is_approved && self.subscription_active
    }
}

// Resumo desnormalizado anexado aos agendamentos
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GarageSummary {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub phone: Option<String>,
}

// Linha da listagem (JOIN com o dono + contagem)
#[derive(Debug, Clone, FromRow)]
pub struct GarageListingRow {
    #[sqlx(flatten)]
    pub garage: Garage,
    pub owner_name: String,
    pub owner_email: String,
    pub appointment_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GarageListing {
    #[serde(flatten)]
    pub garage: Garage,
    pub owner: AccountSummary,
    pub appointment_count: i64,
}

impl From<GarageListingRow> for GarageListing {
    fn from(row: GarageListingRow) -> Self {
        let owner = AccountSummary {
            id: row.garage.owner_id,
            name: row.owner_name,
            email: row.owner_email,
        };
        Self {
            garage: row.garage,
            owner,
            appointment_count: row.appointment_count,
        }
    }
}

// --- Payloads ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateGaragePayload {
    #[validate(length(min = 2, message = "name_too_short"))]
    #[schema(example = "AutoFix Pro")]
    pub name: String,

    #[validate(length(min = 2, message = "required"))]
    #[schema(example = "123 Main Street")]
    pub address: String,

    pub description: Option<String>,
    pub phone: Option<String>,

    #[validate(length(min = 1, message = "specialties_required"))]
    pub specialties: Vec<Specialty>,

    #[serde(default, alias = "images")]
    pub photos: Vec<String>,
}

// Atualização parcial: só os campos enviados mudam
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGaragePayload {
    #[validate(length(min = 2, message = "name_too_short"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 2, message = "required"))]
    pub address: Option<String>,
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "specialties_required"))]
    pub specialties: Option<Vec<Specialty>>,
    #[serde(alias = "images")]
    pub photos: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalPayload {
    pub is_approved: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct GarageFilter {
    /// `ALL_SERVICES` equivale a não filtrar
    pub specialty: Option<Specialty>,
    pub owner_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn monthly_plan_adds_one_calendar_month() {
        let start = Utc.with_ymd_and_hms(2025, 1, 31, 10, 0, 0).unwrap();
        let end = SubscriptionPlan::Monthly.period_end_from(start);
        // chrono ajusta para o último dia de fevereiro
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 28, 10, 0, 0).unwrap());
    }

    #[test]
    fn yearly_plan_adds_one_year() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap();
        let end = SubscriptionPlan::Yearly.period_end_from(start);
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 15, 8, 30, 0).unwrap());
    }

    #[test]
    fn plan_parses_from_metadata_strings() {
        assert_eq!("monthly".parse::<SubscriptionPlan>(), Ok(SubscriptionPlan::Monthly));
        assert_eq!("yearly".parse::<SubscriptionPlan>(), Ok(SubscriptionPlan::Yearly));
        assert!("weekly".parse::<SubscriptionPlan>().is_err());
    }

    #[test]
    fn create_payload_accepts_images_alias() {
        let payload: CreateGaragePayload = serde_json::from_value(serde_json::json!({
            "name": "AutoFix",
            "address": "1 Road",
            "specialties": ["MECHANIC", "BODY_REPAIR"],
            "images": ["https://cdn/x.jpg"]
        }))
        .unwrap();
        assert_eq!(payload.photos, vec!["https://cdn/x.jpg".to_string()]);
        assert_eq!(payload.specialties, vec![Specialty::Mechanic, Specialty::BodyRepair]);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn create_payload_requires_a_specialty() {
        let payload = CreateGaragePayload {
            name: "AutoFix".into(),
            address: "1 Road".into(),
            description: None,
            phone: None,
            specialties: vec![],
            photos: vec![],
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("specialties"));
    }

    #[test]
    fn update_payload_cannot_clear_specialties() {
        let emptied = UpdateGaragePayload { specialties: Some(vec![]), ..Default::default() };
        let errors = emptied.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("specialties"));

        // Campo omitido continua válido
        assert!(UpdateGaragePayload::default().validate().is_ok());
        let replaced = UpdateGaragePayload { specialties: Some(vec![Specialty::Electric]), ..Default::default() };
        assert!(replaced.validate().is_ok());
    }

    #[test]
    fn billing_identifiers_stay_private() {
        let garage = Garage {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "G".into(),
            location: "L".into(),
            address: "L".into(),
            phone: None,
            description: None,
            specialties: vec![Specialty::Electric],
            photos: vec![],
            is_approved: true,
            subscription_active: true,
            subscription_plan: Some(SubscriptionPlan::Monthly),
            subscription_ends_at: None,
            stripe_customer_id: Some("cus_1".into()),
            subscription_id: Some("sub_1".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&garage).unwrap();
        assert!(json.get("stripeCustomerId").is_none());
        assert!(json.get("subscriptionId").is_none());
        assert_eq!(json["subscriptionPlan"], "monthly");
        assert_eq!(json["specialties"][0], "ELECTRIC");
    }
}
