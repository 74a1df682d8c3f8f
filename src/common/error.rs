use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{
    common::i18n::I18nStore,
    middleware::i18n::Locale,
    models::appointment::AppointmentStatus,
};

// Taxonomia interna de erros. Os serviços só conhecem este tipo.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Corpo da requisição inválido: {0}")]
    MalformedBody(String),

    #[error("E-mail já existe")]
    EmailAlreadyExists,

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Acesso negado")]
    Forbidden,

    #[error("Oficina não encontrada")]
    GarageNotFound,

    // Existe, mas não aceita agendamentos. Para o cliente é igual a NotFound.
    #[error("Oficina indisponível")]
    GarageUnavailable,

    #[error("Agendamento não encontrado")]
    AppointmentNotFound,

    #[error("Transição de status inválida: {from} -> {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Oficina sem cliente no provedor de pagamento")]
    NoBillingAccount,

    #[error("Ativação manual desativada")]
    ManualActivationDisabled,

    #[error("Assinatura do webhook inválida: {0}")]
    InvalidWebhookSignature(String),

    #[error("Integração não configurada: {0}")]
    NotConfigured(&'static str),

    #[error("Falha no serviço externo: {0}")]
    ExternalService(String),

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

// `cost_estimate` -> `costEstimate`, como no restante da API
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for ch in field.chars() {
        if ch == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

impl AppError {
    /// Erro de validação para um único campo, no mesmo formato do `validator`.
    pub fn field(field: &'static str, code: &'static str) -> Self {
        let mut err = validator::ValidationError::new(code);
        err.message = Some(code.into());
        let mut errors = validator::ValidationErrors::new();
        errors.add(field, err);
        AppError::ValidationError(errors)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::MalformedBody(_)
            | AppError::InvalidStatusTransition { .. }
            | AppError::NoBillingAccount
            | AppError::InvalidWebhookSignature(_) => StatusCode::BAD_REQUEST,
            AppError::EmailAlreadyExists => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::ManualActivationDisabled => StatusCode::FORBIDDEN,
            AppError::GarageNotFound
            | AppError::GarageUnavailable
            | AppError::AppointmentNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converte para a resposta HTTP, já traduzida para o idioma do cliente.
    pub fn to_api_error(self, locale: &Locale, store: &I18nStore) -> ApiError {
        let status = self.status_code();
        let lang = locale.0.as_str();

        let (key, details) = match &self {
            AppError::ValidationError(errors) => {
                let mut details: HashMap<String, Vec<String>> = HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages = field_errors
                        .iter()
                        .map(|e| {
                            let code = e.message.as_deref().unwrap_or(&*e.code);
                            store.translate(lang, &format!("validation.{code}"))
                        })
                        .collect();
                    details.insert(camel_case(&field), messages);
                }
                ("error.validation", Some(json!(details)))
            }
            AppError::MalformedBody(reason) => ("error.malformed_body", Some(json!({ "body": [reason] }))),
            AppError::InvalidStatusTransition { from, to } => (
                "error.invalid_transition",
                Some(json!({
                    "status": [store.translate(lang, "validation.invalid_transition")],
                    "from": from,
                    "to": to,
                })),
            ),
            AppError::EmailAlreadyExists => ("error.email_exists", None),
            AppError::InvalidCredentials => ("error.invalid_credentials", None),
            AppError::InvalidToken => ("error.invalid_token", None),
            AppError::Forbidden => ("error.forbidden", None),
            // Mesma mensagem: o cliente não distingue ausente de indisponível
            AppError::GarageNotFound | AppError::GarageUnavailable => ("error.garage_not_found", None),
            AppError::AppointmentNotFound => ("error.appointment_not_found", None),
            AppError::NoBillingAccount => ("error.no_billing_account", None),
            AppError::ManualActivationDisabled => ("error.manual_activation_disabled", None),
            AppError::InvalidWebhookSignature(reason) => {
                tracing::warn!(reason = %reason, "Webhook rejeitado");
                ("error.invalid_signature", None)
            }
            e => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                ("error.internal", None)
            }
        };

        ApiError {
            status,
            error: store.translate(lang, key),
            details,
        }
    }
}

// O erro que efetivamente sai pela API
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> I18nStore {
        I18nStore::load().unwrap()
    }

    fn en() -> Locale {
        Locale("en".into())
    }

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        assert_eq!(AppError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::GarageNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::GarageUnavailable.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::EmailAlreadyExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::field("status", "invalid_transition").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::InvalidWebhookSignature("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ExternalService("stripe down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unavailable_garage_is_indistinguishable_from_missing() {
        let a = AppError::GarageNotFound.to_api_error(&en(), &store());
        let b = AppError::GarageUnavailable.to_api_error(&en(), &store());
        assert_eq!(a.status, b.status);
        assert_eq!(a.error, b.error);
    }

    #[test]
    fn validation_details_are_listed_per_field_and_localised() {
        let api = AppError::field("appointmentDate", "invalid_date")
            .to_api_error(&Locale("pt".into()), &store());
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.error, "Um ou mais campos são inválidos.");
        let details = api.details.unwrap();
        assert_eq!(
            details["appointmentDate"][0],
            "Use uma data ISO 8601 (AAAA-MM-DD) ou timestamp."
        );
    }

    #[test]
    fn validator_field_names_come_out_in_camel_case() {
        use crate::models::appointment::RespondAppointmentPayload;
        use validator::Validate;

        let payload = RespondAppointmentPayload {
            cost_estimate: Some(rust_decimal::Decimal::new(-100, 2)),
            duration_days: Some(0),
            ..Default::default()
        };
        let errors = payload.validate().unwrap_err();
        let details = AppError::ValidationError(errors)
            .to_api_error(&en(), &store())
            .details
            .unwrap();

        assert!(details["costEstimate"].is_array());
        assert!(details["durationDays"].is_array());
        assert!(details.get("cost_estimate").is_none());
        assert!(details.get("duration_days").is_none());
    }

    #[test]
    fn camel_case_leaves_single_words_alone() {
        assert_eq!(camel_case("email"), "email");
        assert_eq!(camel_case("appointmentDate"), "appointmentDate");
        assert_eq!(camel_case("owner_notes"), "ownerNotes");
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let api = AppError::InternalServerError(anyhow::anyhow!("pool timed out"))
            .to_api_error(&en(), &store());
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.error, "An unexpected error occurred.");
        assert!(api.details.is_none());
    }
}
