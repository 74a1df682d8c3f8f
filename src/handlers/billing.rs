// src/handlers/billing.rs

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{auth::AuthenticatedUser, i18n::Locale, json::ValidJson},
    models::billing::{
        ActivateSubscriptionPayload, ActivationResponse, CheckoutPayload, CheckoutSessionResponse,
        PortalPayload, RedirectResponse, WebhookAck,
    },
};

const SIGNATURE_HEADER: &str = "stripe-signature";

// POST /api/billing/checkout-session
#[utoipa::path(
    post,
    path = "/api/billing/checkout-session",
    tag = "Billing",
    request_body = CheckoutPayload,
    responses(
        (status = 200, description = "Sessão de checkout criada", body = CheckoutSessionResponse),
        (status = 403, description = "Não é o dono da oficina"),
        (status = 404, description = "Oficina não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_checkout_session(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(account): AuthenticatedUser,
    ValidJson(payload): ValidJson<CheckoutPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let session = app_state
        .billing_service
        .create_checkout_session(&account, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(session))
}

// POST /api/billing/portal-session
#[utoipa::path(
    post,
    path = "/api/billing/portal-session",
    tag = "Billing",
    request_body = PortalPayload,
    responses(
        (status = 200, description = "URL do portal de cobrança", body = RedirectResponse),
        (status = 400, description = "Oficina sem assinatura"),
        (status = 403, description = "Não é o dono da oficina")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_portal_session(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    ValidJson(payload): ValidJson<PortalPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let url = app_state
        .billing_service
        .create_portal_session(&user.caller(), &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(RedirectResponse { url }))
}

// POST /api/billing/activate
#[utoipa::path(
    post,
    path = "/api/billing/activate",
    tag = "Billing",
    request_body = ActivateSubscriptionPayload,
    responses(
        (status = 200, description = "Assinatura ativada sem pagamento", body = ActivationResponse),
        (status = 403, description = "Ativação manual desligada ou sem acesso à oficina")
    ),
    security(("api_jwt" = []))
)]
pub async fn activate_subscription(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    ValidJson(payload): ValidJson<ActivateSubscriptionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let garage = app_state
        .billing_service
        .activate_manually(&user.caller(), &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(ActivationResponse { garage }))
}

// POST /api/billing/webhook
// O corpo precisa chegar intacto: a assinatura é calculada sobre os bytes
#[utoipa::path(
    post,
    path = "/api/billing/webhook",
    tag = "Billing",
    request_body(content = String, description = "Evento do Stripe (JSON bruto)", content_type = "application/json"),
    params(("Stripe-Signature" = String, Header, description = "t=<timestamp>,v1=<assinatura>")),
    responses(
        (status = 200, description = "Evento recebido", body = WebhookAck),
        (status = 400, description = "Assinatura inválida")
    )
)]
pub async fn stripe_webhook(
    State(app_state): State<AppState>,
    locale: Locale,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    app_state
        .billing_service
        .handle_webhook(&body, signature)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(WebhookAck { received: true }))
}
