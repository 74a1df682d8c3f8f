// src/handlers/admin.rs

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        i18n::Locale,
        json::ValidJson,
        rbac::{AdminOnly, RequireRole},
    },
    models::{
        admin::AdminStats,
        garage::{ApprovalPayload, Garage, GarageListing},
    },
};

// GET /api/admin/garages
#[utoipa::path(
    get,
    path = "/api/admin/garages",
    tag = "Admin",
    responses(
        (status = 200, description = "Todas as oficinas, com dono e contagem de agendamentos", body = [GarageListing]),
        (status = 403, description = "Apenas ADMIN")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_all_garages(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(admin, _): RequireRole<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let garages = app_state
        .garage_service
        .list_all(&admin.caller())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(garages))
}

// PATCH /api/admin/garages/{id}
#[utoipa::path(
    patch,
    path = "/api/admin/garages/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "ID da oficina")),
    request_body = ApprovalPayload,
    responses(
        (status = 200, description = "Aprovação alterada", body = Garage),
        (status = 403, description = "Apenas ADMIN"),
        (status = 404, description = "Oficina não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn set_garage_approval(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(admin, _): RequireRole<AdminOnly>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<ApprovalPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let garage = app_state
        .garage_service
        .set_approval(&admin.caller(), id, payload.is_approved)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(garage))
}

// GET /api/admin/stats
#[utoipa::path(
    get,
    path = "/api/admin/stats",
    tag = "Admin",
    responses(
        (status = 200, description = "Indicadores da plataforma", body = AdminStats),
        (status = 403, description = "Apenas ADMIN")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_stats(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(admin, _): RequireRole<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = app_state
        .admin_service
        .stats(&admin.caller())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(stats))
}
