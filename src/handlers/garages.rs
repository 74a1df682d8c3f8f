// src/handlers/garages.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        auth::{AuthenticatedUser, MaybeUser},
        i18n::Locale,
        json::ValidJson,
        rbac::{OwnerOnly, RequireRole},
    },
    models::garage::{CreateGaragePayload, Garage, GarageFilter, GarageListing, UpdateGaragePayload},
};

// GET /api/garages
#[utoipa::path(
    get,
    path = "/api/garages",
    tag = "Garages",
    params(GarageFilter),
    responses(
        (status = 200, description = "Oficinas visíveis para quem pergunta", body = [GarageListing])
    ),
    security((), ("api_jwt" = []))
)]
pub async fn list_garages(
    State(app_state): State<AppState>,
    locale: Locale,
    user: MaybeUser,
    Query(filter): Query<GarageFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = user.caller();
    let garages = app_state
        .garage_service
        .list(caller.as_ref(), &filter)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(garages))
}

// GET /api/garages/{id}
#[utoipa::path(
    get,
    path = "/api/garages/{id}",
    tag = "Garages",
    params(("id" = Uuid, Path, description = "ID da oficina")),
    responses(
        (status = 200, description = "Oficina", body = GarageListing),
        (status = 404, description = "Inexistente ou fora do ar")
    ),
    security((), ("api_jwt" = []))
)]
pub async fn get_garage(
    State(app_state): State<AppState>,
    locale: Locale,
    user: MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = user.caller();
    let garage = app_state
        .garage_service
        .get(caller.as_ref(), id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(garage))
}

// POST /api/garages
#[utoipa::path(
    post,
    path = "/api/garages",
    tag = "Garages",
    request_body = CreateGaragePayload,
    responses(
        (status = 201, description = "Oficina criada (aguardando aprovação)", body = Garage),
        (status = 403, description = "Apenas donos de oficina")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_garage(
    State(app_state): State<AppState>,
    locale: Locale,
    RequireRole(user, _): RequireRole<OwnerOnly>,
    ValidJson(payload): ValidJson<CreateGaragePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let garage = app_state
        .garage_service
        .create(&user.caller(), payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(garage)))
}

// PUT /api/garages/{id}
#[utoipa::path(
    put,
    path = "/api/garages/{id}",
    tag = "Garages",
    params(("id" = Uuid, Path, description = "ID da oficina")),
    request_body = UpdateGaragePayload,
    responses(
        (status = 200, description = "Oficina atualizada", body = Garage),
        (status = 403, description = "Não é o dono"),
        (status = 404, description = "Oficina não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_garage(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<UpdateGaragePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let garage = app_state
        .garage_service
        .update(&user.caller(), id, payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(garage))
}

// DELETE /api/garages/{id}
#[utoipa::path(
    delete,
    path = "/api/garages/{id}",
    tag = "Garages",
    params(("id" = Uuid, Path, description = "ID da oficina")),
    responses(
        (status = 204, description = "Oficina e agendamentos removidos"),
        (status = 403, description = "Não é o dono"),
        (status = 404, description = "Oficina não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_garage(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    app_state
        .garage_service
        .delete(&user.caller(), id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(StatusCode::NO_CONTENT)
}
