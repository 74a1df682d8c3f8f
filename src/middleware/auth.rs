// src/middleware/auth.rs

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{
    common::{
        error::{ApiError, AppError},
        policy::Caller,
    },
    config::AppState,
    middleware::i18n::Locale,
    models::auth::Account,
};

/// Resolve o bearer token em uma conta. Sem header ou token inválido: `InvalidToken`.
async fn resolve_bearer(app_state: &AppState, parts: &mut Parts) -> Result<Account, AppError> {
    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|_| AppError::InvalidToken)?;

    app_state.auth_service.validate_token(bearer.token()).await
}

// O middleware das rotas protegidas
pub async fn auth_guard(
    State(app_state): State<AppState>,
    locale: Locale,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();

    let account = resolve_bearer(&app_state, &mut parts)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tracing::debug!(account_id = %account.id, role = %account.role, "Requisição autenticada");

    // Insere a conta nos "extensions" da requisição
    parts.extensions.insert(AuthenticatedUser(account));
    Ok(next.run(Request::from_parts(parts, body)).await)
}

// Extrator para obter a conta autenticada diretamente nos handlers
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Account);

impl AuthenticatedUser {
    pub fn caller(&self) -> Caller {
        Caller::from(&self.0)
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        // Rotas sem o `auth_guard` (ex.: escrita em /garages, que também tem GET público)
        let app_state = AppState::from_ref(state);
        let locale = Locale::from_request_parts(parts, state).await.unwrap_or_default();
        let account = resolve_bearer(&app_state, parts)
            .await
            .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

        Ok(AuthenticatedUser(account))
    }
}

// Autenticação opcional (rotas públicas que mudam de comportamento por papel)
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Account>);

impl MaybeUser {
    pub fn caller(&self) -> Option<Caller> {
        self.0.as_ref().map(Caller::from)
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(header::AUTHORIZATION) {
            return Ok(MaybeUser(None));
        }

        // Credencial enviada mas inválida continua sendo 401
        let app_state = AppState::from_ref(state);
        let locale = Locale::from_request_parts(parts, state).await.unwrap_or_default();
        let account = resolve_bearer(&app_state, parts)
            .await
            .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

        Ok(MaybeUser(Some(account)))
    }
}
