// src/middleware/json.rs

use axum::{
    extract::{FromRef, FromRequest, FromRequestParts, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
};

/// `Json<T>` + `validate()`. JSON malformado vira 400 no formato padrão de erro
/// (o `Json` do axum responderia 422 em texto puro).
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();
        let locale = Locale::from_request_parts(&mut parts, state).await.unwrap_or_default();
        let app_state = AppState::from_ref(state);
        let req = Request::from_parts(parts, body);

        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                AppError::MalformedBody(rejection.body_text()).to_api_error(&locale, &app_state.i18n_store)
            })?;

        value
            .validate()
            .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

        Ok(ValidJson(value))
    }
}
