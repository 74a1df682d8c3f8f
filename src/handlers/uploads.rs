// src/handlers/uploads.rs

use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    Json,
};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{auth::AuthenticatedUser, i18n::Locale},
    models::billing::RedirectResponse,
    services::upload_service::UploadedFile,
};

/// Lê o campo `file` do formulário multipart.
async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::MalformedBody(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::MalformedBody(e.body_text()))?;

        if bytes.is_empty() {
            break;
        }

        return Ok(UploadedFile { file_name, content_type, bytes: bytes.to_vec() });
    }

    Err(AppError::field("file", "file_required"))
}

// POST /api/uploads
#[utoipa::path(
    post,
    path = "/api/uploads",
    tag = "Uploads",
    request_body(content = String, description = "Formulário multipart com o campo `file`", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "URL do arquivo armazenado", body = RedirectResponse),
        (status = 400, description = "Campo `file` ausente")
    ),
    security(("api_jwt" = []))
)]
pub async fn upload_file(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let file = read_file_field(multipart)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tracing::debug!(account_id = %user.0.id, file_name = %file.file_name, "Upload recebido");

    let url = app_state
        .upload_service
        .store(file)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(RedirectResponse { url }))
}
