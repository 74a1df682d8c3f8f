// src/services/upload_service.rs

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{multipart, Client};
use serde::Deserialize;

use crate::{common::error::AppError, config::CloudinarySettings};

const UPLOAD_FOLDER: &str = "garage-marketplace";

/// Arquivo recebido pelo endpoint de upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct CloudinaryResponse {
    secure_url: String,
}

/// Embute o arquivo na própria URL. Só serve para desenvolvimento.
pub fn data_uri(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{content_type};base64,{}", STANDARD.encode(bytes))
}

#[derive(Clone)]
pub struct UploadService {
    client: Client,
    cloudinary: Option<CloudinarySettings>,
}

impl UploadService {
    pub fn new(client: Client, cloudinary: Option<CloudinarySettings>) -> Self {
        Self { client, cloudinary }
    }

    pub async fn store(&self, file: UploadedFile) -> Result<String, AppError> {
        let Some(cloudinary) = &self.cloudinary else {
            tracing::warn!(
                file_name = %file.file_name,
                size = file.bytes.len(),
                "Armazenamento externo não configurado: devolvendo data URI"
            );
            return Ok(data_uri(&file.content_type, &file.bytes));
        };

        let url = format!("https://api.cloudinary.com/v1_1/{}/auto/upload", cloudinary.cloud_name);
        let size = file.bytes.len();

        let part = multipart::Part::bytes(file.bytes)
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| AppError::MalformedBody(e.to_string()))?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("upload_preset", cloudinary.upload_preset.clone())
            .text("folder", UPLOAD_FOLDER);

        let response = self.client.post(&url).multipart(form).send().await.map_err(|e| {
            tracing::error!(error = %e, "Falha no envio ao Cloudinary");
            AppError::ExternalService(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "Cloudinary recusou o upload");
            return Err(AppError::ExternalService(format!("Cloudinary error: {status}")));
        }

        let uploaded: CloudinaryResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        tracing::info!(file_name = %file.file_name, size, "Arquivo enviado");
        Ok(uploaded.secure_url)
    }
}
