use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::auth::require_actor;
use super::{ApiError, AppState};
use crate::image;
use crate::registry::FileDeletion;

const BYPASS_HEADER: &str = "Compression-Bypass";

#[derive(Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub key: String,
    pub file_type: String,
}

/// POST /api/upload
/// Multipart upload; the file travels in the `upload` field.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let actor = require_actor(&state, &headers).await?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("upload") {
            continue;
        }

        let filename = field
            .file_name()
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::invalid("The upload field needs a filename."))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::invalid(format!("Failed to read upload: {e}")))?;

        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(ApiError::missing_fields(
            "No file was provided.",
            vec!["upload"],
        ));
    };

    let max_bytes = state.config.uploads.max_file_size_mb * 1024 * 1024;
    if bytes.len() as u64 > max_bytes {
        return Err(ApiError::invalid("That file is too large."));
    }

    let (file, file_type) = state.registry.create_file(&actor, &filename, &bytes).await?;

    if file_type == "image"
        && state.config.optimisation.compress
        && !image::bypass_optimise(
            headers.contains_key(BYPASS_HEADER),
            &actor,
            &state.config.optimisation,
        )
    {
        image::optimise_in_place(
            state.registry.content().upload_path(&file.discriminator),
            state.config.optimisation.quality,
        )
        .await;
    }

    Ok(Json(UploadResponse {
        url: format!(
            "{}/{}",
            state.config.server.public_url, file.discriminator
        ),
        key: file.discriminator,
        file_type,
    }))
}

/// DELETE /api/delete/f/{key}
pub async fn delete_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = require_actor(&state, &headers).await?;

    let outcome = state.registry.delete_file(&actor, &key).await?;

    let message = match outcome {
        FileDeletion::Archived => "File archived.",
        FileDeletion::Removed => "File deleted.",
    };

    Ok(Json(serde_json::json!({
        "message": message,
        "archived": outcome == FileDeletion::Archived,
    })))
}

/// POST /api/restore/f/{key}
pub async fn restore_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = require_actor(&state, &headers).await?;

    let file = state.registry.restore_file(&actor, &key).await?;

    Ok(Json(serde_json::json!({
        "message": "File restored.",
        "key": file.discriminator,
    })))
}

/// GET /{key}, /f/{key}, /i/{key}
/// Raw content bytes with a guessed MIME type.
pub async fn serve_content(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let file = state
        .registry
        .live_file(&key)
        .await
        .ok_or_else(|| ApiError::not_found("File not found."))?;

    let bytes = state
        .registry
        .content()
        .read(&file.discriminator)
        .await
        .ok_or_else(|| ApiError::not_found("File not found."))?;

    let mime = mime_guess::from_path(&file.discriminator).first_or_octet_stream();

    Ok((
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        bytes,
    )
        .into_response())
}
