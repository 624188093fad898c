use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
    response::Redirect,
};
use serde::{Deserialize, Serialize};

use super::auth::require_actor;
use super::{ApiError, AppState};

const CUSTOM_KEY_HEADER: &str = "URL-Name";

#[derive(Deserialize)]
pub struct ShortenRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Serialize)]
pub struct ShortenResponse {
    pub link: String,
    pub key: String,
}

/// POST /api/shorten
/// Shorten an http(s) URL. Admins may name the key with the URL-Name
/// header.
pub async fn shorten(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ShortenRequest>,
) -> Result<Json<ShortenResponse>, ApiError> {
    let actor = require_actor(&state, &headers).await?;

    if payload.url.is_empty() {
        return Err(ApiError::missing_fields("A URL is required.", vec!["url"]));
    }

    let custom_key = headers
        .get(CUSTOM_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    let created = state
        .registry
        .shorten_url(&actor, &payload.url, custom_key)
        .await?;

    Ok(Json(ShortenResponse {
        link: format!(
            "{}/u/{}",
            state.config.server.public_url, created.discriminator
        ),
        key: created.discriminator,
    }))
}

/// DELETE /api/delete/u/{key}
pub async fn delete_url(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = require_actor(&state, &headers).await?;

    state.registry.delete_url(&actor, &key).await?;

    Ok(Json(serde_json::json!({ "message": "URL deleted." })))
}

/// GET /u/{key}
/// See-other redirect to the stored target.
pub async fn follow(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Redirect, ApiError> {
    let url = state
        .registry
        .resolve_url(&key)
        .await
        .ok_or_else(|| ApiError::not_found("URL not found."))?;

    Ok(Redirect::to(&url.url))
}
