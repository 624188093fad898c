use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::models::User;
use crate::registry::OpError;

pub const AUTH_COOKIE: &str = "_auth_token";

#[derive(Deserialize)]
pub struct AuthenticateRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct CheckRequest {
    pub user_id: i32,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub display_name: String,
    pub admin: bool,
    pub api_token: String,
    pub created_at: String,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            admin: user.is_admin,
            api_token: user.api_token,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct MessageDto {
    pub id: i32,
    pub content: String,
    pub created_at: String,
}

// ============================================================================
// Actor resolution
// ============================================================================

/// The raw API token, taken from the Authorization header or the auth
/// cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
    {
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=')
            && name == AUTH_COOKIE
            && !value.is_empty()
        {
            return Some(value.to_string());
        }
    }

    None
}

/// Resolve the requesting user or fail the request.
pub async fn require_actor(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = extract_token(headers).ok_or(ApiError(OpError::Unauthenticated))?;

    state
        .registry
        .user_by_token(&token)
        .await
        .ok_or(ApiError(OpError::Unauthenticated))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/authenticate
/// Username + password login; responds with the user payload and sets the
/// auth cookie.
pub async fn authenticate(
    State(state): State<AppState>,
    Json(payload): Json<AuthenticateRequest>,
) -> Result<Response, ApiError> {
    let mut missing = Vec::new();
    if payload.username.is_empty() {
        missing.push("username");
    }
    if payload.password.is_empty() {
        missing.push("password");
    }
    if !missing.is_empty() {
        return Err(ApiError::missing_fields(
            "Username and password are required.",
            missing,
        ));
    }

    let user = state
        .registry
        .authenticate(&payload.username, &payload.password)
        .await?;

    let cookie = format!("{AUTH_COOKIE}={}; Path=/; HttpOnly", user.api_token);
    let mut response = Json(UserDto::from(user)).into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, cookie.parse().map_err(anyhow::Error::from)?);

    Ok(response)
}

/// POST /api/check
/// Verify a password against a known account without logging in.
pub async fn check(
    State(state): State<AppState>,
    Json(payload): Json<CheckRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.password.is_empty() {
        return Err(ApiError::missing_fields(
            "Password is required.",
            vec!["password"],
        ));
    }

    state
        .registry
        .check_password(payload.user_id, &payload.password)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Password correct." })))
}

/// GET /api/logout
/// Expire the auth cookie.
pub async fn logout() -> Result<Response, ApiError> {
    let cookie = format!("{AUTH_COOKIE}=; Path=/; Max-Age=0");
    let mut response = Json(serde_json::json!({ "message": "Logged out." })).into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, cookie.parse().map_err(anyhow::Error::from)?);

    Ok(response)
}

/// GET /api/messages
/// The requesting user's system messages, oldest first.
pub async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let actor = require_actor(&state, &headers).await?;

    let messages = state
        .registry
        .messages_for(actor.id)
        .await
        .into_iter()
        .map(|m| MessageDto {
            id: m.id,
            content: m.content,
            created_at: m.created_at,
        })
        .collect();

    Ok(Json(messages))
}
