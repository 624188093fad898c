use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};
use serde::Deserialize;

use super::auth::{UserDto, require_actor};
use super::{ApiError, AppState};
use crate::registry::{AdminChange, UserEdit};

#[derive(Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Deserialize)]
pub struct EditUserRequest {
    pub user_id: i32,
    #[serde(default)]
    pub new_values: NewValues,
}

#[derive(Deserialize, Default)]
pub struct NewValues {
    pub username: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub admin: Option<AdminField>,
}

/// The admin field accepts a boolean or the string `"toggle"`.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum AdminField {
    Flag(bool),
    Keyword(String),
}

#[derive(Deserialize)]
pub struct TargetRequest {
    pub user_id: i32,
}

fn admin_change(field: AdminField) -> Result<AdminChange, ApiError> {
    match field {
        AdminField::Flag(value) => Ok(AdminChange::Set(value)),
        AdminField::Keyword(word) if word == "toggle" => Ok(AdminChange::Toggle),
        AdminField::Keyword(word) => Err(ApiError::invalid(format!(
            "Unknown admin value: {word}"
        ))),
    }
}

/// PUT /api/user/new
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserDto>, ApiError> {
    let actor = require_actor(&state, &headers).await?;

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

    let display_name = payload
        .display_name
        .unwrap_or_else(|| payload.username.clone());

    let created = state
        .registry
        .create_user(
            &actor,
            &payload.username,
            &payload.password,
            &display_name,
            payload.admin,
        )
        .await?;

    Ok(Json(UserDto::from(created)))
}

/// PUT /api/user/edit
/// Fields absent from `new_values` keep their stored value.
pub async fn edit_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<EditUserRequest>,
) -> Result<Json<UserDto>, ApiError> {
    let actor = require_actor(&state, &headers).await?;

    let admin = payload.new_values.admin.map(admin_change).transpose()?;

    if let Some(username) = &payload.new_values.username
        && username.is_empty()
    {
        return Err(ApiError::invalid("Username cannot be empty."));
    }

    let edit = UserEdit {
        username: payload.new_values.username,
        password: payload.new_values.password,
        display_name: payload.new_values.display_name,
        admin,
    };

    let updated = state
        .registry
        .edit_user(&actor, payload.user_id, edit)
        .await?;

    Ok(Json(UserDto::from(updated)))
}

/// PUT /api/user/reset
pub async fn reset_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TargetRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = require_actor(&state, &headers).await?;

    let token = state.registry.reset_token(&actor, payload.user_id).await?;

    Ok(Json(serde_json::json!({ "api_token": token })))
}

/// DELETE /api/user/delete
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TargetRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = require_actor(&state, &headers).await?;

    state.registry.delete_user(&actor, payload.user_id).await?;

    Ok(Json(serde_json::json!({ "message": "User deleted." })))
}
