use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::registry::Registry;

pub mod auth;
mod error;
mod uploads;
mod urls;
mod users;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,

    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    // Multipart framing adds overhead on top of the configured file cap.
    let body_limit =
        usize::try_from((state.config.uploads.max_file_size_mb + 1) * 1024 * 1024)
            .unwrap_or(usize::MAX);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .route("/api/authenticate", post(auth::authenticate))
        .route("/api/check", post(auth::check))
        .route("/api/logout", get(auth::logout))
        .route("/api/messages", get(auth::messages))
        .route("/api/upload", post(uploads::upload))
        .route(
            "/api/delete/f/{key}",
            delete(uploads::delete_file).post(uploads::delete_file),
        )
        .route("/api/restore/f/{key}", post(uploads::restore_file))
        .route("/api/shorten", post(urls::shorten))
        .route(
            "/api/delete/u/{key}",
            delete(urls::delete_url).post(urls::delete_url),
        )
        .route(
            "/api/user/new",
            put(users::create_user).post(users::create_user),
        )
        .route(
            "/api/user/edit",
            put(users::edit_user).post(users::edit_user),
        )
        .route(
            "/api/user/reset",
            put(users::reset_token).post(users::reset_token),
        )
        .route(
            "/api/user/delete",
            delete(users::delete_user).post(users::delete_user),
        )
        .route("/u/{key}", get(urls::follow))
        .route("/f/{key}", get(uploads::serve_content))
        .route("/i/{key}", get(uploads::serve_content))
        .route("/{key}", get(uploads::serve_content))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
