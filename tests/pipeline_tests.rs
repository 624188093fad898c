//! Permission precedence and the archive lifecycle, exercised through the
//! HTTP surface.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use hoard::config::Config;
use hoard::registry::UserEdit;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

const MASTER_TOKEN: &str = "hoard_default_master_token";

const BOUNDARY: &str = "test-boundary";

async fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.uploads.uploads_path = dir.path().join("uploads").display().to_string();
    config.uploads.archive_path = dir.path().join("archive").display().to_string();
    config.optimisation.compress = false;
    tweak(&mut config);

    let state = hoard::state::build_state(config)
        .await
        .expect("failed to build app state");

    (hoard::api::router(state), dir)
}

async fn spawn_app() -> (Router, tempfile::TempDir) {
    spawn_app_with(|_| {}).await
}

fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", token)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create an account through the API; returns (id, token).
async fn create_user(app: &Router, username: &str, admin: bool) -> (i64, String) {
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/user/new",
            MASTER_TOKEN,
            serde_json::json!({
                "username": username,
                "password": "password123",
                "admin": admin,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    (
        body["id"].as_i64().unwrap(),
        body["api_token"].as_str().unwrap().to_string(),
    )
}

async fn upload(app: &Router, token: &str, filename: &str, content: &[u8]) -> String {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header("Authorization", token)
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["key"].as_str().unwrap().to_string()
}

async fn serve_status(app: &Router, key: &str) -> StatusCode {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(format!("/{key}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_archive_and_restore_round_trip() {
    let (app, dir) = spawn_app().await;

    let key = upload(&app, MASTER_TOKEN, "keep.txt", b"precious bytes").await;
    assert_eq!(serve_status(&app, &key).await, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/delete/f/{key}"),
            MASTER_TOKEN,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["archived"], true);

    // Gone from the public surface, parked in the archive directory.
    assert_eq!(serve_status(&app, &key).await, StatusCode::NOT_FOUND);
    assert!(dir.path().join("archive").join(&key).exists());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/restore/f/{key}"),
            MASTER_TOKEN,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/{key}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"precious bytes");
}

#[tokio::test]
async fn test_hard_delete_when_archiving_disabled() {
    let (app, dir) = spawn_app_with(|c| c.uploads.archive_enabled = false).await;

    let key = upload(&app, MASTER_TOKEN, "gone.txt", b"bye").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/delete/f/{key}"),
            MASTER_TOKEN,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["archived"], false);

    assert_eq!(serve_status(&app, &key).await, StatusCode::NOT_FOUND);
    assert!(!dir.path().join("archive").join(&key).exists());
}

#[tokio::test]
async fn test_non_admin_cannot_touch_another_users_file() {
    let (app, _dir) = spawn_app().await;

    let (_, alice) = create_user(&app, "alice", false).await;
    let (_, bob) = create_user(&app, "bob", false).await;

    let key = upload(&app, &alice, "mine.txt", b"alice's").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/delete/f/{key}"),
            &bob,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The owner still can.
    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/delete/f/{key}"),
            &alice,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_peers_are_protected_from_each_other() {
    let (app, _dir) = spawn_app().await;

    let (_, admin_a) = create_user(&app, "admin_a", true).await;
    let (_, admin_b) = create_user(&app, "admin_b", true).await;

    let key = upload(&app, &admin_b, "peer.txt", b"admin b's file").await;

    // One admin cannot delete a fellow admin's file.
    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/delete/f/{key}"),
            &admin_a,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The superuser can.
    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/delete/f/{key}"),
            MASTER_TOKEN,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // And the mirror dropped it: a second delete finds nothing.
    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/delete/f/{key}"),
            MASTER_TOKEN,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_restore_is_admin_only() {
    let (app, _dir) = spawn_app().await;

    let (_, alice) = create_user(&app, "alice", false).await;

    let key = upload(&app, &alice, "mine.txt", b"data").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/delete/f/{key}"),
            &alice,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The owner cannot restore their own archived file.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/restore/f/{key}"),
            &alice,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/restore/f/{key}"),
            MASTER_TOKEN,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_self_edit_allowed_cross_edit_forbidden() {
    let (app, _dir) = spawn_app().await;

    let (alice_id, alice) = create_user(&app, "alice", false).await;
    let (bob_id, bob) = create_user(&app, "bob", false).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/user/edit",
            &alice,
            serde_json::json!({
                "user_id": alice_id,
                "new_values": { "display_name": "Alice in Chains" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["display_name"], "Alice in Chains");

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/user/edit",
            &bob,
            serde_json::json!({
                "user_id": alice_id,
                "new_values": { "display_name": "gotcha" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let _ = bob_id;
}

#[tokio::test]
async fn test_admin_flag_is_superuser_only() {
    let (app, _dir) = spawn_app().await;

    let (alice_id, _) = create_user(&app, "alice", false).await;
    let (_, admin) = create_user(&app, "staff", true).await;

    // A plain admin cannot grant the flag.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/user/edit",
            &admin,
            serde_json::json!({
                "user_id": alice_id,
                "new_values": { "admin": true },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The superuser can, including via toggle.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/user/edit",
            MASTER_TOKEN,
            serde_json::json!({
                "user_id": alice_id,
                "new_values": { "admin": "toggle" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["admin"], true);
}

#[tokio::test]
async fn test_token_reset_invalidates_old_token() {
    let (app, _dir) = spawn_app().await;

    let (alice_id, alice) = create_user(&app, "alice", false).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/user/reset",
            &alice,
            serde_json::json!({ "user_id": alice_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let new_token = body_json(response).await["api_token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(new_token, alice);

    // The old token no longer resolves an actor.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/messages")
                .header("Authorization", &alice)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/messages")
                .header("Authorization", &new_token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_superuser_can_edit_itself_and_reset_its_token() {
    let (app, _dir) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/user/edit",
            MASTER_TOKEN,
            serde_json::json!({
                "user_id": 0,
                "new_values": { "display_name": "Overlord" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["display_name"], "Overlord");

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/user/reset",
            MASTER_TOKEN,
            serde_json::json!({ "user_id": 0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let new_token = body_json(response).await["api_token"]
        .as_str()
        .unwrap()
        .to_string();

    // The configured token is dead, the minted one resolves the actor.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/messages")
                .header("Authorization", MASTER_TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/messages")
                .header("Authorization", &new_token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_edits_keep_both_fields() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.uploads.uploads_path = dir.path().join("uploads").display().to_string();
    config.uploads.archive_path = dir.path().join("archive").display().to_string();

    let state = hoard::state::build_state(config)
        .await
        .expect("failed to build app state");

    let root = state.registry.user_by_token(MASTER_TOKEN).await.unwrap();
    let carol = state
        .registry
        .create_user(&root, "carol", "password123", "Carol", false)
        .await
        .unwrap();

    let rename = state.registry.edit_user(
        &root,
        carol.id,
        UserEdit {
            username: Some("carol2".to_string()),
            ..UserEdit::default()
        },
    );
    let relabel = state.registry.edit_user(
        &root,
        carol.id,
        UserEdit {
            display_name: Some("Carol Two".to_string()),
            ..UserEdit::default()
        },
    );

    let (rename, relabel) = tokio::join!(rename, relabel);
    rename.unwrap();
    relabel.unwrap();

    // Neither edit may revert the other's field, whichever ran second.
    let after = state.registry.user_by_id(carol.id).await.unwrap();
    assert_eq!(after.username, "carol2");
    assert_eq!(after.display_name, "Carol Two");
}

#[tokio::test]
async fn test_superuser_cannot_be_deleted() {
    let (app, _dir) = spawn_app().await;

    let (_, admin) = create_user(&app, "staff", true).await;

    for token in [MASTER_TOKEN, admin.as_str()] {
        let response = app
            .clone()
            .oneshot(json_request(
                "DELETE",
                "/api/user/delete",
                token,
                serde_json::json!({ "user_id": 0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn test_forced_delete_leaves_a_system_message() {
    let (app, _dir) = spawn_app().await;

    let (_, alice) = create_user(&app, "alice", false).await;
    let key = upload(&app, &alice, "mine.txt", b"data").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/delete/f/{key}"),
            MASTER_TOKEN,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/messages")
                .header("Authorization", &alice)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let messages = body_json(response).await;
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(
        messages[0]["content"]
            .as_str()
            .unwrap()
            .contains(&key)
    );
}
