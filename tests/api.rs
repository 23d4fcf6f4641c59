use anyhow::bail;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use compression_service::auth::TokenService;
use compression_service::compression::{
    ArtifactProcessor, CompressionBackend, CompressionLevel, ImageArtifact, PdfArtifact,
};
use compression_service::config::Config;
use compression_service::pipeline::UploadPipeline;
use compression_service::storage::{CredentialStore, JsonCredentialStore};
use compression_service::{router, AppState};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct StubBackend;

#[async_trait]
impl CompressionBackend for StubBackend {
    async fn compress_image(
        &self,
        source: &Path,
        _level: CompressionLevel,
    ) -> anyhow::Result<ImageArtifact> {
        if !source.exists() {
            bail!("staged file missing");
        }
        Ok(ImageArtifact {
            url: format!("out/compressed-{}", source.file_name().unwrap().to_string_lossy()),
        })
    }

    async fn compress_pdf(
        &self,
        _source: &Path,
        _original_name: &str,
        _level: CompressionLevel,
    ) -> anyhow::Result<PdfArtifact> {
        Ok(PdfArtifact {
            url: "https://cdn.example/compressed.pdf".to_string(),
            compressed_size: 1024,
            page_count: 5,
        })
    }
}

struct TestApp {
    app: Router,
    store: Arc<JsonCredentialStore>,
    dir: TempDir,
}

fn test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = Config {
        bind_addr: "127.0.0.1:0".to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        temp_dir: dir.path().join("temp"),
        output_dir: dir.path().join("out"),
        users_file: dir.path().join("users.json"),
        access_token_secret: "test-access".to_string(),
        refresh_token_secret: "test-refresh".to_string(),
        access_token_expiry_minutes: 60,
        refresh_token_expiry_days: 10,
        pdf_api_url: "http://localhost:1".to_string(),
        pdf_api_key: String::new(),
        remote_timeout_secs: 5,
    };

    let store = Arc::new(JsonCredentialStore::new(config.users_file.clone()).unwrap());
    let processor = ArtifactProcessor::new(Arc::new(StubBackend));
    let pipeline = UploadPipeline::new(processor, store.clone());
    let tokens = TokenService::new(&config);

    let state = Arc::new(AppState {
        config,
        store: store.clone(),
        tokens,
        pipeline,
    });

    TestApp {
        app: router(state),
        store,
        dir,
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const BOUNDARY: &str = "XTESTBOUNDARYX";

fn multipart_body(files: &[(&str, &str, &[u8])], level: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, filename, bytes) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(level) = level {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"compressionLevel\"\r\n\r\n",
        );
        body.extend_from_slice(level.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, body: Vec<u8>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn register(app: &Router, username: &str, email: &str) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/user/register",
            json!({
                "name": "A",
                "username": username,
                "email": email,
                "password": "p",
            }),
        ))
        .await
        .unwrap()
}

async fn login(app: &Router, identity: &str, password: &str) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/user/login",
            json!({ "emailOrUsername": identity, "password": password }),
        ))
        .await
        .unwrap()
}

/// Registers and logs in, returning (access token, refresh token, user id).
async fn authed_user(test: &TestApp) -> (String, String, String) {
    let response = register(&test.app, "a1", "a@x.com").await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = login(&test.app, "a1", "p").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    (
        body["data"]["accessToken"].as_str().unwrap().to_string(),
        body["data"]["refreshToken"].as_str().unwrap().to_string(),
        body["data"]["user"]["id"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn duplicate_username_is_rejected_with_conflict_message() {
    let test = test_app();

    let response = register(&test.app, "a1", "a@x.com").await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = register(&test.app, "a1", "b@x.com").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Username is already registered.");

    let response = register(&test.app, "a2", "a@x.com").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Email is already registered.");
}

#[tokio::test]
async fn registration_requires_all_fields() {
    let test = test_app();
    let response = test
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/user/register",
            json!({ "name": "", "username": "a1", "email": "a@x.com", "password": "p" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_password_yields_401_and_no_tokens() {
    let test = test_app();
    register(&test.app, "a1", "a@x.com").await;

    let response = login(&test.app, "a1", "wrong").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn unknown_identity_yields_404() {
    let test = test_app();
    let response = login(&test.app, "ghost", "p").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_sets_both_session_cookies_and_rotates_refresh_material() {
    let test = test_app();
    register(&test.app, "a1", "a@x.com").await;

    let response = login(&test.app, "a@x.com", "p").await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")));
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));

    let first = response_json(response).await["data"]["refreshToken"]
        .as_str()
        .unwrap()
        .to_string();

    // A second login overwrites the stored refresh material.
    let response = login(&test.app, "a@x.com", "p").await;
    let second = response_json(response).await["data"]["refreshToken"]
        .as_str()
        .unwrap()
        .to_string();

    let user = test.store.find_by_identifier("a1").await.unwrap().unwrap();
    assert_eq!(user.refresh_token.as_deref(), Some(second.as_str()));
    assert_ne!(user.refresh_token.as_deref(), Some(first.as_str()));
}

#[tokio::test]
async fn profile_requires_a_valid_token() {
    let test = test_app();
    let (access, _, _) = authed_user(&test).await;

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/user/profile")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/user/profile")
                .header(header::AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["name"], "A");
}

#[tokio::test]
async fn authenticated_upload_appends_history_then_delete_is_not_idempotent() {
    let test = test_app();
    let (access, _, _) = authed_user(&test).await;

    let body = multipart_body(&[("image", "photo.png", b"png-bytes")], Some("high"));
    let response = test
        .app
        .clone()
        .oneshot(multipart_request("/image/optimize-img", body, Some(&access)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let uploaded_id = body["data"]["links"][0]["id"].as_str().unwrap().to_string();
    assert!(body["data"]["links"][0]["compressedAt"].is_string());

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/user/getlinks")
                .header(header::AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response_json(response).await;
    let links = body["data"]["links"].as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["id"], uploaded_id.as_str());

    let delete_req = |id: &str, token: &str| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/user/links/{id}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = test
        .app
        .clone()
        .oneshot(delete_req(&uploaded_id, &access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second delete of the same id fails: deletion is not idempotent.
    let response = test
        .app
        .clone()
        .oneshot(delete_req(&uploaded_id, &access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_upload_succeeds_without_persisting_anywhere() {
    let test = test_app();
    let (_, _, user_id) = authed_user(&test).await;

    let body = multipart_body(&[("image", "photo.jpg", b"jpg-bytes")], None);
    let response = test
        .app
        .clone()
        .oneshot(multipart_request("/image/optimize-img", body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["links"].as_array().unwrap().len(), 1);

    let history = test.store.list_artifacts(&user_id).await.unwrap().unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn unsupported_extension_is_rejected_and_staging_is_clean() {
    let test = test_app();
    let (access, _, user_id) = authed_user(&test).await;

    let body = multipart_body(&[("image", "payload.exe", b"MZ")], Some("high"));
    let response = test
        .app
        .clone()
        .oneshot(multipart_request("/image/optimize-img", body, Some(&access)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let history = test.store.list_artifacts(&user_id).await.unwrap().unwrap();
    assert!(history.is_empty());

    // No staged file left behind.
    let staging = test.dir.path().join("temp");
    let leftover = std::fs::read_dir(&staging)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn batch_upload_produces_one_record_per_file_in_order() {
    let test = test_app();

    let body = multipart_body(
        &[
            ("image", "one.png", b"1"),
            ("image", "two.webp", b"2"),
            ("image", "three.jpeg", b"3"),
        ],
        Some("low"),
    );
    let response = test
        .app
        .clone()
        .oneshot(multipart_request("/image/optimize-img", body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let links = body["data"]["links"].as_array().unwrap();
    assert_eq!(links.len(), 3);
    assert!(links[0]["url"].as_str().unwrap().contains("one.png"));
    assert!(links[2]["url"].as_str().unwrap().contains("three.jpeg"));
}

#[tokio::test]
async fn empty_multipart_is_a_validation_error() {
    let test = test_app();
    let body = multipart_body(&[], Some("high"));
    let response = test
        .app
        .clone()
        .oneshot(multipart_request("/image/optimize-img", body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pdf_upload_reports_sizes_and_page_count() {
    let test = test_app();

    let body = multipart_body(&[("file", "doc.pdf", b"%PDF-1.4 content")], Some("high"));
    let response = test
        .app
        .clone()
        .oneshot(multipart_request("/pdf/compress-pdf", body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(
        body["data"]["compressedPdfUrl"],
        "https://cdn.example/compressed.pdf"
    );
    assert_eq!(body["data"]["originalFileSize"], 16);
    assert_eq!(body["data"]["compressedFileSize"], 1024);
    assert_eq!(body["data"]["pageCount"], 5);
}

#[tokio::test]
async fn garbage_token_on_optional_route_degrades_to_anonymous() {
    let test = test_app();

    let body = multipart_body(&[("image", "pic.png", b"bytes")], None);
    let response = test
        .app
        .clone()
        .oneshot(multipart_request(
            "/image/optimize-img",
            body,
            Some("not-a-jwt"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_clears_refresh_material_and_is_idempotent() {
    let test = test_app();
    let (access, _, user_id) = authed_user(&test).await;

    let logout_req = |token: &str| {
        Request::builder()
            .method("POST")
            .uri("/user/logout")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = test.app.clone().oneshot(logout_req(&access)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookies: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.contains("accessToken=;")));

    let user = test.store.find_by_id(&user_id).await.unwrap().unwrap();
    assert!(user.refresh_token.is_none());

    // Logging out again with a still-valid access token is not an error.
    let response = test.app.clone().oneshot(logout_req(&access)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_rotates_the_pair_and_spends_the_old_token() {
    let test = test_app();
    let (_, refresh, _) = authed_user(&test).await;

    let refresh_req = |token: &str| {
        json_request(
            "POST",
            "/user/refresh-token",
            json!({ "refreshToken": token }),
        )
    };

    let response = test.app.clone().oneshot(refresh_req(&refresh)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let new_refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, refresh);

    // The old refresh token no longer matches the stored material.
    let response = test.app.clone().oneshot(refresh_req(&refresh)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = test
        .app
        .clone()
        .oneshot(refresh_req(&new_refresh))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
