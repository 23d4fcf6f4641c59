pub mod auth;
pub mod compression;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod upload_handlers;
pub mod user_handlers;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use auth::TokenService;
use config::Config;
use pipeline::UploadPipeline;
use storage::CredentialStore;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn CredentialStore>,
    pub tokens: TokenService,
    pub pipeline: UploadPipeline,
}

pub fn router(state: Arc<AppState>) -> Router {
    let origin = state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:5173"));
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/user/register", post(user_handlers::register))
        .route("/user/login", post(user_handlers::login))
        .route("/user/logout", post(user_handlers::logout))
        .route("/user/refresh-token", post(user_handlers::refresh_token))
        .route("/user/profile", get(user_handlers::profile))
        .route("/user/getlinks", get(user_handlers::get_links))
        .route("/user/links/:id", delete(user_handlers::delete_link))
        .route("/image/optimize-img", post(upload_handlers::optimize_img))
        .route("/pdf/compress-pdf", post(upload_handlers::compress_pdf))
        .layer(cors)
        .with_state(state)
}
