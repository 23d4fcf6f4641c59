use crate::auth::{
    self, clear_cookie, hash_password, session_cookie, verify_password, Session, ACCESS_COOKIE,
    REFRESH_COOKIE,
};
use crate::error::ApiError;
use crate::models::{
    LoginRequest, LoginResponse, PublicUser, RefreshRequest, RegisterRequest, UserAccount,
};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.trim();
    let username = payload.username.trim();
    let email = payload.email.trim();

    if name.is_empty() || username.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation("All fields are required.".to_string()));
    }

    if state
        .store
        .find_by_username(username)
        .await
        .map_err(ApiError::from)?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "Username is already registered.".to_string(),
        ));
    }
    if state
        .store
        .find_by_email(email)
        .await
        .map_err(ApiError::from)?
        .is_some()
    {
        return Err(ApiError::Conflict("Email is already registered.".to_string()));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .store
        .create_user(UserAccount::new(
            name.to_string(),
            username.to_string(),
            email.to_string(),
            password_hash,
        ))
        .await
        .map_err(ApiError::from)?;

    info!(username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "User registered successfully.",
            "user": PublicUser::from(&user),
        })),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = payload.email_or_username.trim();
    if identifier.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation(
            "Email or Username, Password are required".to_string(),
        ));
    }

    let user = state
        .store
        .find_by_identifier(identifier)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !verify_password(payload.password.trim(), &user.password_hash)? {
        return Err(ApiError::Auth("Invalid credentials".to_string()));
    }

    let (access_token, refresh_token) = state.tokens.issue_pair(&user)?;
    // Overwrites any previously stored refresh material.
    state
        .store
        .set_refresh_token(&user.id, Some(refresh_token.clone()))
        .await
        .map_err(ApiError::from)?;

    info!(username = %user.username, "User logged in");

    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            session_cookie(
                ACCESS_COOKIE,
                &access_token,
                state.tokens.access_expiry_secs(),
            ),
        ),
        (
            header::SET_COOKIE,
            session_cookie(
                REFRESH_COOKIE,
                &refresh_token,
                state.tokens.refresh_expiry_secs(),
            ),
        ),
    ]);

    Ok((
        StatusCode::OK,
        cookies,
        Json(json!({
            "success": true,
            "message": "User logged in successfully",
            "data": LoginResponse {
                user: PublicUser::from(&user),
                access_token,
                refresh_token,
            },
        })),
    ))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Session(user): Session,
) -> Result<impl IntoResponse, ApiError> {
    // Idempotent: clearing an already-cleared token is fine.
    state
        .store
        .set_refresh_token(&user.id, None)
        .await
        .map_err(ApiError::from)?;

    let cookies = AppendHeaders([
        (header::SET_COOKIE, clear_cookie(ACCESS_COOKIE)),
        (header::SET_COOKIE, clear_cookie(REFRESH_COOKIE)),
    ]);

    Ok((
        StatusCode::OK,
        cookies,
        Json(json!({
            "success": true,
            "message": "User logged out successfully",
        })),
    ))
}

/// Rotates the token pair when the presented refresh token matches the
/// stored material. The new refresh token replaces the old one, so a given
/// refresh token can be spent at most once.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let token = auth::cookie_value(&headers, REFRESH_COOKIE)
        .or_else(|| payload.and_then(|Json(p)| p.refresh_token))
        .ok_or_else(|| ApiError::Auth("Refresh token is required".to_string()))?;

    let claims = state.tokens.verify_refresh(&token)?;
    let user = state
        .store
        .find_by_id(&claims.sub)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::Auth("Invalid refresh token".to_string()))?;

    if user.refresh_token.as_deref() != Some(token.as_str()) {
        return Err(ApiError::Auth("Invalid refresh token".to_string()));
    }

    let (access_token, refresh_token) = state.tokens.issue_pair(&user)?;
    state
        .store
        .set_refresh_token(&user.id, Some(refresh_token.clone()))
        .await
        .map_err(ApiError::from)?;

    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            session_cookie(
                ACCESS_COOKIE,
                &access_token,
                state.tokens.access_expiry_secs(),
            ),
        ),
        (
            header::SET_COOKIE,
            session_cookie(
                REFRESH_COOKIE,
                &refresh_token,
                state.tokens.refresh_expiry_secs(),
            ),
        ),
    ]);

    Ok((
        StatusCode::OK,
        cookies,
        Json(json!({
            "success": true,
            "message": "Tokens refreshed successfully",
            "data": {
                "accessToken": access_token,
                "refreshToken": refresh_token,
            },
        })),
    ))
}

pub async fn profile(Session(user): Session) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "data": { "name": user.name },
    }))
}

pub async fn get_links(
    State(state): State<Arc<AppState>>,
    Session(user): Session,
) -> Result<impl IntoResponse, ApiError> {
    let links = state
        .store
        .list_artifacts(&user.id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "data": { "links": links },
    })))
}

pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Session(user): Session,
    Path(link_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Re-resolve the account: it may have vanished since authentication.
    if state
        .store
        .find_by_id(&user.id)
        .await
        .map_err(ApiError::from)?
        .is_none()
    {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let removed = state
        .store
        .delete_artifact(&user.id, &link_id)
        .await
        .map_err(ApiError::from)?;
    if !removed {
        // A second delete of the same id lands here; deletion is not
        // idempotent.
        return Err(ApiError::NotFound("Link not found".to_string()));
    }

    info!(username = %user.username, link_id = %link_id, "Link deleted");

    Ok(Json(json!({
        "success": true,
        "message": "Link deleted successfully",
    })))
}
