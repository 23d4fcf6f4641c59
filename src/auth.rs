use crate::config::Config;
use crate::error::ApiError;
use crate::models::UserAccount;
use crate::AppState;
use axum::async_trait;
use axum::extract::FromRef;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Processing(format!("Failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    bcrypt::verify(password, hash)
        .map_err(|e| ApiError::Processing(format!("Failed to verify password: {e}")))
}

/// Access-token claims carry display fields so authenticated requests do not
/// need a follow-up lookup just to render the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub exp: usize,
}

/// Refresh-token claims carry only the account reference. The `jti` keeps
/// two tokens minted in the same second distinct, so rotation always
/// invalidates the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub exp: usize,
}

/// Signs and verifies the two token classes, each with its own secret and
/// lifetime.
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_expiry: chrono::Duration,
    refresh_expiry: chrono::Duration,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_expiry: chrono::Duration::minutes(config.access_token_expiry_minutes),
            refresh_expiry: chrono::Duration::days(config.refresh_token_expiry_days),
        }
    }

    pub fn access_expiry_secs(&self) -> i64 {
        self.access_expiry.num_seconds()
    }

    pub fn refresh_expiry_secs(&self) -> i64 {
        self.refresh_expiry.num_seconds()
    }

    /// Issues a fresh access/refresh pair for the account. The caller is
    /// responsible for persisting the refresh token, overwriting any prior
    /// material.
    pub fn issue_pair(&self, user: &UserAccount) -> Result<(String, String), ApiError> {
        let now = chrono::Utc::now();

        let access = AccessClaims {
            sub: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            exp: (now + self.access_expiry).timestamp() as usize,
        };
        let refresh = RefreshClaims {
            sub: user.id.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            exp: (now + self.refresh_expiry).timestamp() as usize,
        };

        let access_token = encode(&Header::default(), &access, &self.access_encoding)
            .map_err(|e| ApiError::Processing(format!("Error generating tokens: {e}")))?;
        let refresh_token = encode(&Header::default(), &refresh, &self.refresh_encoding)
            .map_err(|e| ApiError::Processing(format!("Error generating tokens: {e}")))?;

        Ok((access_token, refresh_token))
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, ApiError> {
        decode::<AccessClaims>(token, &self.access_decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::Auth("Invalid access token".to_string()))
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, ApiError> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::Auth("Invalid refresh token".to_string()))
    }
}

/// Pulls the bearer token from the named cookie or the Authorization header.
pub fn bearer_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = cookie_value(headers, cookie_name) {
        return Some(token);
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Http-only session cookie, path `/`.
pub fn session_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!("{name}={value}; HttpOnly; Path=/; Max-Age={max_age_secs}")
}

pub fn clear_cookie(name: &str) -> String {
    format!("{name}=; HttpOnly; Path=/; Max-Age=0")
}

/// Mandatory authentication: rejects with 401 when the token is absent,
/// invalid, expired, or references an account that no longer exists.
pub struct Session(pub UserAccount);

/// Optional authentication: any of the failure cases above degrades to an
/// anonymous request instead of erroring.
pub struct OptionalSession(pub Option<UserAccount>);

async fn resolve_session<S>(parts: &Parts, state: &S) -> Result<UserAccount, ApiError>
where
    Arc<AppState>: FromRef<S>,
{
    let state = Arc::<AppState>::from_ref(state);

    let token = bearer_token(&parts.headers, ACCESS_COOKIE)
        .ok_or_else(|| ApiError::Auth("Unauthorized".to_string()))?;
    let claims = state.tokens.verify_access(&token)?;

    state
        .store
        .find_by_id(&claims.sub)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::Auth("Invalid access token".to_string()))
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve_session(parts, state).await.map(Session)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OptionalSession
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalSession(resolve_session(parts, state).await.ok()))
    }
}
