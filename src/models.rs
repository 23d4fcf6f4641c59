use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    /// Most recently issued refresh token; overwritten on every login or
    /// refresh, cleared on logout.
    pub refresh_token: Option<String>,
    /// Append-only history of produced artifacts, in production order.
    #[serde(default)]
    pub compressed_files: Vec<ArtifactRecord>,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(name: String, username: String, email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            username,
            email,
            password_hash,
            refresh_token: None,
            compressed_files: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// One compressed output, as stored on the owning account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: String,
    pub url: String,
    #[serde(rename = "compressedAt")]
    pub compressed_at: DateTime<Utc>,
}

impl ArtifactRecord {
    pub fn new(url: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url,
            compressed_at: Utc::now(),
        }
    }
}

/// Account fields safe to return to clients. The password hash never leaves
/// the store in any response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
}

impl From<&UserAccount> for PublicUser {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "emailOrUsername")]
    pub email_or_username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: PublicUser,
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
}
