use crate::models::{ArtifactRecord, UserAccount};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Persistence seam for accounts and their artifact history. One concrete
/// implementation is selected at startup and injected into the app state.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_user(&self, user: UserAccount) -> Result<UserAccount>;
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>>;
    /// Looks up an account by email or username in one call (the login form
    /// accepts either).
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserAccount>>;
    async fn find_by_id(&self, id: &str) -> Result<Option<UserAccount>>;
    /// Overwrites the stored refresh material. Returns false when the
    /// account does not exist.
    async fn set_refresh_token(&self, user_id: &str, token: Option<String>) -> Result<bool>;
    /// Appends records to the account history in one update, preserving
    /// their order. Returns false when the account does not exist.
    async fn append_artifacts(&self, user_id: &str, records: Vec<ArtifactRecord>) -> Result<bool>;
    /// Returns the account history in insertion order, or None when the
    /// account does not exist.
    async fn list_artifacts(&self, user_id: &str) -> Result<Option<Vec<ArtifactRecord>>>;
    /// Removes one record. Returns false when no record with that id exists
    /// on the account (deletion is deliberately not idempotent upstream).
    async fn delete_artifact(&self, user_id: &str, artifact_id: &str) -> Result<bool>;
}

/// File-backed store: the full account list lives in memory behind an async
/// RwLock and is rewritten to disk on every mutation.
pub struct JsonCredentialStore {
    path: PathBuf,
    users: RwLock<Vec<UserAccount>>,
}

impl JsonCredentialStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let users = if path.exists() {
            let data = fs::read_to_string(&path).context("Failed to read users file")?;
            serde_json::from_str(&data).context("Failed to parse users file")?
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    fn save_to_disk(&self, users: &[UserAccount]) -> Result<()> {
        let json = serde_json::to_string_pretty(users).context("Failed to serialize users")?;
        fs::write(&self.path, json).context("Failed to write users file")?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for JsonCredentialStore {
    async fn create_user(&self, user: UserAccount) -> Result<UserAccount> {
        let mut users = self.users.write().await;

        if users
            .iter()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            bail!("Username or email already exists");
        }

        users.push(user.clone());
        self.save_to_disk(&users)?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserAccount>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.email == identifier || u.username == identifier)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserAccount>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn set_refresh_token(&self, user_id: &str, token: Option<String>) -> Result<bool> {
        let mut users = self.users.write().await;

        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            user.refresh_token = token;
            self.save_to_disk(&users)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn append_artifacts(&self, user_id: &str, records: Vec<ArtifactRecord>) -> Result<bool> {
        let mut users = self.users.write().await;

        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            user.compressed_files.extend(records);
            self.save_to_disk(&users)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_artifacts(&self, user_id: &str) -> Result<Option<Vec<ArtifactRecord>>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.compressed_files.clone()))
    }

    async fn delete_artifact(&self, user_id: &str, artifact_id: &str) -> Result<bool> {
        let mut users = self.users.write().await;

        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            let before = user.compressed_files.len();
            user.compressed_files.retain(|r| r.id != artifact_id);

            if user.compressed_files.len() < before {
                self.save_to_disk(&users)?;
                return Ok(true);
            }
        }

        Ok(false)
    }
}
