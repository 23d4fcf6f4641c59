use crate::compression::{ArtifactProcessor, CompressionLevel, PdfArtifact};
use crate::error::ApiError;
use crate::models::{ArtifactRecord, UserAccount};
use crate::storage::CredentialStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// An uploaded file staged on disk under a unique name. The backing file is
/// removed exactly once, when the guard drops, on every exit path.
pub struct StagedFile {
    path: PathBuf,
    original_name: String,
    size: u64,
}

impl StagedFile {
    pub fn stage(dir: &Path, original_name: &str, bytes: &[u8]) -> Result<Self, ApiError> {
        fs::create_dir_all(dir)
            .map_err(|e| ApiError::Processing(format!("Failed to create staging dir: {e}")))?;

        // Unique suffix keeps concurrent uploads of the same filename apart.
        let file_name = format!("{}-{}", Uuid::new_v4(), sanitize_name(original_name));
        let path = dir.join(file_name);
        fs::write(&path, bytes)
            .map_err(|e| ApiError::Processing(format!("Failed to stage upload: {e}")))?;

        Ok(Self {
            path,
            original_name: original_name.to_string(),
            size: bytes.len() as u64,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to delete staged file");
            }
        }
    }
}

/// Keeps only the final path component so a crafted filename cannot escape
/// the staging directory.
fn sanitize_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string()
}

/// Drives one upload request: per-file validate and compress, fail-fast on
/// the first error, and persist results to the session's history in a single
/// store update when a session is present.
#[derive(Clone)]
pub struct UploadPipeline {
    processor: ArtifactProcessor,
    store: Arc<dyn CredentialStore>,
}

impl UploadPipeline {
    pub fn new(processor: ArtifactProcessor, store: Arc<dyn CredentialStore>) -> Self {
        Self { processor, store }
    }

    /// Processes files sequentially in input order. Any failure aborts the
    /// remaining batch and nothing is persisted; callers must treat the
    /// whole batch as failed.
    pub async fn process_images(
        &self,
        files: Vec<StagedFile>,
        level: CompressionLevel,
        session: Option<&UserAccount>,
    ) -> Result<Vec<ArtifactRecord>, ApiError> {
        if files.is_empty() {
            return Err(ApiError::Validation(
                "At least one image file is required".to_string(),
            ));
        }

        let mut records = Vec::with_capacity(files.len());
        for file in &files {
            let artifact = self
                .processor
                .process_image(file.path(), file.original_name(), level)
                .await?;
            records.push(ArtifactRecord::new(artifact.url));
        }

        if let Some(user) = session {
            let found = self
                .store
                .append_artifacts(&user.id, records.clone())
                .await
                .map_err(ApiError::from)?;
            if !found {
                return Err(ApiError::NotFound("User not found".to_string()));
            }
        }

        Ok(records)
    }

    /// Single-file PDF path. Returns the remote artifact together with the
    /// history record when a session was present.
    pub async fn process_pdf(
        &self,
        file: StagedFile,
        level: CompressionLevel,
        session: Option<&UserAccount>,
    ) -> Result<(PdfArtifact, u64, Option<ArtifactRecord>), ApiError> {
        let original_size = file.size();
        let artifact = self
            .processor
            .process_pdf(file.path(), file.original_name(), level)
            .await?;

        let record = if let Some(user) = session {
            let record = ArtifactRecord::new(artifact.url.clone());
            let found = self
                .store
                .append_artifacts(&user.id, vec![record.clone()])
                .await
                .map_err(ApiError::from)?;
            if !found {
                return Err(ApiError::NotFound("User not found".to_string()));
            }
            Some(record)
        } else {
            None
        };

        Ok((artifact, original_size, record))
    }
}
