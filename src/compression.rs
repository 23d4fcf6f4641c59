use crate::error::ApiError;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub const VALID_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Requested compression strength. Unrecognized input falls back to medium
/// rather than failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionLevel {
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(|p| p.trim().to_lowercase()).as_deref() {
            Some("low") => CompressionLevel::Low,
            Some("high") => CompressionLevel::High,
            _ => CompressionLevel::Medium,
        }
    }

    pub fn image_params(self) -> ImageParams {
        match self {
            CompressionLevel::Low => ImageParams {
                resize_width: 3600,
                quality: 90,
            },
            CompressionLevel::Medium => ImageParams {
                resize_width: 2400,
                quality: 80,
            },
            CompressionLevel::High => ImageParams {
                resize_width: 1600,
                quality: 70,
            },
        }
    }

    pub fn pdf_profile(self) -> PdfProfile {
        match self {
            CompressionLevel::Low => PdfProfile {
                image_optimization_format: "JPEG",
                jpeg_quality: 40,
                resample_images: true,
                resampling_resolution: 150,
                grayscale_images: false,
            },
            CompressionLevel::Medium => PdfProfile {
                image_optimization_format: "JPEG",
                jpeg_quality: 20,
                resample_images: true,
                resampling_resolution: 120,
                grayscale_images: false,
            },
            CompressionLevel::High => PdfProfile {
                image_optimization_format: "JPEG",
                jpeg_quality: 10,
                resample_images: true,
                resampling_resolution: 100,
                grayscale_images: true,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageParams {
    pub resize_width: u32,
    pub quality: u8,
}

/// Optimization profile in the shape the remote PDF API expects.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PdfProfile {
    #[serde(rename = "ImageOptimizationFormat")]
    pub image_optimization_format: &'static str,
    #[serde(rename = "JPEGQuality")]
    pub jpeg_quality: u8,
    #[serde(rename = "ResampleImages")]
    pub resample_images: bool,
    #[serde(rename = "ResamplingResolution")]
    pub resampling_resolution: u32,
    #[serde(rename = "GrayscaleImages")]
    pub grayscale_images: bool,
}

#[derive(Debug, Clone)]
pub struct ImageArtifact {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct PdfArtifact {
    pub url: String,
    pub compressed_size: u64,
    pub page_count: u32,
}

/// External compression capability. One implementation is selected at
/// startup; tests substitute their own.
#[async_trait]
pub trait CompressionBackend: Send + Sync {
    async fn compress_image(&self, source: &Path, level: CompressionLevel)
        -> Result<ImageArtifact>;
    async fn compress_pdf(
        &self,
        source: &Path,
        original_name: &str,
        level: CompressionLevel,
    ) -> Result<PdfArtifact>;
}

/// Validates file types and maps levels to concrete parameters before
/// delegating to the configured backend. Backend failures surface as
/// ProcessingError; a failed run never yields a partial artifact.
#[derive(Clone)]
pub struct ArtifactProcessor {
    backend: Arc<dyn CompressionBackend>,
}

impl ArtifactProcessor {
    pub fn new(backend: Arc<dyn CompressionBackend>) -> Self {
        Self { backend }
    }

    pub async fn process_image(
        &self,
        source: &Path,
        original_name: &str,
        level: CompressionLevel,
    ) -> Result<ImageArtifact, ApiError> {
        if !has_extension(original_name, VALID_IMAGE_EXTENSIONS) {
            return Err(ApiError::UnsupportedType(
                "Invalid file type. Only .jpg, .jpeg, .png, and .webp are supported".to_string(),
            ));
        }

        self.backend
            .compress_image(source, level)
            .await
            .map_err(|e| ApiError::Processing(format!("Error compressing image: {e:#}")))
    }

    pub async fn process_pdf(
        &self,
        source: &Path,
        original_name: &str,
        level: CompressionLevel,
    ) -> Result<PdfArtifact, ApiError> {
        if !has_extension(original_name, &["pdf"]) {
            return Err(ApiError::UnsupportedType(
                "Invalid file type. Only .pdf is supported".to_string(),
            ));
        }

        self.backend
            .compress_pdf(source, original_name, level)
            .await
            .map_err(|e| ApiError::Processing(format!("Error compressing PDF: {e:#}")))
    }
}

fn has_extension(name: &str, accepted: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| accepted.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Local resize-and-reencode backend. Output always lands in the configured
/// directory as a JPEG under a unique name; the decode/encode work runs on
/// the blocking pool.
pub struct LocalImageBackend {
    output_dir: PathBuf,
}

impl LocalImageBackend {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

#[async_trait]
impl CompressionBackend for LocalImageBackend {
    async fn compress_image(
        &self,
        source: &Path,
        level: CompressionLevel,
    ) -> Result<ImageArtifact> {
        let params = level.image_params();
        let source = source.to_path_buf();
        let dest = self
            .output_dir
            .join(format!("compressed-{}.jpg", Uuid::new_v4()));

        std::fs::create_dir_all(&self.output_dir)
            .context("Failed to create output directory")?;

        let dest_for_task = dest.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let img = image::open(&source).context("Failed to decode image")?;

            let img = if img.width() > params.resize_width {
                let scaled_height = (img.height() as u64 * params.resize_width as u64
                    / img.width() as u64)
                    .max(1) as u32;
                img.resize(
                    params.resize_width,
                    scaled_height,
                    image::imageops::FilterType::Lanczos3,
                )
            } else {
                img
            };

            let mut out = std::fs::File::create(&dest_for_task)
                .context("Failed to create output file")?;
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, params.quality);
            // JPEG has no alpha channel.
            encoder
                .encode_image(&img.to_rgb8())
                .context("Failed to encode image")?;
            Ok(())
        })
        .await
        .context("Compression task panicked")??;

        debug!(dest = %dest.display(), "Image compressed locally");
        Ok(ImageArtifact {
            url: dest.to_string_lossy().into_owned(),
        })
    }

    async fn compress_pdf(
        &self,
        _source: &Path,
        _original_name: &str,
        _level: CompressionLevel,
    ) -> Result<PdfArtifact> {
        bail!("PDF compression is not supported by the local image backend")
    }
}

/// Remote PDF optimization: upload the staged file, then submit the hosted
/// URL together with the level's optimization profile. One attempt; the
/// client timeout bounds the whole exchange.
pub struct RemotePdfBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct RemoteUploadResponse {
    error: bool,
    message: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteOptimizeResponse {
    error: bool,
    message: Option<String>,
    url: Option<String>,
    #[serde(rename = "fileSize")]
    file_size: Option<u64>,
    #[serde(rename = "pageCount")]
    page_count: Option<u32>,
}

impl RemotePdfBackend {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl CompressionBackend for RemotePdfBackend {
    async fn compress_image(
        &self,
        _source: &Path,
        _level: CompressionLevel,
    ) -> Result<ImageArtifact> {
        bail!("Image compression is not supported by the PDF backend")
    }

    async fn compress_pdf(
        &self,
        source: &Path,
        original_name: &str,
        level: CompressionLevel,
    ) -> Result<PdfArtifact> {
        let bytes = tokio::fs::read(source)
            .await
            .context("Failed to read staged PDF")?;
        let upload_name = format!("compressed-{}.pdf", Uuid::new_v4());

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(original_name.to_string()),
            )
            .text("name", upload_name.clone());

        let upload: RemoteUploadResponse = self
            .client
            .post(format!("{}/file/upload", self.base_url))
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .context("PDF upload request failed")?
            .json()
            .await
            .context("PDF upload response was not valid JSON")?;

        if upload.error {
            bail!(
                "PDF upload failed: {}",
                upload.message.unwrap_or_else(|| "Unknown error".to_string())
            );
        }
        let hosted_url = upload
            .url
            .context("PDF upload response did not include a URL")?;
        info!(url = %hosted_url, "PDF uploaded for optimization");

        let profile = serde_json::to_string(&level.pdf_profile())
            .context("Failed to serialize optimization profile")?;

        let optimized: RemoteOptimizeResponse = self
            .client
            .post(format!("{}/pdf/optimize", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&serde_json::json!({
                "url": hosted_url,
                "name": upload_name,
                "async": false,
                "profiles": profile,
            }))
            .send()
            .await
            .context("PDF optimize request failed")?
            .json()
            .await
            .context("PDF optimize response was not valid JSON")?;

        if optimized.error {
            bail!(
                "PDF compression failed: {}",
                optimized
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string())
            );
        }

        Ok(PdfArtifact {
            url: optimized
                .url
                .context("PDF optimize response did not include a URL")?,
            compressed_size: optimized.file_size.unwrap_or(0),
            page_count: optimized.page_count.unwrap_or(0),
        })
    }
}

/// The deployed backend pairing: images are compressed locally, PDFs go to
/// the remote optimization API.
pub struct HybridBackend {
    images: LocalImageBackend,
    pdfs: RemotePdfBackend,
}

impl HybridBackend {
    pub fn new(images: LocalImageBackend, pdfs: RemotePdfBackend) -> Self {
        Self { images, pdfs }
    }
}

#[async_trait]
impl CompressionBackend for HybridBackend {
    async fn compress_image(
        &self,
        source: &Path,
        level: CompressionLevel,
    ) -> Result<ImageArtifact> {
        self.images.compress_image(source, level).await
    }

    async fn compress_pdf(
        &self,
        source: &Path,
        original_name: &str,
        level: CompressionLevel,
    ) -> Result<PdfArtifact> {
        self.pdfs.compress_pdf(source, original_name, level).await
    }
}
