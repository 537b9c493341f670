//! Export sinks for captured regions.

use crate::types::{CaptureSource, ExportArtifact, ExportError};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Attempts at a unique file name before giving up
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Receives captured pixels and turns them into an artifact
///
/// Failures come back as [`ExportError`]; a sink must never panic on bad input.
#[async_trait::async_trait]
pub trait ExportSink: Send + Sync {
    async fn export_image(&self, image: RgbaImage, source: CaptureSource) -> Result<ExportArtifact, ExportError>;
}

/// Writes each capture as a JPEG file into one directory
#[derive(Debug, Clone)]
pub struct JpegDirectorySink {
    dir: PathBuf,
    quality: u8,
}

impl JpegDirectorySink {
    pub fn new(dir: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            dir: dir.into(),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &crate::config::CaptureConfig) -> Self {
        Self::new(config.resolved_output_dir(), config.jpeg_quality)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// `capture_{unix_millis}_{source}.jpg`, with `-{n}` appended on collision
    fn file_name(millis: i64, source: CaptureSource, attempt: u32) -> String {
        if attempt == 0 {
            format!("capture_{}_{}.jpg", millis, source)
        } else {
            format!("capture_{}_{}-{}.jpg", millis, source, attempt)
        }
    }

    fn encode(&self, image: RgbaImage) -> Result<Vec<u8>, ExportError> {
        let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.quality).encode_image(&rgb)?;
        Ok(buffer)
    }

    /// Write `bytes` to the freshly created `file`; a failed write leaves no file behind
    async fn persist(path: &Path, mut file: tokio::fs::File, bytes: &[u8]) -> Result<(), ExportError> {
        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!("Write to {} failed, removing partial file: {}", path.display(), e);
            drop(file);
            if let Err(remove) = tokio::fs::remove_file(path).await {
                debug!("Could not remove {}: {}", path.display(), remove);
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn create_unique(&self, source: CaptureSource) -> Result<(PathBuf, tokio::fs::File), ExportError> {
        let millis = chrono::Utc::now().timestamp_millis();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(Self::file_name(millis, source, attempt));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ExportError::Rejected(format!(
            "no free file name for capture_{}_{}",
            millis, source
        )))
    }
}

#[async_trait::async_trait]
impl ExportSink for JpegDirectorySink {
    async fn export_image(&self, image: RgbaImage, source: CaptureSource) -> Result<ExportArtifact, ExportError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ExportError::Rejected("empty image".to_string()));
        }

        let bytes = self.encode(image)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let (path, file) = self.create_unique(source).await?;
        Self::persist(&path, file, &bytes).await?;

        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        info!("💾 Saved {} capture {}x{} to {}", source, width, height, path.display());

        Ok(ExportArtifact {
            path,
            width,
            height,
            source,
        })
    }
}
