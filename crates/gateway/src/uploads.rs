//! Image upload storage
//!
//! Files land in the configured directory under a fresh UUID name that keeps
//! the original extension, and are served back under the public prefix.
//! Only raster image extensions are accepted.

use std::path::{Path, PathBuf};
use uuid::Uuid;
use youbook_common::config::UploadConfig;
use youbook_common::errors::{AppError, Result};

/// Extensions an upload may carry
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// A file written to the upload directory
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    /// Reference stored in the database, e.g. `/uploads/<uuid>.png`
    pub public_path: String,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    public_prefix: String,
}

impl UploadStore {
    pub fn new(config: &UploadConfig) -> Self {
        let prefix = config.public_prefix.trim_end_matches('/');
        Self {
            dir: PathBuf::from(&config.dir),
            public_prefix: if prefix.is_empty() { "/uploads" } else { prefix }.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Route prefix the stored files are served under
    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub async fn save(&self, original_name: Option<&str>, bytes: &[u8]) -> Result<StoredFile> {
        let ext = original_name
            .and_then(extension)
            .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| AppError::Validation {
                message: format!("image must be one of: {}", IMAGE_EXTENSIONS.join(", ")),
                field: Some("image".to_string()),
            })?;
        let name = format!("{}.{}", Uuid::new_v4(), ext);
        let path = self.dir.join(&name);

        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "Upload stored");

        Ok(StoredFile {
            path,
            public_path: format!("{}/{}", self.public_prefix, name),
        })
    }

    /// Best effort; a leftover file is only wasted space
    pub async fn discard(&self, file: &StoredFile) {
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            tracing::warn!(path = %file.path.display(), error = %e, "Failed to remove upload");
        }
    }
}

fn extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    (!ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}
