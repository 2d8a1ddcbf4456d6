use std::path::PathBuf;
use uuid::Uuid;

use crate::models::format::OutputFormat;

/// Local content store for rendered artifacts.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `render-<jobId>.<ext>`
    pub fn artifact_name(job_id: Uuid, format: OutputFormat) -> String {
        format!("render-{}.{}", job_id, format.extension())
    }

    /// Write an artifact, creating the output directory if needed.
    /// Returns the stored reference reported as the job result.
    pub async fn save(
        &self,
        job_id: Uuid,
        format: OutputFormat,
        data: &[u8],
    ) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.root.clone(),
                source,
            })?;

        let path = self.root.join(Self::artifact_name(job_id, format));
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

        Ok(path.to_string_lossy().into_owned())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to create output directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write artifact {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
