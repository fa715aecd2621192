use crate::error::CacheError;
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Durable storage for run artifacts (the template and sanitized parameters)
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn save(&self, artifact: &serde_json::Value, destination: &Path) -> Result<(), CacheError>;
}

/// Writes artifacts as two-space indented JSON files
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCache;

impl FileCache {
    pub async fn write<T: Serialize + Sync>(&self, artifact: &T, destination: &Path) -> Result<(), CacheError> {
        let mut contents =
            serde_json::to_vec_pretty(artifact).map_err(|source| CacheError::Serialize {
                path: destination.to_path_buf(),
                source,
            })?;
        contents.push(b'\n');

        let write_error = |source: std::io::Error| CacheError::Write {
            path: destination.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(destination).await.map_err(write_error)?;
        file.write_all(&contents).await.map_err(write_error)?;
        file.flush().await.map_err(write_error)?;

        debug!("Wrote {} bytes to {:?}", contents.len(), destination);
        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for FileCache {
    async fn save(&self, artifact: &serde_json::Value, destination: &Path) -> Result<(), CacheError> {
        self.write(artifact, destination).await
    }
}
