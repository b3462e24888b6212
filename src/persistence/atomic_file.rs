use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::StoreError;

/// A JSON document on disk with atomic whole-file replacement.
///
/// Writes go to a sibling temp file which is flushed, fsynced and then
/// renamed over the target, so readers only ever observe a complete
/// document. Assumes a single writer per path; the process design keeps
/// exactly one mutator per state file.
pub struct AtomicJsonFile {
    path: PathBuf,
}

impl AtomicJsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and deserialize the document. `None` when the file does not
    /// exist yet; a parse failure is an error for the caller to classify.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Serialize and atomically replace the document.
    pub async fn save<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let result = self.write_and_swap(&tmp, &bytes).await;
        if result.is_err() {
            // The durable file is untouched; drop the partial temp file.
            let _ = fs::remove_file(&tmp).await;
        }
        result
    }

    async fn write_and_swap(&self, tmp: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let mut file = fs::File::create(tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(tmp, &self.path).await?;
        Ok(())
    }
}
