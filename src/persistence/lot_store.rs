use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::entities::lot::Lot;

use super::atomic_file::AtomicJsonFile;
use super::StoreError;

/// Wire format of the persisted lot book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotBook {
    pub core_ratio: f64,
    pub positions: Vec<Lot>,
    pub last_updated: DateTime<Utc>,
}

/// Durable store for the cost-basis lot list
pub struct LotStore {
    file: AtomicJsonFile,
}

impl LotStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            file: AtomicJsonFile::new(path),
        }
    }

    /// Load the persisted lots. Missing or malformed state starts empty;
    /// startup never fails on a bad lot file.
    pub async fn load_or_empty(&self) -> Vec<Lot> {
        match self.file.load::<LotBook>().await {
            Ok(Some(book)) => book.positions,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(
                    path = %self.file.path().display(),
                    error = %e,
                    "Discarding unreadable lot book, starting empty"
                );
                Vec::new()
            }
        }
    }

    pub async fn save(&self, core_ratio: f64, lots: &[Lot]) -> Result<(), StoreError> {
        let book = LotBook {
            core_ratio,
            positions: lots.to_vec(),
            last_updated: Utc::now(),
        };
        self.file.save(&book).await
    }
}
