//! Persistence Layer
//!
//! This module provides durable storage for the two state files this core
//! owns: the paper-trading account ledger and the cost-basis lot book.
//! Both are low-write-frequency JSON documents written through an
//! atomic-replace discipline (write temp file, flush, fsync, rename) so a
//! crash mid-write can never leave a partially written state file.
//!
//! Load failures are recoverable by contract: a missing or malformed file
//! is logged and treated as an empty starting state, never a startup crash.
//! Write failures are logged by the callers and the in-memory state stays
//! authoritative.

pub mod account_ledger;
pub mod atomic_file;
pub mod lot_store;

use thiserror::Error;

/// Storage error for the JSON state files
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
