//! # Storage Accountant
//!
//! Tracks how many bytes the upload directory holds and decides whether an
//! incoming file or batch still fits under the global ceiling. The scan is
//! read-only and linear in the number of directory entries.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, instrument, warn};

/// Rejection returned when an operation would push usage past the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaExceeded {
    pub ceiling: u64,
    pub usage: u64,
    pub incoming: u64,
    pub replaced: u64,
}

impl QuotaExceeded {
    /// Bytes still available once the replaced file is gone, floored at zero.
    pub fn headroom(&self) -> u64 {
        (self.ceiling + self.replaced).saturating_sub(self.usage)
    }
}

/// Errors raised while checking the quota.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("storage quota exceeded")]
    Exceeded(QuotaExceeded),
    #[error("failed to scan upload directory: {0}")]
    Io(#[from] std::io::Error),
}

pub struct StorageAccountant {
    upload_dir: PathBuf,
    ceiling: u64,
}

impl StorageAccountant {
    pub fn new(upload_dir: impl Into<PathBuf>, ceiling: u64) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            ceiling,
        }
    }

    #[inline]
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    #[inline]
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Sums the sizes of all regular files in the upload directory.
    ///
    /// A missing directory holds nothing. Entries whose metadata cannot be
    /// read are logged and skipped.
    #[instrument(skip(self), fields(upload_dir = %self.upload_dir.display()))]
    pub async fn current_usage(&self) -> Result<u64, std::io::Error> {
        let mut entries = match fs::read_dir(&self.upload_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Upload directory missing, usage is zero");
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let mut total = 0u64;
        while let Some(entry) = entries.next_entry().await? {
            match entry.metadata().await {
                Ok(meta) if meta.is_file() => total += meta.len(),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Could not get file size");
                }
            }
        }

        debug!(usage = total, "Computed upload directory usage");
        Ok(total)
    }

    /// Returns true iff `usage - replaced + incoming` is above the ceiling.
    pub fn would_exceed(&self, usage: u64, incoming: u64, replaced: u64) -> bool {
        usage.saturating_sub(replaced).saturating_add(incoming) > self.ceiling
    }

    /// Scans current usage and rejects the operation if it does not fit.
    ///
    /// `replaced` is the size of a file that the operation will remove once it
    /// succeeds (an old cover being replaced); pass zero otherwise.
    ///
    /// # Returns
    ///
    /// * `Ok(usage)` - The operation fits; current usage is returned for logging
    /// * `Err(QuotaError::Exceeded)` - The operation would exceed the ceiling
    /// * `Err(QuotaError::Io)` - The upload directory could not be scanned
    #[instrument(skip(self))]
    pub async fn ensure_fits(&self, incoming: u64, replaced: u64) -> Result<u64, QuotaError> {
        let usage = self.current_usage().await?;
        debug!(
            usage,
            incoming,
            replaced,
            ceiling = self.ceiling,
            "Checking storage quota"
        );

        if self.would_exceed(usage, incoming, replaced) {
            let exceeded = QuotaExceeded {
                ceiling: self.ceiling,
                usage,
                incoming,
                replaced,
            };
            warn!(headroom = exceeded.headroom(), "Storage quota would be exceeded");
            return Err(QuotaError::Exceeded(exceeded));
        }

        Ok(usage)
    }
}
