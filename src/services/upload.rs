//! # Upload Transaction
//!
//! Every write that puts a file into the upload directory goes through
//! [`UploadTransaction`]: photo batches, new album covers and cover
//! replacements. Each item moves through these stages:
//!
//! ```text
//! Pending -> SizeChecked -> QuotaApproved -> NameResolved -> FileWritten -> RecordCommitted
//! ```
//!
//! Any failure after `FileWritten` removes the file again, so a file without a
//! record is never left behind. A batch is admitted or rejected by the quota
//! as a whole, before anything is written; after that, items succeed or fail
//! individually.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::models::{Album, AlbumChanges, NewAlbum, Photo, PhotoView};
use crate::services::catalog::Catalog;
use crate::services::naming::{
    FilenameResolver, NameScope, RenamedFile, ResolveError, ResolvedName, sanitize_filename,
};
use crate::services::storage::{QuotaError, QuotaExceeded, StorageAccountant};
use crate::utils::file::{FileManager, ImageUploadValidator};

/// Errors that abort an upload operation as a whole
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Invalid(String),
    #[error("storage quota exceeded")]
    Quota(QuotaExceeded),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("album title '{0}' already exists")]
    DuplicateTitle(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<QuotaError> for UploadError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::Exceeded(quota) => UploadError::Quota(quota),
            QuotaError::Io(e) => UploadError::Io(e),
        }
    }
}

/// Where an item was when it stopped. Logged with every item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStage {
    Pending,
    SizeChecked,
    QuotaApproved,
    NameResolved,
    FileWritten,
    RecordCommitted,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemStage::Pending => "pending",
            ItemStage::SizeChecked => "size_checked",
            ItemStage::QuotaApproved => "quota_approved",
            ItemStage::NameResolved => "name_resolved",
            ItemStage::FileWritten => "file_written",
            ItemStage::RecordCommitted => "record_committed",
        };
        f.write_str(name)
    }
}

/// A file taken from a multipart request.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub data: Bytes,
}

impl IncomingFile {
    pub fn new(original_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            original_name: original_name.into(),
            data: data.into(),
        }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Checks extension and emptiness.
    pub fn validate(&self) -> Result<(), &'static str> {
        ImageUploadValidator::validate_extension(&self.original_name)?;
        ImageUploadValidator::validate_file_not_empty(&self.data)
    }
}

/// One photo of a batch, with its caption.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file: IncomingFile,
    pub caption: Option<String>,
}

/// Per-batch outcome returned to the uploader.
#[derive(Debug, Default, Serialize)]
pub struct UploadReport {
    pub success_count: usize,
    pub uploaded: Vec<PhotoView>,
    pub renamed: Vec<RenamedFile>,
    /// Original names skipped because an earlier file of the batch had the same name.
    pub duplicates: Vec<String>,
    pub errors: Vec<String>,
}

/// Result of an album create or edit.
#[derive(Debug)]
pub struct AlbumOutcome {
    pub album: Album,
    pub changed: bool,
    pub cover_renamed: Option<RenamedFile>,
    /// Problems that did not undo the operation, such as an old cover that could not be removed.
    pub warnings: Vec<String>,
}

/// A file on disk whose record is not committed yet.
struct StagedFile {
    path: PathBuf,
    resolved: ResolvedName,
    /// Set when the write replaced an existing file of the same name in place.
    overwrote: bool,
}

impl StagedFile {
    fn name(&self) -> &str {
        &self.resolved.name
    }

    /// Removes the written file unless it overwrote a file that is still referenced.
    async fn roll_back(self) {
        if self.overwrote {
            warn!(file = %self.resolved.name, "Record commit failed after in-place overwrite; file kept");
            return;
        }
        FileManager::cleanup_file(&self.path).await;
    }
}

pub struct UploadTransaction {
    accountant: StorageAccountant,
    resolver: FilenameResolver,
    catalog: Arc<dyn Catalog>,
}

impl UploadTransaction {
    pub fn new(
        accountant: StorageAccountant,
        resolver: FilenameResolver,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            accountant,
            resolver,
            catalog,
        }
    }

    #[inline]
    pub fn accountant(&self) -> &StorageAccountant {
        &self.accountant
    }

    #[inline]
    pub fn resolver(&self) -> &FilenameResolver {
        &self.resolver
    }

    #[inline]
    pub fn upload_dir(&self) -> &Path {
        self.accountant.upload_dir()
    }

    /// Stores a batch of photos into `album_id` (`None` for the single gallery).
    ///
    /// Invalid items are reported in `errors` and do not count toward the
    /// quota. The remaining bytes are checked once; if the batch does not fit,
    /// nothing is written and [`UploadError::Quota`] is returned. Items whose
    /// sanitized name repeats an earlier item are skipped as duplicates.
    ///
    /// # Errors
    ///
    /// - [`UploadError::Invalid`] - The batch is empty
    /// - [`UploadError::Quota`] - The valid items together exceed the ceiling
    /// - [`UploadError::Io`] - The upload directory could not be scanned
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn upload_photos(
        &self,
        album_id: Option<i64>,
        scope: NameScope<'_>,
        items: Vec<PhotoUpload>,
    ) -> Result<UploadReport, UploadError> {
        if items.is_empty() {
            return Err(UploadError::Invalid("No photos selected!".to_string()));
        }

        let mut report = UploadReport::default();
        let mut valid = Vec::with_capacity(items.len());
        for item in items {
            match item.file.validate() {
                Ok(()) => valid.push(item),
                Err(reason) => {
                    debug!(file = %item.file.original_name, stage = %ItemStage::Pending, %reason, "Upload item rejected");
                    report.errors.push(format!(
                        "Invalid file type or empty file: \"{}\".",
                        item.file.original_name
                    ));
                }
            }
        }

        if valid.is_empty() {
            return Ok(report);
        }

        let batch_bytes: u64 = valid.iter().map(|item| item.file.size()).sum();
        debug!(batch_bytes, stage = %ItemStage::SizeChecked, "Batch sized");
        self.accountant.ensure_fits(batch_bytes, 0).await?;

        let mut seen = HashSet::with_capacity(valid.len());
        for item in valid {
            let sanitized = sanitize_filename(&item.file.original_name);
            if !sanitized.is_empty() && !seen.insert(sanitized) {
                debug!(file = %item.file.original_name, "Duplicate name within batch, skipped");
                report.duplicates.push(item.file.original_name);
                continue;
            }

            match self.store_photo(album_id, scope, &item).await {
                Ok((photo, renamed)) => {
                    report.uploaded.push(photo.into());
                    report.renamed.extend(renamed);
                }
                Err(message) => report.errors.push(message),
            }
        }

        report.success_count = report.uploaded.len();
        info!(
            success = report.success_count,
            renamed = report.renamed.len(),
            duplicates = report.duplicates.len(),
            errors = report.errors.len(),
            "Photo batch processed"
        );
        Ok(report)
    }

    /// Runs one item from name resolution to record commit.
    ///
    /// Returns the user-facing error message on failure.
    async fn store_photo(
        &self,
        album_id: Option<i64>,
        scope: NameScope<'_>,
        item: &PhotoUpload,
    ) -> Result<(Photo, Option<RenamedFile>), String> {
        let original = &item.file.original_name;

        let staged = match self.stage_file(&item.file, scope).await {
            Ok(staged) => staged,
            Err(UploadError::Resolve(ResolveError::Conflict { .. })) => {
                return Err(format!("Filename conflict for \"{original}\"."));
            }
            Err(UploadError::Resolve(ResolveError::InvalidName(_))) => {
                return Err(format!("Invalid filename \"{original}\"."));
            }
            Err(e) => {
                error!(file = %original, stage = %ItemStage::QuotaApproved, error = %e, "Failed to store photo");
                return Err(format!("Server error uploading \"{original}\"."));
            }
        };

        match self
            .catalog
            .insert_photo(album_id, staged.name(), item.caption.as_deref())
            .await
        {
            Ok(photo) => {
                debug!(file = %staged.name(), stage = %ItemStage::RecordCommitted, "Photo stored");
                Ok((photo, staged.resolved.rename()))
            }
            Err(e) => {
                error!(file = %staged.name(), stage = %ItemStage::FileWritten, error = %e, "Photo record insert failed, removing file");
                staged.roll_back().await;
                Err(format!("Database error for \"{original}\"."))
            }
        }
    }

    /// Resolves a name for `file` and writes it to disk.
    ///
    /// The returned file keeps its name reserved until it is dropped.
    async fn stage_file(
        &self,
        file: &IncomingFile,
        scope: NameScope<'_>,
    ) -> Result<StagedFile, UploadError> {
        let resolved = self.resolver.resolve(&file.original_name, scope).await?;
        let path = self.upload_dir().join(&resolved.name);
        let overwrote = matches!(scope, NameScope::CoverOf { keep: Some(current), .. } if current == resolved.name);

        if let Err(e) = FileManager::save_file(&path, &file.data).await {
            error!(file = %resolved.name, stage = %ItemStage::NameResolved, error = %e, "Failed to write file");
            if !overwrote {
                FileManager::cleanup_file(&path).await;
            }
            return Err(UploadError::Io(e));
        }

        Ok(StagedFile {
            path,
            resolved,
            overwrote,
        })
    }

    /// Creates an album with its cover.
    ///
    /// # Errors
    ///
    /// - [`UploadError::Invalid`] - The cover is missing, empty or of a disallowed type
    /// - [`UploadError::Quota`] - The cover does not fit
    /// - [`UploadError::DuplicateTitle`] - Another album already has the title
    /// - [`UploadError::Resolve`] - No free name could be found for the cover
    #[instrument(skip_all, fields(title = %new_album.title, cover = %cover.original_name))]
    pub async fn create_album(
        &self,
        new_album: NewAlbum,
        cover: IncomingFile,
    ) -> Result<AlbumOutcome, UploadError> {
        cover.validate().map_err(|reason| {
            UploadError::Invalid(format!("Invalid cover image: {reason}."))
        })?;
        self.accountant.ensure_fits(cover.size(), 0).await?;

        if self.catalog.album_title_taken(&new_album.title, None).await? {
            return Err(UploadError::DuplicateTitle(new_album.title));
        }

        let staged = self.stage_file(&cover, NameScope::PhotosAndCovers).await?;
        match self.catalog.insert_album(&new_album, staged.name()).await {
            Ok(album) => {
                info!(album_id = album.id, cover = %album.cover_filename, "Album created");
                Ok(AlbumOutcome {
                    album,
                    changed: true,
                    cover_renamed: staged.resolved.rename(),
                    warnings: Vec::new(),
                })
            }
            Err(e) => {
                error!(error = %e, stage = %ItemStage::FileWritten, "Album insert failed, removing cover");
                staged.roll_back().await;
                Err(title_conflict_or(e, new_album.title))
            }
        }
    }

    /// Applies `changes` to `album`, replacing its cover when `cover` is given.
    ///
    /// A title equal to the current one is not a change. The old cover file is
    /// removed only after the record is committed, and only if it is not the
    /// shared placeholder and not the name the new cover was written under; a
    /// failed removal becomes a warning.
    #[instrument(skip_all, fields(album_id = album.id))]
    pub async fn update_album(
        &self,
        album: &Album,
        mut changes: AlbumChanges,
        cover: Option<IncomingFile>,
    ) -> Result<AlbumOutcome, UploadError> {
        if changes.title.as_deref() == Some(album.title.as_str()) {
            changes.title = None;
        }
        if let Some(title) = &changes.title
            && self.catalog.album_title_taken(title, Some(album.id)).await?
        {
            return Err(UploadError::DuplicateTitle(title.clone()));
        }

        let staged = match cover {
            Some(cover) => Some(self.stage_cover(album, &cover).await?),
            None => None,
        };
        if let Some(staged) = &staged {
            changes.cover_filename = Some(staged.name().to_string());
        }

        if changes.is_empty() {
            debug!("Nothing to update");
            return Ok(AlbumOutcome {
                album: album.clone(),
                changed: false,
                cover_renamed: None,
                warnings: Vec::new(),
            });
        }

        let updated = match self.catalog.update_album(album.id, &changes).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(error = %e, "Album update failed");
                if let Some(staged) = staged {
                    staged.roll_back().await;
                }
                return Err(match changes.title {
                    Some(title) => title_conflict_or(e, title),
                    None => UploadError::Db(e),
                });
            }
        };

        let mut warnings = Vec::new();
        let cover_renamed = staged.as_ref().and_then(|s| s.resolved.rename());
        if let Some(staged) = &staged
            && !album.has_placeholder_cover()
            && staged.name() != album.cover_filename
        {
            let old_path = self.upload_dir().join(&album.cover_filename);
            if let Err(e) = FileManager::remove_file(&old_path).await {
                warn!(old_cover = %album.cover_filename, error = %e, "Failed to delete old cover");
                warnings.push(format!(
                    "Album updated, but failed to delete old cover file '{}'.",
                    album.cover_filename
                ));
            }
        }

        info!(title = %updated.title, cover = %updated.cover_filename, "Album updated");
        Ok(AlbumOutcome {
            album: updated,
            changed: true,
            cover_renamed,
            warnings,
        })
    }

    /// Validates, quota-checks and writes a replacement cover for `album`.
    async fn stage_cover(
        &self,
        album: &Album,
        cover: &IncomingFile,
    ) -> Result<StagedFile, UploadError> {
        cover.validate().map_err(|reason| {
            UploadError::Invalid(format!("Invalid cover image: {reason}."))
        })?;

        let (replaced, keep) = if album.has_placeholder_cover() {
            (0, None)
        } else {
            let old_path = self.upload_dir().join(&album.cover_filename);
            (
                FileManager::file_size(&old_path).await,
                Some(album.cover_filename.as_str()),
            )
        };
        self.accountant.ensure_fits(cover.size(), replaced).await?;

        self.stage_file(
            cover,
            NameScope::CoverOf {
                album_id: album.id,
                keep,
            },
        )
        .await
    }
}

/// Maps a unique violation on insert to a duplicate title.
fn title_conflict_or(e: sqlx::Error, title: String) -> UploadError {
    let is_unique = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation() && db.message().contains("albums.title"));
    if is_unique {
        UploadError::DuplicateTitle(title)
    } else {
        UploadError::Db(e)
    }
}
