//! # Filename Resolver
//!
//! Picks the name an upload is stored under. Photos and album covers live in
//! one flat directory, so a name is free only if no file of that name exists
//! on disk, no record holds it, and no other in-flight upload has claimed it.
//!
//! ## Resolution
//!
//! 1. The desired name is sanitized with [`sanitize_filename`].
//! 2. If the sanitized name is free it is used as-is.
//! 3. Otherwise `_<6 hex>` is inserted before the extension, with a fresh
//!    random suffix per attempt, up to [`MAX_RENAME_ATTEMPTS`] times.
//!
//! Claimed names stay reserved until the returned [`ResolvedName`] is dropped,
//! which the upload pipeline does only after the record is committed or the
//! file rolled back. Two concurrent requests of this process therefore never
//! settle on the same name.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use dashmap::DashSet;
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};
use unicode_normalization::UnicodeNormalization;

use crate::utils::constant::{MAX_RENAME_ATTEMPTS, RENAME_SUFFIX_BYTES};
use crate::utils::file::FileManager;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("Failed to compile filename regex"));

const WINDOWS_DEVICE_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Errors that can occur while resolving a filename
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("filename '{0}' is empty after sanitizing")]
    InvalidName(String),
    #[error("filename '{original}' still collides after {attempts} rename attempts")]
    Conflict { original: String, attempts: u32 },
    #[error("name registry lookup failed: {0}")]
    Registry(#[from] sqlx::Error),
    #[error("upload directory lookup failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Lookups of names already held by stored records.
///
/// The production implementation queries the database; tests substitute
/// fakes that force collisions.
#[async_trait]
pub trait NameRegistry: Send + Sync {
    /// Returns true if a photo record holds `filename`.
    async fn photo_name_taken(&self, filename: &str) -> Result<bool, sqlx::Error>;

    /// Returns true if an album cover holds `filename`, ignoring `except_album`.
    async fn cover_name_taken(
        &self,
        filename: &str,
        except_album: Option<i64>,
    ) -> Result<bool, sqlx::Error>;
}

/// Which records take part in a collision check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScope<'a> {
    /// Single gallery: only photo names count.
    Photos,
    /// Albums layout: photo names and cover names count.
    PhotosAndCovers,
    /// Cover replacement for `album_id`: its own cover never collides, and
    /// `keep` (its current cover name, unless that is the shared placeholder)
    /// may be reused in place.
    CoverOf {
        album_id: i64,
        keep: Option<&'a str>,
    },
}

/// A rename reported back to the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedFile {
    pub original: String,
    pub stored_as: String,
}

/// Process-wide set of names claimed by uploads that have not finished yet.
#[derive(Debug, Clone, Default)]
pub struct NameReservations {
    names: Arc<DashSet<String>>,
}

impl NameReservations {
    /// Claims `name`, or returns `None` if another upload holds it.
    pub fn try_reserve(&self, name: &str) -> Option<NameGuard> {
        if self.names.insert(name.to_string()) {
            trace!(%name, "Name reserved");
            Some(NameGuard {
                names: Arc::clone(&self.names),
                name: name.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Releases a reserved name on drop.
#[derive(Debug)]
pub struct NameGuard {
    names: Arc<DashSet<String>>,
    name: String,
}

impl Drop for NameGuard {
    fn drop(&mut self) {
        self.names.remove(&self.name);
        trace!(name = %self.name, "Name released");
    }
}

/// The outcome of a successful resolution. Holds the name's reservation.
#[derive(Debug)]
pub struct ResolvedName {
    pub original: String,
    pub name: String,
    renamed: bool,
    _guard: NameGuard,
}

impl ResolvedName {
    #[inline]
    pub fn was_renamed(&self) -> bool {
        self.renamed
    }

    /// The `(original, final)` pair when a collision forced a new name.
    pub fn rename(&self) -> Option<RenamedFile> {
        self.renamed.then(|| RenamedFile {
            original: self.original.clone(),
            stored_as: self.name.clone(),
        })
    }
}

/// Reduces an uploaded file name to a filesystem-safe form.
///
/// The name is NFKD-decomposed so accented letters keep their ASCII base.
/// Path separators become spaces, whitespace runs become `_`, everything
/// outside `[A-Za-z0-9_.-]` is dropped and leading/trailing `.`/`_` are
/// trimmed, so directory components can never survive. On Windows, device
/// names get a `_` prefix. The result may be empty.
pub fn sanitize_filename(name: &str) -> String {
    let decomposed: String = name.nfkd().collect();
    let spaced = decomposed.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let stripped = UNSAFE_FILENAME_CHARS.replace_all(&joined, "");
    let trimmed = stripped.trim_matches(['.', '_']);

    let stem = trimmed.split('.').next().unwrap_or_default();
    if cfg!(windows) && WINDOWS_DEVICE_NAMES.contains(&stem.to_ascii_uppercase().as_str()) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Splits `name` into stem and extension (dot included). A leading dot is part of the stem.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Returns [`RENAME_SUFFIX_BYTES`] random bytes as lowercase hex.
pub fn random_suffix() -> String {
    let bytes: [u8; RENAME_SUFFIX_BYTES] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct FilenameResolver {
    upload_dir: PathBuf,
    registry: Arc<dyn NameRegistry>,
    reservations: NameReservations,
}

impl FilenameResolver {
    pub fn new(upload_dir: impl Into<PathBuf>, registry: Arc<dyn NameRegistry>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            registry,
            reservations: NameReservations::default(),
        }
    }

    pub fn reservations(&self) -> &NameReservations {
        &self.reservations
    }

    /// Resolves `desired` to a free name in the collision domain.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::InvalidName`] - Nothing is left after sanitizing
    /// - [`ResolveError::Conflict`] - Every rename attempt collided
    /// - [`ResolveError::Registry`] / [`ResolveError::Io`] - A lookup failed
    #[instrument(skip(self), fields(upload_dir = %self.upload_dir.display()))]
    pub async fn resolve(
        &self,
        desired: &str,
        scope: NameScope<'_>,
    ) -> Result<ResolvedName, ResolveError> {
        let sanitized = sanitize_filename(desired);
        if sanitized.is_empty() {
            warn!("Filename empty after sanitizing");
            return Err(ResolveError::InvalidName(desired.to_string()));
        }

        if let NameScope::CoverOf {
            keep: Some(current),
            ..
        } = scope
            && current == sanitized
            && let Some(guard) = self.reservations.try_reserve(&sanitized)
        {
            debug!(name = %sanitized, "Reusing the album's own cover name");
            return Ok(Self::resolved(desired, sanitized, false, guard));
        }

        if let Some(guard) = self.claim(&sanitized, scope).await? {
            trace!(name = %sanitized, "No collision");
            return Ok(Self::resolved(desired, sanitized, false, guard));
        }

        let (stem, extension) = split_extension(&sanitized);
        for attempt in 1..=MAX_RENAME_ATTEMPTS {
            let candidate = format!("{stem}_{}{extension}", random_suffix());
            if let Some(guard) = self.claim(&candidate, scope).await? {
                info!(original = %desired, renamed = %candidate, attempt, "Filename conflict, renamed");
                return Ok(Self::resolved(desired, candidate, true, guard));
            }
            debug!(%candidate, attempt, "Renamed candidate collides too");
        }

        warn!(attempts = MAX_RENAME_ATTEMPTS, "Filename conflict, renaming failed");
        Err(ResolveError::Conflict {
            original: desired.to_string(),
            attempts: MAX_RENAME_ATTEMPTS,
        })
    }

    /// Reserves `name` and keeps it if nothing else holds it.
    ///
    /// The reservation is taken before the lookups so that a concurrent
    /// upload either sees the reservation or, once released, the stored file.
    async fn claim(
        &self,
        name: &str,
        scope: NameScope<'_>,
    ) -> Result<Option<NameGuard>, ResolveError> {
        let Some(guard) = self.reservations.try_reserve(name) else {
            debug!(%name, "Name reserved by another upload");
            return Ok(None);
        };

        if self.is_taken(name, scope).await? {
            return Ok(None);
        }
        Ok(Some(guard))
    }

    async fn is_taken(&self, name: &str, scope: NameScope<'_>) -> Result<bool, ResolveError> {
        if FileManager::exists(&self.upload_dir.join(name)).await? {
            trace!(%name, "Name exists on disk");
            return Ok(true);
        }

        if self.registry.photo_name_taken(name).await? {
            trace!(%name, "Name held by a photo");
            return Ok(true);
        }

        let cover_taken = match scope {
            NameScope::Photos => false,
            NameScope::PhotosAndCovers => self.registry.cover_name_taken(name, None).await?,
            NameScope::CoverOf { album_id, .. } => {
                self.registry
                    .cover_name_taken(name, Some(album_id))
                    .await?
            }
        };
        if cover_taken {
            trace!(%name, "Name held by an album cover");
        }
        Ok(cover_taken)
    }

    fn resolved(original: &str, name: String, renamed: bool, guard: NameGuard) -> ResolvedName {
        ResolvedName {
            original: original.to_string(),
            name,
            renamed,
            _guard: guard,
        }
    }
}
