//! # Upload Utilities
//!
//! This module provides common utilities for file uploads: validation of the
//! incoming file, and file management inside the upload directory. These
//! utilities are shared by the upload pipeline and the delete handlers so that
//! every path touches the disk the same way.

use std::io::ErrorKind;
use std::path::Path;

use image::{ImageBuffer, ImageFormat, Rgb};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, error, trace, warn};

use crate::utils::constant::ALLOWED_EXTENSIONS;

/// Provides image validation utilities for upload handlers.
pub struct ImageUploadValidator;

impl ImageUploadValidator {
    /// Validates the extension of an uploaded file name.
    ///
    /// Only `png`, `jpg`, `jpeg` and `gif` are accepted, case-insensitively.
    pub fn validate_extension(filename: &str) -> Result<(), &'static str> {
        let Some((_, extension)) = filename.rsplit_once('.') else {
            return Err("File has no extension");
        };
        let extension = extension.to_ascii_lowercase();

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err("Only PNG, JPG, JPEG and GIF files are allowed");
        }

        trace!(%extension, "File extension validated");
        Ok(())
    }

    /// Validates that the file is not empty.
    pub fn validate_file_not_empty(data: &[u8]) -> Result<(), &'static str> {
        if data.is_empty() {
            return Err("Empty file not allowed");
        }
        Ok(())
    }
}

/// Provides file system utilities for upload handlers.
pub struct FileManager;

impl FileManager {
    /// Ensures the specified directory exists, creating it if necessary.
    pub async fn ensure_directory_exists(path: &Path) -> Result<(), std::io::Error> {
        trace!(path = %path.display(), "Ensuring directory exists");
        fs::create_dir_all(path).await
    }

    /// Saves file data to the specified path.
    ///
    /// # Arguments
    ///
    /// * `file_path` - The complete path where the file should be saved
    /// * `data` - The file data to save
    ///
    /// # Returns
    ///
    /// * `Ok(())` - File saved and flushed
    /// * `Err(std::io::Error)` - Failed to save file
    pub async fn save_file(file_path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
        debug!(file_path = %file_path.display(), size = data.len(), "Saving file");

        let mut file = fs::File::create(file_path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        debug!(file_path = %file_path.display(), "File saved successfully");
        Ok(())
    }

    /// Returns whether a regular file exists at `path`.
    pub async fn is_file(path: &Path) -> Result<bool, std::io::Error> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Returns whether anything (file, directory or link) exists at `path`.
    pub async fn exists(path: &Path) -> Result<bool, std::io::Error> {
        fs::try_exists(path).await
    }

    /// Returns the size of the regular file at `path`, or zero if there is none.
    pub async fn file_size(path: &Path) -> u64 {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => 0,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(file_path = %path.display(), error = %e, "Could not read file size");
                }
                0
            }
        }
    }

    /// Removes a stored file.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - File removed
    /// * `Ok(false)` - File was already missing
    /// * `Err(std::io::Error)` - File exists but could not be removed
    pub async fn remove_file(file_path: &Path) -> Result<bool, std::io::Error> {
        match fs::remove_file(file_path).await {
            Ok(()) => {
                debug!(file_path = %file_path.display(), "File removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file_path = %file_path.display(), "File already missing");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Attempts to clean up a file (used for error recovery).
    ///
    /// This function logs errors but doesn't return them, as it's used for cleanup
    /// in error scenarios where the original error should be preserved.
    pub async fn cleanup_file(file_path: &Path) {
        if let Err(e) = fs::remove_file(file_path).await {
            error!(
                file_path = %file_path.display(),
                error = %e,
                "Failed to clean up file during error recovery"
            );
        } else {
            debug!(file_path = %file_path.display(), "File cleaned up successfully");
        }
    }

    /// Removes every regular file in `dir` except `keep`. Returns the number removed.
    ///
    /// Files that cannot be removed are logged and skipped.
    pub async fn clear_directory_except(dir: &Path, keep: &str) -> Result<usize, std::io::Error> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name() == keep || !entry.file_type().await?.is_file() {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    error!(path = %entry.path().display(), error = %e, "Failed to remove file");
                }
            }
        }

        debug!(dir = %dir.display(), removed, "Directory cleared");
        Ok(removed)
    }

    /// Writes the shared placeholder cover if it does not exist yet.
    ///
    /// The placeholder is a small neutral-grey PNG.
    pub async fn ensure_placeholder_cover(path: &Path) -> Result<(), std::io::Error> {
        if Self::is_file(path).await? {
            trace!(path = %path.display(), "Placeholder cover present");
            return Ok(());
        }

        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(64, 64, Rgb([200, 200, 200]));
        let mut buffer = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(std::io::Error::other)?;

        Self::save_file(path, &buffer).await?;
        debug!(path = %path.display(), size = buffer.len(), "Placeholder cover written");
        Ok(())
    }
}
