//! # Application Constants
//!
//! This module defines configuration constants used throughout the Shoebox application.
//! These constants control upload limits, naming rules, pagination and token lifetimes.

use std::time::Duration;

/// File extensions accepted for photos and album covers (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Title of the album that always exists, sorts first and cannot be deleted.
pub const DEFAULT_ALBUM_TITLE: &str = "General Photos";

/// Placeholder cover shared by albums without a cover of their own.
///
/// The placeholder lives in the upload directory and counts towards usage,
/// but it is never deleted and never counted as a "replaced" cover.
pub const DEFAULT_COVER_FILENAME: &str = "default_cover.png";

/// Maximum number of randomized alternatives tried when a filename collides.
pub const MAX_RENAME_ATTEMPTS: u32 = 5;

/// Number of random bytes in a rename suffix (rendered as twice as many hex chars).
pub const RENAME_SUFFIX_BYTES: usize = 3;

/// Default global storage ceiling for the upload directory.
pub const DEFAULT_MAX_TOTAL_STORAGE_BYTES: u64 = 500 * 1024 * 1024;

/// Default cap on a single request body.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 128 * 1024 * 1024;

/// Photos per page in the manage listing.
pub const ITEMS_PER_PAGE: u32 = 15;

/// Albums per page in the album listing.
pub const ALBUMS_PER_PAGE: u32 = 10;

/// Longest accepted album title.
pub const MAX_TITLE_LENGTH: u64 = 100;

/// Lifetime of an album access token.
pub const ALBUM_ACCESS_TOKEN_EXPIRY: Duration = Duration::from_secs(12 * 60 * 60);

/// PBKDF2 rounds applied when hashing album passwords.
pub const PASSWORD_HASH_ROUNDS: u32 = 10_000;

/// Bytes per mebibyte, used for human-readable quota messages.
pub const BYTES_PER_MB: u64 = 1024 * 1024;
