//! # Application Configuration
//!
//! [`AppConfig`] collects every environment-driven setting in one explicit
//! value. It is built once at start-up and handed to [`crate::app`]; nothing
//! else in the crate reads the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use rand::Rng;
use serde::Deserialize;
use tracing::{error, warn};

use crate::utils::constant::{
    DEFAULT_COVER_FILENAME, DEFAULT_MAX_REQUEST_BYTES, DEFAULT_MAX_TOTAL_STORAGE_BYTES,
};

/// Which layout the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GalleryMode {
    /// Albums with covers and optional passwords; photos and covers share one namespace.
    Albums,
    /// One flat gallery; only photos hold names.
    Single,
}

impl FromStr for GalleryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "albums" => Ok(GalleryMode::Albums),
            "single" => Ok(GalleryMode::Single),
            other => Err(format!("unknown gallery mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub max_total_storage_bytes: u64,
    pub max_request_bytes: usize,
    pub mode: GalleryMode,
    pub album_token_secret: Vec<u8>,
    pub bind_addr: String,
}

impl AppConfig {
    /// Builds a configuration with defaults for everything but the upload directory.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_url: "sqlite://shoebox.db".to_string(),
            upload_dir: upload_dir.into(),
            max_total_storage_bytes: DEFAULT_MAX_TOTAL_STORAGE_BYTES,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            mode: GalleryMode::Albums,
            album_token_secret: random_secret(),
            bind_addr: "0.0.0.0:8090".to_string(),
        }
    }

    /// Reads the configuration from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL` - SQLite connection string (default `sqlite://shoebox.db`)
    /// - `UPLOAD_DIR` - Directory holding photos and covers (default `./uploads`)
    /// - `MAX_TOTAL_STORAGE_BYTES` - Global storage ceiling (default 500 MiB)
    /// - `MAX_REQUEST_BYTES` - Request body cap (default 128 MiB)
    /// - `GALLERY_MODE` - `albums` or `single` (default `albums`)
    /// - `ALBUM_TOKEN_SECRET` - Signing key for album access tokens (default: random per process)
    /// - `BIND_ADDR` - Listen address (default `0.0.0.0:8090`)
    pub fn from_env() -> Self {
        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| {
            warn!("Missing UPLOAD_DIR env var, using fallback './uploads'");
            "./uploads".to_string()
        });
        let mut config = Self::new(upload_dir);

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database_url = url;
        } else {
            warn!("Missing DATABASE_URL env var, using fallback 'sqlite://shoebox.db'");
        }

        config.max_total_storage_bytes = parse_or("MAX_TOTAL_STORAGE_BYTES", config.max_total_storage_bytes);
        config.max_request_bytes = parse_or("MAX_REQUEST_BYTES", config.max_request_bytes);
        config.mode = parse_or("GALLERY_MODE", config.mode);

        match env::var("ALBUM_TOKEN_SECRET") {
            Ok(secret) if !secret.is_empty() => config.album_token_secret = secret.into_bytes(),
            _ => warn!("Missing ALBUM_TOKEN_SECRET env var, album access tokens will not survive a restart"),
        }

        if let Ok(addr) = env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }

        config
    }

    /// Full path of the shared placeholder cover.
    pub fn placeholder_cover_path(&self) -> PathBuf {
        self.upload_dir.join(DEFAULT_COVER_FILENAME)
    }
}

fn parse_or<T>(name: &str, fallback: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            error!(%name, %raw, ?fallback, "Invalid env var, using fallback");
            fallback
        }),
        Err(_) => fallback,
    }
}

fn random_secret() -> Vec<u8> {
    let bytes: [u8; 32] = rand::rng().random();
    bytes.to_vec()
}
