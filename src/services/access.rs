//! # Album Access Tokens
//!
//! A password-protected album is opened by presenting its password once to
//! the authorize endpoint, which returns a signed token listing every album
//! the holder has unlocked. Clients send it back as a Bearer token.
//!
//! Tokens are stateless (HS256); nothing is stored server side, so they
//! stay valid until expiry even if the album password changes.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::utils::constant::ALBUM_ACCESS_TOKEN_EXPIRY;

/// Errors that can occur during access token operations
#[derive(Debug, Error)]
pub enum AccessTokenError {
    #[error("Token encoding failed: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
}

/// Claims of an album access token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AlbumClaims {
    /// Random token id
    pub sub: String,
    /// Albums this token unlocks
    pub albums: Vec<i64>,
    pub exp: u64,
    pub iat: u64,
}

impl AlbumClaims {
    pub fn grants(&self, album_id: i64) -> bool {
        self.albums.contains(&album_id)
    }
}

/// A freshly issued token
#[derive(Debug, Serialize)]
pub struct AccessGrant {
    pub access_token: String,
    pub albums: Vec<i64>,
    /// Lifetime in seconds
    pub expires_in: u64,
}

pub struct AlbumAccessService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AlbumAccessService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issues a token unlocking `album_id` plus every album in `previous`.
    ///
    /// `previous` is the holder's current token, if any. An invalid or
    /// expired previous token is ignored rather than rejected.
    #[instrument(skip(self, previous))]
    pub fn grant(
        &self,
        album_id: i64,
        previous: Option<&str>,
    ) -> Result<AccessGrant, AccessTokenError> {
        let mut albums = previous
            .and_then(|token| self.validate(token).ok())
            .map(|claims| claims.albums)
            .unwrap_or_default();
        if !albums.contains(&album_id) {
            albums.push(album_id);
        }
        albums.sort_unstable();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("System time should not be before UNIX EPOCH")
            .as_secs();
        let claims = AlbumClaims {
            sub: Uuid::new_v4().to_string(),
            albums: albums.clone(),
            exp: now + ALBUM_ACCESS_TOKEN_EXPIRY.as_secs(),
            iat: now,
        };
        let access_token = encode(&Header::default(), &claims, &self.encoding_key)?;
        debug!(unlocked = albums.len(), "Album access token issued");

        Ok(AccessGrant {
            access_token,
            albums,
            expires_in: ALBUM_ACCESS_TOKEN_EXPIRY.as_secs(),
        })
    }

    /// Validates a token and returns its claims.
    ///
    /// # Errors
    ///
    /// - [`AccessTokenError::TokenExpired`] - Token has expired
    /// - [`AccessTokenError::InvalidToken`] - Token is malformed or has invalid signature
    #[instrument(skip_all, fields(token_length = token.len()))]
    pub fn validate(&self, token: &str) -> Result<AlbumClaims, AccessTokenError> {
        match decode::<AlbumClaims>(token, &self.decoding_key, &Validation::default()) {
            Ok(token_data) => {
                trace!(albums = ?token_data.claims.albums, "Access token validated");
                Ok(token_data.claims)
            }
            Err(e) if e.kind() == &jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                debug!("Access token expired");
                Err(AccessTokenError::TokenExpired)
            }
            Err(e) => {
                debug!(error = %e, "Invalid access token");
                Err(AccessTokenError::InvalidToken)
            }
        }
    }
}
