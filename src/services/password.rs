//! PBKDF2-SHA256 password hashes for album protection, stored as PHC strings
//! (`$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`).

use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use pbkdf2::{Algorithm, Params, Pbkdf2};
use tracing::{error, warn};

use crate::utils::constant::PASSWORD_HASH_ROUNDS;

const OUTPUT_LENGTH: usize = 32;

/// Hashes `password` with a fresh random salt.
///
/// # Errors
///
/// Fails only if the hasher rejects its own parameters.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let params = Params {
        rounds: PASSWORD_HASH_ROUNDS,
        output_length: OUTPUT_LENGTH,
    };

    let hash = Pbkdf2
        .hash_password_customized(
            password.as_bytes(),
            Some(Algorithm::Pbkdf2Sha256.ident()),
            None,
            params,
            &salt,
        )
        .inspect_err(|e| error!(error = %e, "Failed to hash password"))?;
    Ok(hash.to_string())
}

/// Checks `password` against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parsed = match PasswordHash::new(stored) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Stored password hash is malformed");
            return false;
        }
    };
    Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok()
}
