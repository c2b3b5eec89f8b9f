/// Password hashing and strength rules
///
/// Hashes are Argon2id in PHC string format (`$argon2id$v=19$m=65536,t=3,p=4$...`).
///
/// # Example
///
/// ```
/// use kinship_shared::auth::password::{hash_password, verify_password};
///
/// let hash = hash_password("Sunday-dinner-7").unwrap();
/// assert!(verify_password("Sunday-dinner-7", &hash).unwrap());
/// assert!(!verify_password("sunday-dinner-7", &hash).unwrap());
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),

    #[error("{0}")]
    TooWeak(&'static str),
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    // 64 MiB, 3 passes, 4 lanes
    let params = Params::new(65_536, 3, 4, Some(32))
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Constant-time check of `password` against a stored PHC hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::InvalidHash(e.to_string())),
    }
}

/// Minimum bar for account passwords: 8..=128 characters with at least one
/// letter and one digit
pub fn validate_password_strength(password: &str) -> Result<(), PasswordError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooWeak(
            "Password must be at least 8 characters long",
        ));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(PasswordError::TooWeak(
            "Password must be at most 128 characters long",
        ));
    }
    if !password.chars().any(char::is_alphabetic) {
        return Err(PasswordError::TooWeak(
            "Password must contain at least one letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordError::TooWeak(
            "Password must contain at least one digit",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_uses_argon2id_parameters() {
        let hash = hash_password("Grandma-2025").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$"));
        assert!(hash.contains("m=65536,t=3,p=4"));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(
            hash_password("same-password-1").unwrap(),
            hash_password("same-password-1").unwrap()
        );
    }

    #[test]
    fn test_verify() {
        let hash = hash_password("correct horse 9").unwrap();
        assert!(verify_password("correct horse 9", &hash).unwrap());
        assert!(!verify_password("correct horse 8", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(matches!(
            verify_password("x", "not-a-hash"),
            Err(PasswordError::InvalidHash(_))
        ));
        assert!(verify_password("x", "$argon2id$broken").is_err());
    }

    #[test]
    fn test_strength_rules() {
        assert!(validate_password_strength("picnic2025").is_ok());
        assert!(validate_password_strength("Ünïcode-pass-1").is_ok());

        let too_long = "a1".repeat(65);
        for weak in ["short1", "nodigitshere", "1234567890", too_long.as_str()] {
            assert!(
                matches!(validate_password_strength(weak), Err(PasswordError::TooWeak(_))),
                "{weak} should be rejected"
            );
        }
    }
}
