/// Single-use secrets for email activation, password reset and phone checks
///
/// Link tokens are 48 random alphanumeric characters. Only their SHA-256 hex
/// digest is stored; the plaintext exists in the emailed link alone.
/// Phone codes are 6 random digits stored as-is next to a short expiry.

use chrono::Duration;
use rand::Rng;
use sha2::{Digest, Sha256};

pub const LINK_TOKEN_LENGTH: usize = 48;

pub const PHONE_CODE_LENGTH: usize = 6;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn activation_ttl() -> Duration {
    Duration::hours(24)
}

pub fn password_reset_ttl() -> Duration {
    Duration::hours(1)
}

pub fn phone_code_ttl() -> Duration {
    Duration::minutes(10)
}

/// Returns `(plaintext, sha256_hex)`
pub fn generate_link_token() -> (String, String) {
    let mut rng = rand::thread_rng();
    let token: String = (0..LINK_TOKEN_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    let hash = hash_token(&token);

    (token, hash)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Cheap shape check before any database lookup
pub fn is_well_formed_link_token(token: &str) -> bool {
    token.len() == LINK_TOKEN_LENGTH && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Six digits, leading zeros allowed
pub fn generate_phone_code() -> String {
    let mut rng = rand::thread_rng();
    (0..PHONE_CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Byte comparison that does not stop at the first difference
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_token_shape_and_hash() {
        let (token, hash) = generate_link_token();
        assert!(is_well_formed_link_token(&token));
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token(&token));

        let (other, other_hash) = generate_link_token();
        assert_ne!(token, other);
        assert_ne!(hash, other_hash);
    }

    #[test]
    fn test_hash_token_known_value() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_malformed_link_tokens() {
        assert!(!is_well_formed_link_token(""));
        assert!(!is_well_formed_link_token("short"));
        assert!(!is_well_formed_link_token(&"-".repeat(LINK_TOKEN_LENGTH)));
    }

    #[test]
    fn test_phone_code() {
        for _ in 0..100 {
            let code = generate_phone_code();
            assert_eq!(code.len(), PHONE_CODE_LENGTH);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("123456", "123456"));
        assert!(!constant_time_eq("123456", "123457"));
        assert!(!constant_time_eq("12345", "123456"));
    }

    #[test]
    fn test_ttls() {
        assert_eq!(activation_ttl(), Duration::hours(24));
        assert_eq!(password_reset_ttl(), Duration::hours(1));
        assert_eq!(phone_code_ttl(), Duration::minutes(10));
    }
}
