/// Signed personal calendar feed tokens
///
/// Calendar apps cannot send bearer headers, so the personal feed URL carries
/// its own credential: `<user-id>.<hex HMAC-SHA256(secret, user-id)>`. The
/// token never expires; rotating the feed secret revokes every feed URL.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeedTokenError {
    #[error("Malformed feed token")]
    Malformed,

    #[error("Feed token signature mismatch")]
    BadSignature,
}

fn mac_for(user_id: Uuid, secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(user_id.to_string().as_bytes());
    mac
}

pub fn sign_feed_token(user_id: Uuid, secret: &str) -> String {
    let signature = mac_for(user_id, secret).finalize().into_bytes();
    format!("{}.{}", user_id, hex::encode(signature))
}

/// Returns the user id the token was issued for
pub fn verify_feed_token(token: &str, secret: &str) -> Result<Uuid, FeedTokenError> {
    let (user_part, signature_part) = token.split_once('.').ok_or(FeedTokenError::Malformed)?;
    let user_id = Uuid::parse_str(user_part).map_err(|_| FeedTokenError::Malformed)?;
    let signature = hex::decode(signature_part).map_err(|_| FeedTokenError::Malformed)?;

    mac_for(user_id, secret)
        .verify_slice(&signature)
        .map_err(|_| FeedTokenError::BadSignature)?;

    Ok(user_id)
}
