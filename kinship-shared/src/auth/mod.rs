/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength rules
/// - [`jwt`]: access/refresh session tokens
/// - [`tokens`]: activation, password-reset and phone verification secrets
/// - [`feed_token`]: signed personal calendar feed URLs
/// - [`middleware`]: bearer authentication into an [`middleware::AuthContext`]
/// - [`authorization`]: role, host and family-scope checks

pub mod authorization;
pub mod feed_token;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod tokens;
