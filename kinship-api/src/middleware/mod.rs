/// Middleware for the API server
///
/// - `security`: security response headers
/// - `auth`: bearer authentication for `/v1` routes

pub mod auth;
pub mod security;
