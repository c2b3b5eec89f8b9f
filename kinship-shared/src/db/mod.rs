/// Database layer for Kinship
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with a startup health check
/// - `migrations`: embedded schema migrations (`migrations/` at the workspace root)
///
/// Models live in the `models` module at crate root level.

pub mod migrations;
pub mod pool;
