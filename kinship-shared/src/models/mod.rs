/// Database models for Kinship
///
/// Each model owns its row type and the queries that read and write it.
/// Cross-row logic (tree resolution, RSVP scoping, holiday dedup) lives in
/// the pure modules at the crate root.
///
/// # Models
///
/// - `user`: accounts, active family/group pointers, preferences
/// - `family`: top-level tenants and their invite codes
/// - `membership`: historical family membership
/// - `group`: per-family group tree
/// - `event`: family events and co-hosts
/// - `rsvp`: attendance responses
/// - `token`: activation, password reset and phone verification secrets
///
/// # Example
///
/// ```no_run
/// use kinship_shared::models::user::{User, CreateUser, UserRole};
/// use kinship_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let mut conn = pool.acquire().await?;
///
/// let user = User::create(&mut conn, CreateUser {
///     handle: "nana".to_string(),
///     email: Some("nana@example.com".to_string()),
///     password_hash: "$argon2id$...".to_string(),
///     display_name: "Nana".to_string(),
///     role: UserRole::Member,
///     approved: false,
///     family_id: None,
/// }).await?;
/// # Ok(())
/// # }
/// ```

pub mod event;
pub mod family;
pub mod group;
pub mod membership;
pub mod rsvp;
pub mod token;
pub mod user;
