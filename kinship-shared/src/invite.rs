//! Invite codes for families and groups
//!
//! Codes are 8 characters drawn uniformly from a 32-symbol alphabet without
//! the easily confused `0/O` and `1/I`. Family codes are unique across
//! families and group codes across groups; both are enforced by unique
//! constraints, with an existence check up front and bounded regeneration on
//! collision.
//!
//! # Example
//!
//! ```no_run
//! use kinship_shared::invite::{redeem, rotate_family_code, Redemption};
//! # async fn example(pool: sqlx::PgPool, user: kinship_shared::models::user::User, family_id: uuid::Uuid) -> Result<(), Box<dyn std::error::Error>> {
//! let family = rotate_family_code(&pool, family_id).await?;
//!
//! match redeem(&pool, &user, "K7MQ2XPA").await? {
//!     Redemption::Family { family, .. } => println!("joined {}", family.name),
//!     Redemption::Group { group, .. } => println!("joined {}", group.nickname),
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::context::ActiveContext;
use crate::models::{family::Family, group::Group, membership::FamilyMembership, user::User};

/// 32 symbols, no `0`, `O`, `1` or `I`
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LENGTH: usize = 8;

/// Upper bound on generate-and-check rounds per request
pub const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("Could not find a free invite code after {attempts} attempts")]
    ExhaustedCodeSpace { attempts: usize },

    #[error("Invite code not found")]
    UnknownCode,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Random code using the thread-local RNG
pub fn generate_code() -> String {
    generate_code_with(&mut rand::thread_rng())
}

pub fn generate_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Whether `code` has the right length and only alphabet symbols
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

/// Canonical form of user input: trimmed and uppercased
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Generates a code for which `is_taken` answers `false`
///
/// # Errors
///
/// `ExhaustedCodeSpace` after [`MAX_CODE_ATTEMPTS`] taken candidates.
pub async fn generate_unique_code<C, CFut>(is_taken: C) -> Result<String, InviteError>
where
    C: FnMut(String) -> CFut,
    CFut: Future<Output = Result<bool, sqlx::Error>>,
{
    write_with_fresh_code(is_taken, |code| async move { Ok(code) }).await
}

/// Generates a free code and hands it to `write`
///
/// A unique violation from `write` means another writer claimed the code
/// between the check and the write; that round counts against the same
/// budget and a new code is drawn.
pub async fn write_with_fresh_code<T, C, CFut, W, WFut>(
    mut is_taken: C,
    mut write: W,
) -> Result<T, InviteError>
where
    C: FnMut(String) -> CFut,
    CFut: Future<Output = Result<bool, sqlx::Error>>,
    W: FnMut(String) -> WFut,
    WFut: Future<Output = Result<T, sqlx::Error>>,
{
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = generate_code();

        if is_taken(code.clone()).await? {
            tracing::debug!(attempt, "Invite code collision");
            continue;
        }

        match write(code).await {
            Ok(value) => return Ok(value),
            Err(err) if is_unique_violation(&err) => {
                tracing::warn!(attempt, "Invite code claimed concurrently, regenerating");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(InviteError::ExhaustedCodeSpace {
        attempts: MAX_CODE_ATTEMPTS,
    })
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Replaces a family's code. Returns `None` if the family does not exist.
pub async fn rotate_family_code(
    pool: &PgPool,
    family_id: Uuid,
) -> Result<Option<Family>, InviteError> {
    write_with_fresh_code(
        |code| async move { Family::code_exists(pool, &code).await },
        |code| async move {
            let mut tx = pool.begin().await?;
            let family = Family::set_invite_code(&mut tx, family_id, &code).await?;
            tx.commit().await?;
            Ok(family)
        },
    )
    .await
}

/// Replaces a group's code. Returns `None` if the group does not exist.
pub async fn rotate_group_code(pool: &PgPool, group_id: Uuid) -> Result<Option<Group>, InviteError> {
    write_with_fresh_code(
        |code| async move { Group::code_exists(pool, &code).await },
        |code| async move {
            let mut tx = pool.begin().await?;
            let group = Group::set_invite_code(&mut tx, group_id, &code).await?;
            tx.commit().await?;
            Ok(group)
        },
    )
    .await
}

/// Creates a family with a fresh code and makes it the founder's active one
///
/// The root group, the founder's context and the membership row are written
/// in the same transaction as the family.
pub async fn create_family(
    pool: &PgPool,
    founder_id: Uuid,
    name: &str,
) -> Result<(Family, Group), InviteError> {
    let (family, root) = write_with_fresh_code(
        |code| async move { Family::code_exists(pool, &code).await },
        |code| async move {
            let mut tx = pool.begin().await?;
            let family = Family::create(&mut tx, name, &code).await?;
            let root = Group::ensure_root_in(&mut tx, &family).await?;
            let context = ActiveContext::default().switch_family(family.id);
            User::set_context(&mut tx, founder_id, context).await?;
            FamilyMembership::record(&mut tx, family.id, founder_id).await?;
            tx.commit().await?;
            Ok((family, root))
        },
    )
    .await?;

    tracing::info!(family_id = %family.id, founder_id = %founder_id, "Family created");
    Ok((family, root))
}

/// What a redeemed code resolved to, with the caller's new context
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Redemption {
    Family {
        family: Family,
        context: ActiveContext,
    },
    Group {
        group: Group,
        context: ActiveContext,
    },
}

impl Redemption {
    pub fn context(&self) -> ActiveContext {
        match self {
            Redemption::Family { context, .. } | Redemption::Group { context, .. } => *context,
        }
    }
}

/// Joins a family or group by code
///
/// Family codes take precedence. A family code makes that family active
/// and clears the active group. A group code switches family first when the
/// group lives in another family, then makes the group active. Either way a
/// membership row is recorded.
///
/// # Errors
///
/// `UnknownCode` when no family or group carries the code.
pub async fn redeem(pool: &PgPool, user: &User, code: &str) -> Result<Redemption, InviteError> {
    let code = normalize_code(code);
    if !is_valid_code(&code) {
        return Err(InviteError::UnknownCode);
    }

    let redemption = if let Some(family) = Family::find_by_invite_code(pool, &code).await? {
        let context = user.context().switch_family(family.id);
        Redemption::Family { family, context }
    } else if let Some(group) = Group::find_by_invite_code(pool, &code).await? {
        let context = user.context().join_group(&group);
        Redemption::Group { group, context }
    } else {
        return Err(InviteError::UnknownCode);
    };

    let context = redemption.context();
    let mut tx = pool.begin().await?;
    User::set_context(&mut tx, user.id, context).await?;
    if let Some(family_id) = context.family_id {
        FamilyMembership::record(&mut tx, family_id, user.id).await?;
    }
    tx.commit().await?;

    tracing::info!(
        user_id = %user.id,
        family_id = ?context.family_id,
        group_id = ?context.group_id,
        "Invite code redeemed"
    );

    Ok(redemption)
}
