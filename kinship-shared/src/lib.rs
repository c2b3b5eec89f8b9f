//! # Kinship Shared Library
//!
//! Domain logic for the Kinship family calendar, used by the API server.
//!
//! ## Module Organization
//!
//! - `models`: Database models and queries
//! - `hierarchy`: Family/group forest resolution
//! - `rsvp_batch`: RSVP batch scope and planning
//! - `invite`: Invite code generation, rotation and redemption
//! - `context`: Active family/group transitions
//! - `ics`: iCalendar export
//! - `holidays`: Holiday feed client and deduplication
//! - `mail`: Outbound email
//! - `auth`: Authentication and authorization utilities
//! - `db`: Pool and migrations

pub mod auth;
pub mod context;
pub mod db;
pub mod hierarchy;
pub mod holidays;
pub mod ics;
pub mod invite;
pub mod mail;
pub mod models;
pub mod rsvp_batch;

/// Current version of the Kinship shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
