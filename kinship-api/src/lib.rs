//! # Kinship API Server Library
//!
//! HTTP surface of Kinship, a family event planner: families and their group
//! trees, events with RSVPs, invite codes, calendar export and holiday
//! generation.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Environment configuration
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Bearer authentication and security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
