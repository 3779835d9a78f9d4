//! Listing marketplace backend: property listings, bookmarks, user accounts
//! with password reset, and a shared-secret admin gate, over interchangeable
//! file, Postgres and in-memory stores.

pub mod admin;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod listings;
pub mod logging;
pub mod maintenance;
pub mod saved;
pub mod state;
pub mod store;
