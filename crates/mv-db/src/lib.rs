//! mv-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, typed models, and query modules for users, the
//! catalog snapshot, entitlements, credit reservations and download history.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
