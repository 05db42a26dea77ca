//! Database query modules.

pub mod auth;
pub mod downloads;
pub mod entitlements;
pub mod users;
pub mod videos;
