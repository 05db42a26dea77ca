//! Route handlers for the HTTP API.

pub mod entitlement;
pub mod exports;
pub mod health;
