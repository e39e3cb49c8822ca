//! HTTP handlers.

pub mod accounts;
pub mod configuration;
pub mod events;
pub mod health;
pub mod requests;
