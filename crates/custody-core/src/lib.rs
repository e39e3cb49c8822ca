//! Custody Core Library
//!
//! Shared types, the signature codec and the custody service client used by
//! the vault keyring.

pub mod api;
pub mod config;
pub mod error;
pub mod signing;
pub mod types;

pub use error::{Error, Result};
