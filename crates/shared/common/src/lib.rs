//! Common utilities shared across the user store crates.
//!
//! This crate provides:
//! - The error taxonomy surfaced to callers of the store
//! - Configuration structures

pub mod config;
pub mod error;

pub use config::*;
pub use error::{AppError, AppResult, OptionExt};
