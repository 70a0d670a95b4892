//! Domain layer - Core user record types and value objects.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.
//! Storage adapters and the store service build on these types.

pub mod constants;
pub mod error;
pub mod policy;
pub mod user;

pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use policy::{CaseSensitivity, UsernamePolicy};
pub use user::{NewUser, UserId, UserPatch, UserRecord};
