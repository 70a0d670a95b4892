//! Repository layer for data access.

pub mod entities;
mod memory_repository;
mod user_repository;

pub use memory_repository::MemoryUserRepository;
pub use user_repository::{SqlUserRepository, UserRepository};

// Export mock for tests (both unit and integration)
#[cfg(any(test, feature = "test-utils"))]
pub use user_repository::MockUserRepository;
