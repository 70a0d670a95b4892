//! Domain-level constants.
//!
//! These constants define business rules and validation requirements.

// =============================================================================
// Username
// =============================================================================

/// Maximum username length, in characters
pub const MAX_USERNAME_LENGTH: u64 = 64;

// =============================================================================
// Listing
// =============================================================================

/// Default number of records per page
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Maximum allowed records per page
pub const MAX_PAGE_SIZE: u64 = 100;

// =============================================================================
// Concurrency
// =============================================================================

/// Default bound on waiting for an id or username lock, in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;
