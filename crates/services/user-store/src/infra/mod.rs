//! Infrastructure layer - database, schema and exclusion locks.

mod db;
pub mod locks;
pub mod migrations;

pub use db::Database;
pub use locks::{LockGuard, LockKey, LockManager};
pub use migrations::Migrator;
