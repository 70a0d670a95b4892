//! User Store Library
//!
//! Persistence core for user account records: id-keyed storage with a unique,
//! indexed username. The store is used in-process by an application layer;
//! the `user-store` binary is a thin administrative CLI over the same API.

pub mod config;
pub mod infra;
pub mod repository;
pub mod service;

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageBackend, UserStoreConfig};
use crate::infra::{Database, LockManager};
use crate::repository::{MemoryUserRepository, SqlUserRepository, UserRepository};

pub use common::{AppError, AppResult};
pub use domain::{NewUser, UserId, UserPatch, UserRecord};
pub use service::{stream_users, Page, PageRequest, UserManager, UserStore};

/// Open a user store for the configured backend.
///
/// For the SQL backend this connects and applies the users schema first.
pub async fn open_store(config: &UserStoreConfig) -> AppResult<Arc<dyn UserStore>> {
    let policy = config.username.policy()?;
    let locks = Arc::new(LockManager::new(config.lock.timeout()));

    let repo: Arc<dyn UserRepository> = match config.backend {
        StorageBackend::Sql => {
            let db = Database::connect(&config.database).await?;
            Arc::new(SqlUserRepository::new(db.get_connection()))
        }
        StorageBackend::Memory => Arc::new(MemoryUserRepository::new()),
    };

    info!(
        backend = ?config.backend,
        lock_timeout_ms = config.lock.timeout_ms,
        case = ?policy.case(),
        trim = policy.trims(),
        "User store ready"
    );

    Ok(Arc::new(UserManager::new(repo, locks, policy)))
}

/// Prepare the backing storage without opening a store.
pub async fn initialize(config: &UserStoreConfig) -> AppResult<()> {
    match config.backend {
        StorageBackend::Sql => {
            let db = Database::connect(&config.database).await?;
            db.ping().await?;
            info!("Users schema is up to date");
        }
        StorageBackend::Memory => {
            info!("Memory backend needs no initialization");
        }
    }
    Ok(())
}
