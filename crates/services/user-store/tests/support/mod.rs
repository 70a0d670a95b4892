//! Store builders and invariant checks shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use sea_orm::ConnectOptions;

use domain::UsernamePolicy;
use user_store_lib::infra::{Database, LockManager};
use user_store_lib::repository::{MemoryUserRepository, SqlUserRepository};
use user_store_lib::{stream_users, UserManager, UserRecord, UserStore};

const TEST_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub fn memory_store_with(policy: UsernamePolicy) -> Arc<dyn UserStore> {
    let locks = Arc::new(LockManager::new(TEST_LOCK_TIMEOUT));
    Arc::new(UserManager::new(
        Arc::new(MemoryUserRepository::new()),
        locks,
        policy,
    ))
}

pub fn memory_store() -> Arc<dyn UserStore> {
    memory_store_with(UsernamePolicy::default())
}

pub async fn sqlite_store_with(policy: UsernamePolicy) -> Arc<dyn UserStore> {
    // one pinned connection: every new in-memory connection is a new database
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect_with(options)
        .await
        .expect("in-memory sqlite should open");
    let locks = Arc::new(LockManager::new(TEST_LOCK_TIMEOUT));

    Arc::new(UserManager::new(
        Arc::new(SqlUserRepository::new(db.get_connection())),
        locks,
        policy,
    ))
}

pub async fn sqlite_store() -> Arc<dyn UserStore> {
    sqlite_store_with(UsernamePolicy::default()).await
}

/// Every live user, walked through the paging stream.
pub async fn all_users(store: &Arc<dyn UserStore>) -> Vec<UserRecord> {
    stream_users(store.clone(), None, 7)
        .try_collect()
        .await
        .expect("listing should succeed")
}

/// No two live users share a username, and the count agrees with the listing.
pub async fn assert_unique_usernames(store: &Arc<dyn UserStore>) {
    let users = all_users(store).await;
    let names: HashSet<&str> = users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names.len(), users.len(), "duplicate live username in {:?}", users);
    assert_eq!(store.count().await.unwrap(), users.len() as u64);
}
