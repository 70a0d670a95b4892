//! In-memory user repository.
//!
//! Records and the username index share one `RwLock`, so every write moves
//! both together and readers only ever see a consistent pair. Deleting a
//! record drops it entirely; only its id is kept, so it is never issued again.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::UserRepository;
use common::{AppError, AppResult};
use domain::{UserId, UserRecord};

struct StoredUser {
    record: UserRecord,
    username_key: String,
}

#[derive(Default)]
struct MemoryState {
    /// Live records only
    records: BTreeMap<UserId, StoredUser>,
    /// username key -> id
    live_keys: HashMap<String, UserId>,
    /// Ids of deleted records
    retired: HashSet<UserId>,
}

/// Process-local implementation of UserRepository.
#[derive(Default)]
pub struct MemoryUserRepository {
    state: RwLock<MemoryState>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids ever stored, deleted ones included.
    pub async fn len_with_deleted(&self) -> usize {
        let state = self.state.read().await;
        state.records.len() + state.retired.len()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: UserId) -> AppResult<Option<UserRecord>> {
        let state = self.state.read().await;
        Ok(state.records.get(&id).map(|stored| stored.record.clone()))
    }

    async fn find_by_username_key(&self, key: &str) -> AppResult<Option<UserRecord>> {
        let state = self.state.read().await;
        Ok(state
            .live_keys
            .get(key)
            .and_then(|id| state.records.get(id))
            .map(|stored| stored.record.clone()))
    }

    async fn insert(&self, record: UserRecord, username_key: String) -> AppResult<UserRecord> {
        let mut state = self.state.write().await;

        if state.live_keys.contains_key(&username_key) {
            return Err(AppError::duplicate_username(record.username));
        }
        if state.records.contains_key(&record.id) || state.retired.contains(&record.id) {
            return Err(AppError::internal(format!("User id {} already issued", record.id)));
        }

        state.live_keys.insert(username_key.clone(), record.id);
        state.records.insert(
            record.id,
            StoredUser {
                record: record.clone(),
                username_key,
            },
        );

        Ok(record)
    }

    async fn update(&self, record: UserRecord, username_key: String) -> AppResult<UserRecord> {
        let mut state = self.state.write().await;

        let old_key = state
            .records
            .get(&record.id)
            .map(|stored| stored.username_key.clone())
            .ok_or(AppError::NotFound)?;

        if old_key != username_key {
            if let Some(owner) = state.live_keys.get(&username_key) {
                if *owner != record.id {
                    return Err(AppError::duplicate_username(record.username));
                }
            }
            state.live_keys.remove(&old_key);
            state.live_keys.insert(username_key.clone(), record.id);
        }

        if let Some(stored) = state.records.get_mut(&record.id) {
            stored.record = record.clone();
            stored.username_key = username_key;
        }

        Ok(record)
    }

    async fn soft_delete(&self, id: UserId) -> AppResult<()> {
        let mut state = self.state.write().await;

        let stored = state.records.remove(&id).ok_or(AppError::NotFound)?;
        state.live_keys.remove(&stored.username_key);
        state.retired.insert(id);
        Ok(())
    }

    async fn list_after(&self, cursor: Option<UserId>, limit: u64) -> AppResult<Vec<UserRecord>> {
        let state = self.state.read().await;

        let lower = match cursor {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Unbounded,
        };

        Ok(state
            .records
            .range((lower, Bound::Unbounded))
            .take(limit as usize)
            .map(|(_, stored)| stored.record.clone())
            .collect())
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.state.read().await.records.len() as u64)
    }
}
