//! Keyed exclusion locks.
//!
//! Every mutating store operation locks the ids and username keys it touches.
//! Two operations conflict exactly when their key sets intersect, so
//! unrelated operations never wait on each other.
//!
//! A single `acquire` call sorts its keys before locking them, and callers
//! take at most one id lock before any username locks. Waiting is bounded by
//! the manager's timeout; running out of time yields `AppError::Timeout`.
//! Operations that lock in stages share one deadline across the stages via
//! [`LockManager::deadline`] and [`LockManager::acquire_until`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};

use common::{AppError, AppResult};
use domain::UserId;

/// A resource that can be locked.
///
/// `Id` sorts before `Username`, which keeps mixed acquisitions ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Id(UserId),
    /// Holds the username *key* (after case folding), not the raw name
    Username(String),
}

impl LockKey {
    pub fn id(id: UserId) -> Self {
        LockKey::Id(id)
    }

    pub fn username(key: impl Into<String>) -> Self {
        LockKey::Username(key.into())
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Id(id) => write!(f, "id:{}", id),
            LockKey::Username(key) => write!(f, "username:{}", key),
        }
    }
}

/// In-process lock table keyed by [`LockKey`].
///
/// Entries are weak so the table only holds mutexes somebody is holding or
/// waiting on.
pub struct LockManager {
    slots: Mutex<HashMap<LockKey, Weak<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Deadline for an operation starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    /// Lock every key in `keys`, or none of them.
    ///
    /// Duplicate keys are collapsed. The whole set shares one deadline.
    pub async fn acquire<I>(&self, keys: I) -> AppResult<LockGuard>
    where
        I: IntoIterator<Item = LockKey>,
    {
        self.acquire_until(self.deadline(), keys).await
    }

    /// Like [`acquire`](Self::acquire), but waits no later than `deadline`.
    pub async fn acquire_until<I>(&self, deadline: Instant, keys: I) -> AppResult<LockGuard>
    where
        I: IntoIterator<Item = LockKey>,
    {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());

        for key in &keys {
            let slot = self.slot(key);
            match timeout_at(deadline, slot.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    tracing::warn!(
                        lock = %key,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Timed out waiting for lock"
                    );
                    return Err(AppError::timeout(key.to_string()));
                }
            }
        }

        tracing::debug!(keys = ?keys, "Locks acquired");
        Ok(LockGuard {
            keys,
            _guards: guards,
        })
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.strong_count() > 0).count()
    }

    fn slot(&self, key: &LockKey) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(slot) = slots.get(key).and_then(Weak::upgrade) {
            return slot;
        }

        slots.retain(|_, slot| slot.strong_count() > 0);
        let slot = Arc::new(AsyncMutex::new(()));
        slots.insert(key.clone(), Arc::downgrade(&slot));
        slot
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("timeout", &self.timeout)
            .field("active_keys", &self.active_keys())
            .finish()
    }
}

/// Held locks; released when dropped.
pub struct LockGuard {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockGuard {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("keys", &self.keys).finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        tracing::trace!(keys = ?self.keys, "Locks released");
    }
}
