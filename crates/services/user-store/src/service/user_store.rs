//! User store - create, read, update, delete and lookup by username.
//!
//! `UserManager` owns the exclusion rules: every write locks the id and
//! username keys it touches (see [`crate::infra::locks`]) before checking and
//! mutating the repository, so uniqueness checks and writes never interleave
//! with a conflicting operation. Reads are single repository snapshots.

use async_trait::async_trait;
use std::sync::Arc;

use common::{AppError, AppResult, OptionExt};
use domain::{NewUser, UserId, UserPatch, UserRecord, UsernamePolicy};

use super::listing::{Page, PageRequest};
use crate::infra::{LockKey, LockManager};
use crate::repository::UserRepository;

/// User store trait for dependency injection.
///
/// All operations only see live users; deleted users behave as absent.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user with a freshly assigned id
    async fn create(&self, new_user: NewUser) -> AppResult<UserRecord>;

    /// Get live user by ID
    async fn get_by_id(&self, id: UserId) -> AppResult<UserRecord>;

    /// Get live user by username (compared under the configured policy)
    async fn get_by_username(&self, username: &str) -> AppResult<UserRecord>;

    /// Check whether a live user holds `username`
    async fn exists_by_username(&self, username: &str) -> AppResult<bool>;

    /// Update username and/or payload of a live user
    async fn update(&self, id: UserId, patch: UserPatch) -> AppResult<UserRecord>;

    /// Delete user, releasing its username for reuse
    async fn delete(&self, id: UserId) -> AppResult<()>;

    /// One page of live users ordered by id
    async fn list(&self, request: PageRequest) -> AppResult<Page<UserRecord>>;

    /// Count live users
    async fn count(&self) -> AppResult<u64>;
}

/// Concrete implementation of UserStore over a repository.
pub struct UserManager {
    repo: Arc<dyn UserRepository>,
    locks: Arc<LockManager>,
    policy: UsernamePolicy,
}

impl UserManager {
    /// Create new user store with repository, lock table and username rules
    pub fn new(
        repo: Arc<dyn UserRepository>,
        locks: Arc<LockManager>,
        policy: UsernamePolicy,
    ) -> Self {
        Self {
            repo,
            locks,
            policy,
        }
    }
}

#[async_trait]
impl UserStore for UserManager {
    async fn create(&self, new_user: NewUser) -> AppResult<UserRecord> {
        let new_user = self.policy.prepare_new(new_user)?;
        let key = self.policy.key(&new_user.username);

        let _guard = self.locks.acquire([LockKey::username(key.clone())]).await?;

        if self.repo.find_by_username_key(&key).await?.is_some() {
            tracing::warn!(username = %new_user.username, "Rejected duplicate username");
            return Err(AppError::duplicate_username(new_user.username));
        }

        let record = self
            .repo
            .insert(UserRecord::new(new_user.username, new_user.payload), key)
            .await?;

        tracing::info!(user_id = %record.id, username = %record.username, "User created");
        Ok(record)
    }

    async fn get_by_id(&self, id: UserId) -> AppResult<UserRecord> {
        self.repo.find_by_id(id).await?.ok_or_not_found()
    }

    async fn get_by_username(&self, username: &str) -> AppResult<UserRecord> {
        let key = self.policy.lookup_key(username)?;
        self.repo.find_by_username_key(&key).await?.ok_or_not_found()
    }

    async fn exists_by_username(&self, username: &str) -> AppResult<bool> {
        let key = self.policy.lookup_key(username)?;
        Ok(self.repo.find_by_username_key(&key).await?.is_some())
    }

    async fn update(&self, id: UserId, patch: UserPatch) -> AppResult<UserRecord> {
        let patch = self.policy.prepare_patch(patch)?;

        // id first, then the username set; never the other way round.
        // Both stages share one deadline.
        let deadline = self.locks.deadline();
        let _id_guard = self.locks.acquire_until(deadline, [LockKey::id(id)]).await?;
        let mut record = self.repo.find_by_id(id).await?.ok_or_not_found()?;

        if patch.is_empty() {
            return Ok(record);
        }

        let old_key = self.policy.key(&record.username);
        let new_key = match &patch.username {
            Some(username) => self.policy.key(username),
            None => old_key.clone(),
        };

        let _name_guard = self
            .locks
            .acquire_until(
                deadline,
                [
                    LockKey::username(old_key.clone()),
                    LockKey::username(new_key.clone()),
                ],
            )
            .await?;

        if new_key != old_key {
            if let Some(owner) = self.repo.find_by_username_key(&new_key).await? {
                if owner.id != id {
                    let requested = patch.username.unwrap_or_default();
                    tracing::warn!(user_id = %id, username = %requested, "Rejected duplicate username");
                    return Err(AppError::duplicate_username(requested));
                }
            }
        }

        record.apply(patch);
        let updated = self.repo.update(record, new_key).await?;

        tracing::info!(user_id = %updated.id, username = %updated.username, "User updated");
        Ok(updated)
    }

    async fn delete(&self, id: UserId) -> AppResult<()> {
        let deadline = self.locks.deadline();
        let _id_guard = self.locks.acquire_until(deadline, [LockKey::id(id)]).await?;
        let record = self.repo.find_by_id(id).await?.ok_or_not_found()?;

        let key = self.policy.key(&record.username);
        let _name_guard = self
            .locks
            .acquire_until(deadline, [LockKey::username(key)])
            .await?;

        self.repo.soft_delete(id).await?;

        tracing::info!(user_id = %id, username = %record.username, "User deleted");
        Ok(())
    }

    async fn list(&self, request: PageRequest) -> AppResult<Page<UserRecord>> {
        let limit = request.limit();
        let items = self.repo.list_after(request.cursor, limit).await?;
        Ok(Page::from_batch(items, limit))
    }

    async fn count(&self) -> AppResult<u64> {
        self.repo.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mockall::predicate::eq;
    use serde_json::json;
    use uuid::Uuid;

    use domain::CaseSensitivity;

    use crate::repository::MockUserRepository;

    fn manager_with(repo: MockUserRepository, policy: UsernamePolicy) -> UserManager {
        let locks = Arc::new(LockManager::new(Duration::from_millis(100)));
        UserManager::new(Arc::new(repo), locks, policy)
    }

    fn manager(repo: MockUserRepository) -> UserManager {
        manager_with(repo, UsernamePolicy::default())
    }

    fn existing(username: &str) -> UserRecord {
        UserRecord::new(username.to_string(), json!({"plan": "free"}))
    }

    #[tokio::test]
    async fn test_create_user_success() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_username_key()
            .times(1)
            .returning(|_| Ok(None));
        repo.expect_insert()
            .times(1)
            .returning(|record, key| {
                assert_eq!(key, "alice");
                Ok(record)
            });

        let store = manager(repo);
        let created = store
            .create(NewUser::new("alice", json!({"age": 30})))
            .await
            .unwrap();

        assert_eq!(created.username, "alice");
        assert_eq!(created.payload, json!({"age": 30}));
    }

    #[tokio::test]
    async fn test_create_duplicate_never_inserts() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_username_key()
            .returning(|_| Ok(Some(existing("alice"))));
        repo.expect_insert().times(0);

        let result = manager(repo).create(NewUser::new("alice", json!({}))).await;
        assert!(matches!(result, Err(AppError::DuplicateUsername(u)) if u == "alice"));
    }

    #[tokio::test]
    async fn test_create_invalid_input_skips_repository() {
        // no expectations: any repository call panics
        let repo = MockUserRepository::new();
        let result = manager(repo).create(NewUser::new("", json!({}))).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let user_id = Uuid::now_v7();

        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .with(eq(user_id))
            .returning(|_| Ok(None));

        let result = manager(repo).get_by_id(user_id).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_get_by_username_folds_case() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_username_key()
            .times(1)
            .returning(|key| {
                assert_eq!(key, "alice");
                Ok(Some(existing("Alice")))
            });

        let policy = UsernamePolicy::new(CaseSensitivity::Insensitive, false);
        let found = manager_with(repo, policy)
            .get_by_username("ALICE")
            .await
            .unwrap();
        assert_eq!(found.username, "Alice");
    }

    #[tokio::test]
    async fn test_exists_by_username() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_username_key()
            .returning(|key| Ok((key == "bob").then(|| existing("bob"))));

        let store = manager(repo);
        assert!(store.exists_by_username("bob").await.unwrap());
        assert!(!store.exists_by_username("carol").await.unwrap());
        assert!(matches!(
            store.exists_by_username("").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_update_collision_leaves_records_alone() {
        let carol = existing("carol");
        let carol_id = carol.id;

        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .with(eq(carol_id))
            .returning(move |_| Ok(Some(carol.clone())));
        repo.expect_find_by_username_key()
            .returning(|_| Ok(Some(existing("bob"))));
        repo.expect_update().times(0);

        let result = manager(repo)
            .update(carol_id, UserPatch::username("bob"))
            .await;
        assert!(matches!(result, Err(AppError::DuplicateUsername(u)) if u == "bob"));
    }

    #[tokio::test]
    async fn test_update_case_only_rename_skips_collision_check() {
        let alice = existing("alice");
        let alice_id = alice.id;

        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(alice.clone())));
        repo.expect_find_by_username_key().times(0);
        repo.expect_update()
            .times(1)
            .returning(|record, key| {
                assert_eq!(key, "alice");
                Ok(record)
            });

        let policy = UsernamePolicy::new(CaseSensitivity::Insensitive, false);
        let updated = manager_with(repo, policy)
            .update(alice_id, UserPatch::username("Alice"))
            .await
            .unwrap();
        assert_eq!(updated.username, "Alice");
        assert_eq!(updated.id, alice_id);
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(None));

        let result = manager(repo)
            .update(Uuid::now_v7(), UserPatch::payload(json!({})))
            .await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_empty_patch_returns_current_record() {
        let alice = existing("alice");
        let expected = alice.clone();

        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(alice.clone())));
        repo.expect_update().times(0);

        let result = manager(repo)
            .update(expected.id, UserPatch::default())
            .await
            .unwrap();
        assert_eq!(result, expected);
    }

    #[tokio::test]
    async fn test_delete_user_success() {
        let alice = existing("alice");
        let alice_id = alice.id;

        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(alice.clone())));
        repo.expect_soft_delete()
            .with(eq(alice_id))
            .times(1)
            .returning(|_| Ok(()));

        assert!(manager(repo).delete(alice_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_user() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(None));
        repo.expect_soft_delete().times(0);

        let result = manager(repo).delete(Uuid::now_v7()).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_clamps_limit_and_sets_cursor() {
        let mut repo = MockUserRepository::new();
        repo.expect_list_after()
            .with(eq(None::<UserId>), eq(100u64))
            .returning(|_, limit| {
                Ok((0..limit)
                    .map(|i| existing(&format!("user{}", i)))
                    .collect())
            });

        let page = manager(repo)
            .list(PageRequest::first(1_000))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 100);
        assert_eq!(page.next_cursor, page.items.last().map(|r| r.id));
    }

    #[tokio::test]
    async fn test_create_times_out_when_username_locked() {
        let repo = MockUserRepository::new();
        let locks = Arc::new(LockManager::new(Duration::from_millis(30)));
        let store = UserManager::new(Arc::new(repo), locks.clone(), UsernamePolicy::default());

        let _held = locks.acquire([LockKey::username("alice")]).await.unwrap();
        let result = store.create(NewUser::new("alice", json!({}))).await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
    }

    /// Holds `id` on another task for `hold`, then releases it.
    async fn hold_id(locks: &Arc<LockManager>, id: UserId, hold: Duration) {
        let guard = locks.acquire([LockKey::id(id)]).await.unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            drop(guard);
        });
    }

    #[tokio::test]
    async fn test_update_lock_wait_is_bounded_across_stages() {
        let alice = existing("alice");
        let alice_id = alice.id;

        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(alice.clone())));
        repo.expect_update().times(0);

        let bound = Duration::from_millis(200);
        let locks = Arc::new(LockManager::new(bound));
        let store = UserManager::new(Arc::new(repo), locks.clone(), UsernamePolicy::default());

        let _name = locks.acquire([LockKey::username("alice")]).await.unwrap();
        hold_id(&locks, alice_id, Duration::from_millis(180)).await;

        let started = tokio::time::Instant::now();
        let result = store
            .update(alice_id, UserPatch::payload(json!({"plan": "pro"})))
            .await;
        let waited = started.elapsed();

        assert!(matches!(result, Err(AppError::Timeout(resource)) if resource == "username:alice"));
        assert!(waited <= bound + Duration::from_millis(50), "waited {:?}", waited);
    }

    #[tokio::test]
    async fn test_delete_lock_wait_is_bounded_across_stages() {
        let alice = existing("alice");
        let alice_id = alice.id;

        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(alice.clone())));
        repo.expect_soft_delete().times(0);

        let bound = Duration::from_millis(200);
        let locks = Arc::new(LockManager::new(bound));
        let store = UserManager::new(Arc::new(repo), locks.clone(), UsernamePolicy::default());

        let _name = locks.acquire([LockKey::username("alice")]).await.unwrap();
        hold_id(&locks, alice_id, Duration::from_millis(180)).await;

        let started = tokio::time::Instant::now();
        let result = store.delete(alice_id).await;
        let waited = started.elapsed();

        assert!(matches!(result, Err(AppError::Timeout(resource)) if resource == "username:alice"));
        assert!(waited <= bound + Duration::from_millis(50), "waited {:?}", waited);
    }

    #[tokio::test]
    async fn test_update_times_out_when_id_locked() {
        let repo = MockUserRepository::new();
        let locks = Arc::new(LockManager::new(Duration::from_millis(30)));
        let store = UserManager::new(Arc::new(repo), locks.clone(), UsernamePolicy::default());

        let id = Uuid::now_v7();
        let _held = locks.acquire([LockKey::id(id)]).await.unwrap();
        let result = store.update(id, UserPatch::username("bob")).await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_storage_errors_propagate() {
        let mut repo = MockUserRepository::new();
        repo.expect_count()
            .returning(|| Err(AppError::storage_unavailable("connection refused")));

        let result = manager(repo).count().await;
        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
    }
}
