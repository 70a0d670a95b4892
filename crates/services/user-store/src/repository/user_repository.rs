//! User repository port and its SQL implementation with soft delete support.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};

use super::entities::user::{self, ActiveModel, Entity as UserEntity};
use common::{AppError, AppResult};
use domain::{UserId, UserRecord};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User repository trait for dependency injection.
///
/// Every read only sees live records; soft-deleted rows are invisible.
/// Implementations enforce username-key uniqueness among live records on
/// their own and report a collision as `AppError::DuplicateUsername`.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find live user by ID
    async fn find_by_id(&self, id: UserId) -> AppResult<Option<UserRecord>>;

    /// Find live user by normalized username key
    async fn find_by_username_key(&self, key: &str) -> AppResult<Option<UserRecord>>;

    /// Persist a new live record under `username_key`
    async fn insert(&self, record: UserRecord, username_key: String) -> AppResult<UserRecord>;

    /// Replace a live record and its username key in one step
    async fn update(&self, record: UserRecord, username_key: String) -> AppResult<UserRecord>;

    /// Soft delete user by ID, releasing its username key
    async fn soft_delete(&self, id: UserId) -> AppResult<()>;

    /// Live records with id strictly greater than `cursor`, ascending by id
    async fn list_after(&self, cursor: Option<UserId>, limit: u64) -> AppResult<Vec<UserRecord>>;

    /// Count live records
    async fn count(&self) -> AppResult<u64>;
}

/// SeaORM implementation of UserRepository.
///
/// The username key lives in the same row as the record, so a rename is a
/// single-row update and the partial unique index never sees a half-applied
/// state.
pub struct SqlUserRepository {
    db: DatabaseConnection,
}

impl SqlUserRepository {
    /// Create new repository instance
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_live_model(&self, id: UserId) -> AppResult<Option<user::Model>> {
        UserEntity::find_by_id(id)
            .filter(user::Column::DeletedAt.is_null())
            .one(&self.db)
            .await
            .map_err(AppError::from)
    }
}

/// Map a write failure, turning the live-username index violation into a
/// duplicate error for `username`.
fn write_error(err: DbErr, username: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::duplicate_username(username),
        _ => AppError::from(err),
    }
}

#[async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: UserId) -> AppResult<Option<UserRecord>> {
        let result = self.find_live_model(id).await?;
        Ok(result.map(UserRecord::from))
    }

    async fn find_by_username_key(&self, key: &str) -> AppResult<Option<UserRecord>> {
        let result = UserEntity::find()
            .filter(user::Column::UsernameKey.eq(key))
            .filter(user::Column::DeletedAt.is_null())
            .one(&self.db)
            .await
            .map_err(AppError::from)?;

        Ok(result.map(UserRecord::from))
    }

    async fn insert(&self, record: UserRecord, username_key: String) -> AppResult<UserRecord> {
        let active_model = ActiveModel {
            id: Set(record.id),
            username: Set(record.username.clone()),
            username_key: Set(username_key),
            payload: Set(record.payload),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
            deleted_at: Set(None),
        };

        let model = active_model
            .insert(&self.db)
            .await
            .map_err(|e| write_error(e, &record.username))?;
        Ok(UserRecord::from(model))
    }

    async fn update(&self, record: UserRecord, username_key: String) -> AppResult<UserRecord> {
        // Only allow updating live (non-deleted) users
        let current = self
            .find_live_model(record.id)
            .await?
            .ok_or(AppError::NotFound)?;

        let mut active: ActiveModel = current.into();
        active.username = Set(record.username.clone());
        active.username_key = Set(username_key);
        active.payload = Set(record.payload);
        active.updated_at = Set(record.updated_at);

        let model = active
            .update(&self.db)
            .await
            .map_err(|e| write_error(e, &record.username))?;
        Ok(UserRecord::from(model))
    }

    async fn soft_delete(&self, id: UserId) -> AppResult<()> {
        let current = self.find_live_model(id).await?.ok_or(AppError::NotFound)?;

        let mut active: ActiveModel = current.into();
        let now = chrono::Utc::now();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);

        active.update(&self.db).await.map_err(AppError::from)?;
        Ok(())
    }

    async fn list_after(&self, cursor: Option<UserId>, limit: u64) -> AppResult<Vec<UserRecord>> {
        let mut query = UserEntity::find().filter(user::Column::DeletedAt.is_null());
        if let Some(cursor) = cursor {
            query = query.filter(user::Column::Id.gt(cursor));
        }

        let models = query
            .order_by_asc(user::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(AppError::from)?;

        Ok(models.into_iter().map(UserRecord::from).collect())
    }

    async fn count(&self) -> AppResult<u64> {
        UserEntity::find()
            .filter(user::Column::DeletedAt.is_null())
            .count(&self.db)
            .await
            .map_err(AppError::from)
    }
}
