//! User record entity and related types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::constants::MAX_USERNAME_LENGTH;

/// Process-assigned user identifier (UUID v7, time ordered)
pub type UserId = Uuid;

/// User record as stored and returned by the store.
///
/// `payload` is owned by the application layer; the store keeps it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Create a record with a freshly generated id
    pub fn new(username: String, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            username,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a patch in place, bumping `updated_at`.
    ///
    /// The id and creation time are never touched.
    pub fn apply(&mut self, patch: UserPatch) {
        if let Some(username) = patch.username {
            self.username = username;
        }
        if let Some(payload) = patch.payload {
            self.payload = payload;
        }
        self.updated_at = Utc::now();
    }
}

/// User creation data transfer object
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    /// Unique username
    #[validate(length(
        min = 1,
        max = MAX_USERNAME_LENGTH,
        message = "Username must be between 1 and 64 characters"
    ))]
    pub username: String,
    /// Opaque application payload
    #[serde(default)]
    pub payload: Value,
}

impl NewUser {
    pub fn new(username: impl Into<String>, payload: Value) -> Self {
        Self {
            username: username.into(),
            payload,
        }
    }
}

/// User update data transfer object. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
pub struct UserPatch {
    /// New username
    #[validate(length(
        min = 1,
        max = MAX_USERNAME_LENGTH,
        message = "Username must be between 1 and 64 characters"
    ))]
    pub username: Option<String>,
    /// Replacement payload
    pub payload: Option<Value>,
}

impl UserPatch {
    /// Patch that only renames the user
    pub fn username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            payload: None,
        }
    }

    /// Patch that only replaces the payload
    pub fn payload(payload: Value) -> Self {
        Self {
            username: None,
            payload: Some(payload),
        }
    }

    /// Check if the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.payload.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_records_get_distinct_ids() {
        let a = UserRecord::new("alice".into(), Value::Null);
        let b = UserRecord::new("bob".into(), Value::Null);
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn apply_keeps_identity() {
        let mut record = UserRecord::new("alice".into(), json!({"plan": "free"}));
        let id = record.id;
        let created_at = record.created_at;

        record.apply(UserPatch::username("alicia"));
        assert_eq!(record.id, id);
        assert_eq!(record.created_at, created_at);
        assert_eq!(record.username, "alicia");
        assert_eq!(record.payload, json!({"plan": "free"}));

        record.apply(UserPatch::payload(json!({"plan": "pro"})));
        assert_eq!(record.username, "alicia");
        assert_eq!(record.payload, json!({"plan": "pro"}));
    }

    #[test]
    fn empty_username_fails_validation() {
        let new_user = NewUser::new("", Value::Null);
        assert!(new_user.validate().is_err());

        let patch = UserPatch::username("");
        assert!(patch.validate().is_err());
        assert!(UserPatch::default().validate().is_ok());
    }

    #[test]
    fn username_length_is_capped() {
        let longest = "a".repeat(MAX_USERNAME_LENGTH as usize);
        assert!(NewUser::new(longest.clone(), Value::Null).validate().is_ok());
        assert!(UserPatch::username(longest.clone()).validate().is_ok());

        let too_long = format!("{}a", longest);
        assert!(NewUser::new(too_long.clone(), Value::Null).validate().is_err());
        assert!(UserPatch::username(too_long).validate().is_err());
    }
}
