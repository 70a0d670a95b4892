//! Username normalization policy.
//!
//! The store never guesses how usernames compare. Case folding, whitespace
//! trimming and format checks are all explicit settings on [`UsernamePolicy`].

use regex::Regex;
use validator::Validate;

use crate::error::{DomainError, DomainResult};
use crate::user::{NewUser, UserPatch};

/// How usernames are compared for uniqueness and lookup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseSensitivity {
    /// Byte-for-byte comparison
    #[default]
    Exact,
    /// Unicode lowercase folding before comparison
    Insensitive,
}

/// Username canonicalization and comparison rules.
#[derive(Debug, Clone, Default)]
pub struct UsernamePolicy {
    case: CaseSensitivity,
    trim: bool,
    pattern: Option<Regex>,
}

impl UsernamePolicy {
    pub fn new(case: CaseSensitivity, trim: bool) -> Self {
        Self {
            case,
            trim,
            pattern: None,
        }
    }

    /// Require usernames to fully match `pattern` on create and rename.
    pub fn with_pattern(mut self, pattern: &str) -> DomainResult<Self> {
        let anchored = format!("^(?:{})$", pattern);
        let regex = Regex::new(&anchored)
            .map_err(|e| DomainError::validation(format!("Invalid username pattern: {}", e)))?;
        self.pattern = Some(regex);
        Ok(self)
    }

    pub fn case(&self) -> CaseSensitivity {
        self.case
    }

    pub fn trims(&self) -> bool {
        self.trim
    }

    /// Uniqueness key for an already canonical username.
    pub fn key(&self, username: &str) -> String {
        match self.case {
            CaseSensitivity::Exact => username.to_string(),
            CaseSensitivity::Insensitive => username.to_lowercase(),
        }
    }

    /// Key used to look up a caller-supplied username.
    ///
    /// Format rules are not applied here: a name that could never be stored
    /// simply finds nothing.
    pub fn lookup_key(&self, raw: &str) -> DomainResult<String> {
        let username = self.strip(raw);
        if username.is_empty() {
            return Err(DomainError::validation("Username is required"));
        }
        Ok(self.key(username))
    }

    /// Canonicalize and validate a creation request.
    pub fn prepare_new(&self, new_user: NewUser) -> DomainResult<NewUser> {
        let prepared = NewUser {
            username: self.strip(&new_user.username).to_string(),
            payload: new_user.payload,
        };
        prepared.validate()?;
        self.check_pattern(&prepared.username)?;
        Ok(prepared)
    }

    /// Canonicalize and validate an update request.
    pub fn prepare_patch(&self, patch: UserPatch) -> DomainResult<UserPatch> {
        let prepared = UserPatch {
            username: patch.username.map(|u| self.strip(&u).to_string()),
            payload: patch.payload,
        };
        prepared.validate()?;
        if let Some(username) = &prepared.username {
            self.check_pattern(username)?;
        }
        Ok(prepared)
    }

    fn strip<'a>(&self, raw: &'a str) -> &'a str {
        if self.trim {
            raw.trim()
        } else {
            raw
        }
    }

    fn check_pattern(&self, username: &str) -> DomainResult<()> {
        match &self.pattern {
            Some(regex) if !regex.is_match(username) => Err(DomainError::validation(format!(
                "Username '{}' does not match the required format",
                username
            ))),
            _ => Ok(()),
        }
    }
}
