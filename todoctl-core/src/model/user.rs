//! User entity and username validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::validation::{required, ValidationError};

/// Maximum length for usernames
const MAX_USERNAME_LEN: usize = 64;

/// User record as stored in `users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Validated username
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Create a new username.
    ///
    /// # Rules
    /// - Non-empty (after trimming whitespace)
    /// - Max 64 characters
    ///
    /// # Example
    /// ```
    /// use todoctl_core::model::Username;
    ///
    /// assert!(Username::new("alice").is_ok());
    /// assert!(Username::new("   ").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        required("username", s, MAX_USERNAME_LEN).map(Self)
    }

    /// Get the username as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Insert payload for `users`
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Username,
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    pub fn new(username: Username) -> Self {
        Self {
            username,
            created_at: super::now(),
        }
    }
}

/// Field changes for a user update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<Username>,
}

impl UserPatch {
    pub fn apply(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = username.into_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_username() {
        let name = Username::new("  alice ").unwrap();
        assert_eq!(name.as_str(), "alice");
    }

    #[test]
    fn rejects_empty_username() {
        assert!(matches!(
            Username::new("").unwrap_err(),
            ValidationError::Empty { field: "username" }
        ));
    }

    #[test]
    fn rejects_long_username() {
        let long = "a".repeat(65);
        assert!(matches!(
            Username::new(&long).unwrap_err(),
            ValidationError::TooLong { max: 64, .. }
        ));
        assert!(Username::new(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn patch_keeps_unset_fields() {
        let mut user = User {
            id: 1,
            username: "alice".into(),
            created_at: Utc::now(),
        };
        UserPatch::default().apply(&mut user);
        assert_eq!(user.username, "alice");

        UserPatch {
            username: Some(Username::new("bob").unwrap()),
        }
        .apply(&mut user);
        assert_eq!(user.username, "bob");
    }
}
