//! Collaborator contracts consumed by the authentication and authorization
//! stages.
//!
//! The pipeline never talks to a database directly. It resolves bearer tokens
//! through a [`UserLookup`] and permission codes through a
//! [`PermissionLookup`]; both are injected as trait objects so tests and
//! embedders can swap in their own backends.
//!
//! # Error Semantics
//!
//! - [`LookupError::NotFound`] is a normal outcome (unknown or expired token)
//! - [`LookupError::Backend`] is always surfaced as a server error, never
//!   treated as "not found" or "no permissions"

use thiserror::Error;

use crate::models::{Permissions, TokenScope, User};

/// Failure returned by a collaborator lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("record not found")]
    NotFound,

    #[error("lookup backend failed: {0}")]
    Backend(String),
}

/// Resolves a token plaintext to the user it was issued for.
#[async_trait::async_trait]
pub trait UserLookup: Send + Sync {
    /// Find the user owning an unexpired token of `scope`.
    async fn get_for_token(&self, scope: TokenScope, plaintext: &str) -> Result<User, LookupError>;
}

/// Resolves the permission codes granted to a user.
#[async_trait::async_trait]
pub trait PermissionLookup: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, LookupError>;
}

/// Mock lookups for unit testing.
pub mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Lookup that fails every call with a backend error and counts calls.
    #[derive(Default)]
    pub struct FailingLookup {
        call_count: AtomicUsize,
    }

    impl FailingLookup {
        pub fn new() -> Self {
            Self::default()
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl UserLookup for FailingLookup {
        async fn get_for_token(
            &self,
            _scope: TokenScope,
            _plaintext: &str,
        ) -> Result<User, LookupError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Err(LookupError::Backend("mock user lookup failure".to_string()))
        }
    }

    #[async_trait::async_trait]
    impl PermissionLookup for FailingLookup {
        async fn get_all_for_user(&self, _user_id: i64) -> Result<Permissions, LookupError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Err(LookupError::Backend(
                "mock permission lookup failure".to_string(),
            ))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::FailingLookup;
    use super::*;

    #[tokio::test]
    async fn test_failing_lookup_reports_backend_errors() {
        let lookup = FailingLookup::new();

        let user = lookup
            .get_for_token(TokenScope::Authentication, "ABCDEFGHIJKLMNOPQRSTUVWXYZ")
            .await;
        assert!(matches!(user, Err(LookupError::Backend(_))));

        let perms = lookup.get_all_for_user(1).await;
        assert!(matches!(perms, Err(LookupError::Backend(_))));

        assert_eq!(lookup.call_count(), 2);
    }
}
