//! In-memory implementation of the lookup collaborators.
//!
//! Stands in for the persistence layer in the demo binary and in tests.
//! Tokens are stored only by the SHA-256 of their plaintext, each with an
//! owning user, a scope, and an expiry; a lookup succeeds only when all three
//! match.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::lookup::{LookupError, PermissionLookup, UserLookup};
use crate::models::{Permissions, Token, TokenScope, User, hash_plaintext};

#[derive(Debug, Clone)]
struct StoredToken {
    user_id: i64,
    scope: TokenScope,
    expiry: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<i64, User>,
    tokens: HashMap<[u8; 32], StoredToken>,
    permissions: HashMap<i64, HashSet<String>>,
}

/// Thread-safe in-memory user, token and permission store.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_user_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_user_id: AtomicI64::new(1),
        }
    }

    /// Register a user and return it with its assigned id.
    pub async fn insert_user(&self, name: &str, email: &str, activated: bool) -> User {
        let user = User {
            id: self.next_user_id.fetch_add(1, Ordering::SeqCst),
            created_at: Utc::now(),
            name: name.to_string(),
            email: email.to_string(),
            activated,
            version: 1,
        };

        self.tables
            .write()
            .await
            .users
            .insert(user.id, user.clone());

        debug!(user_id = user.id, "User stored");
        user
    }

    /// Issue a new random token for an existing user.
    pub async fn new_token(
        &self,
        user_id: i64,
        ttl: TimeDelta,
        scope: TokenScope,
    ) -> Result<Token, LookupError> {
        let token = Token::generate(user_id, ttl, scope);
        self.insert_token(&token).await?;
        Ok(token)
    }

    /// Store an already-built token. The owning user must exist.
    pub async fn insert_token(&self, token: &Token) -> Result<(), LookupError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&token.user_id) {
            return Err(LookupError::NotFound);
        }

        tables.tokens.insert(
            token.hash,
            StoredToken {
                user_id: token.user_id,
                scope: token.scope,
                expiry: token.expiry,
            },
        );
        Ok(())
    }

    /// Register an operator-supplied plaintext as a token for `user_id`.
    pub async fn insert_token_plaintext(
        &self,
        user_id: i64,
        plaintext: &str,
        ttl: TimeDelta,
        scope: TokenScope,
    ) -> Result<Token, LookupError> {
        let token = Token::from_plaintext(plaintext.to_string(), user_id, ttl, scope);
        self.insert_token(&token).await?;
        Ok(token)
    }

    /// Grant permission codes to a user. Granting twice is a no-op.
    pub async fn add_permissions_for_user<I, S>(&self, user_id: i64, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .write()
            .await
            .permissions
            .entry(user_id)
            .or_default()
            .extend(codes.into_iter().map(Into::into));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UserLookup for MemoryStore {
    async fn get_for_token(&self, scope: TokenScope, plaintext: &str) -> Result<User, LookupError> {
        let hash = hash_plaintext(plaintext);
        let tables = self.tables.read().await;

        let stored = tables.tokens.get(&hash).ok_or(LookupError::NotFound)?;
        if stored.scope != scope || stored.expiry <= Utc::now() {
            return Err(LookupError::NotFound);
        }

        tables
            .users
            .get(&stored.user_id)
            .cloned()
            .ok_or(LookupError::NotFound)
    }
}

#[async_trait::async_trait]
impl PermissionLookup for MemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, LookupError> {
        let tables = self.tables.read().await;
        Ok(tables
            .permissions
            .get(&user_id)
            .map(|codes| Permissions::new(codes.iter().cloned()))
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_round_trip() {
        let store = MemoryStore::new();
        let user = store.insert_user("Alice", "alice@example.com", true).await;
        let token = store
            .new_token(user.id, TimeDelta::hours(1), TokenScope::Authentication)
            .await
            .unwrap();

        let found = store
            .get_for_token(TokenScope::Authentication, &token.plaintext)
            .await
            .unwrap();
        assert_eq!(found, user);
    }

    #[tokio::test]
    async fn test_wrong_scope_is_not_found() {
        let store = MemoryStore::new();
        let user = store.insert_user("Bob", "bob@example.com", true).await;
        let token = store
            .new_token(user.id, TimeDelta::hours(1), TokenScope::Activation)
            .await
            .unwrap();

        let result = store
            .get_for_token(TokenScope::Authentication, &token.plaintext)
            .await;
        assert_eq!(result, Err(LookupError::NotFound));
    }

    #[tokio::test]
    async fn test_expired_token_is_not_found() {
        let store = MemoryStore::new();
        let user = store.insert_user("Carol", "carol@example.com", true).await;
        let token = store
            .new_token(user.id, TimeDelta::seconds(-1), TokenScope::Authentication)
            .await
            .unwrap();

        let result = store
            .get_for_token(TokenScope::Authentication, &token.plaintext)
            .await;
        assert_eq!(result, Err(LookupError::NotFound));
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .get_for_token(TokenScope::Authentication, "ABCDEFGHIJKLMNOPQRSTUVWXYZ")
            .await;
        assert_eq!(result, Err(LookupError::NotFound));
    }

    #[tokio::test]
    async fn test_token_for_missing_user_rejected() {
        let store = MemoryStore::new();
        let result = store
            .new_token(99, TimeDelta::hours(1), TokenScope::Authentication)
            .await;
        assert!(matches!(result, Err(LookupError::NotFound)));
    }

    #[tokio::test]
    async fn test_operator_supplied_token() {
        let store = MemoryStore::new();
        let user = store.insert_user("Gus", "gus@example.com", true).await;
        store
            .insert_token_plaintext(
                user.id,
                "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
                TimeDelta::days(365),
                TokenScope::Authentication,
            )
            .await
            .unwrap();

        let found = store
            .get_for_token(TokenScope::Authentication, "ABCDEFGHIJKLMNOPQRSTUVWXYZ")
            .await
            .unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_permissions() {
        let store = MemoryStore::new();
        let user = store.insert_user("Eve", "eve@example.com", true).await;

        assert!(store.get_all_for_user(user.id).await.unwrap().is_empty());

        store
            .add_permissions_for_user(user.id, ["movies:read", "movies:write"])
            .await;
        store.add_permissions_for_user(user.id, ["movies:read"]).await;

        let perms = store.get_all_for_user(user.id).await.unwrap();
        assert_eq!(perms.len(), 2);
        assert!(perms.includes("movies:write"));
    }
}
