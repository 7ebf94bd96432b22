//! In-process store used when no database is configured, and by tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::identity::{Permission, PermissionSet, TokenScope, User};
use super::storage::{ActivationOutcome, PermissionStore, TokenStore, UserStore};
use super::token::TokenRecord;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tokens: Vec<TokenRecord>,
    grants: HashMap<Uuid, BTreeSet<Permission>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a user record.
    pub fn insert_user(&self, user: User) {
        self.lock().users.insert(user.id, user);
    }

    #[must_use]
    pub fn user(&self, id: Uuid) -> Option<User> {
        self.lock().users.get(&id).cloned()
    }

    /// Hashes of every stored token, in insertion order. Expired tokens are
    /// dropped whenever a new one is inserted.
    #[must_use]
    pub fn stored_hashes(&self) -> Vec<Vec<u8>> {
        self.lock().tokens.iter().map(|t| t.hash.clone()).collect()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, record: &TokenRecord) -> Result<()> {
        let now = Utc::now();
        let mut tables = self.lock();
        tables.tokens.retain(|t| now < t.expiry);
        tables.tokens.push(record.clone());
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: Uuid) -> Result<u64> {
        let mut tables = self.lock();
        let before = tables.tokens.len();
        tables
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok((before - tables.tokens.len()) as u64)
    }

    async fn user_for_token_hash(&self, scope: TokenScope, hash: &[u8]) -> Result<Option<User>> {
        let now = Utc::now();
        let tables = self.lock();
        let user = tables
            .tokens
            .iter()
            .find(|t| t.hash == hash && t.is_valid_for(scope, now))
            .and_then(|t| tables.users.get(&t.user_id).cloned());
        Ok(user)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn permissions_for_user(&self, user_id: Uuid) -> Result<PermissionSet> {
        Ok(self
            .lock()
            .grants
            .get(&user_id)
            .map(|granted| granted.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: Uuid, permissions: &[Permission]) -> Result<()> {
        self.lock()
            .grants
            .entry(user_id)
            .or_default()
            .extend(permissions.iter().copied());
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn activate(&self, user: &User) -> Result<ActivationOutcome> {
        let mut tables = self.lock();
        match tables.users.get_mut(&user.id) {
            Some(stored) if stored.version == user.version => {
                stored.activated = true;
                stored.version += 1;
                Ok(ActivationOutcome::Activated(stored.clone()))
            }
            _ => Ok(ActivationOutcome::EditConflict),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Carol".to_string(),
            email: "carol@example.com".to_string(),
            activated: false,
            version: 3,
        }
    }

    #[tokio::test]
    async fn activate_bumps_version() -> Result<()> {
        let store = MemoryStore::default();
        let carol = user();
        store.insert_user(carol.clone());

        let outcome = store.activate(&carol).await?;
        let ActivationOutcome::Activated(activated) = outcome else {
            panic!("expected activation, got {outcome:?}");
        };
        assert!(activated.activated);
        assert_eq!(activated.version, 4);
        assert_eq!(store.user(carol.id), Some(activated));
        Ok(())
    }

    #[tokio::test]
    async fn activate_with_stale_version_conflicts() -> Result<()> {
        let store = MemoryStore::default();
        let carol = user();
        store.insert_user(carol.clone());
        store.activate(&carol).await?;

        assert_eq!(
            store.activate(&carol).await?,
            ActivationOutcome::EditConflict
        );
        Ok(())
    }

    #[tokio::test]
    async fn grants_accumulate() -> Result<()> {
        let store = MemoryStore::default();
        let id = Uuid::new_v4();
        assert!(store.permissions_for_user(id).await?.is_empty());

        store.add_for_user(id, &[Permission::MoviesRead]).await?;
        store
            .add_for_user(id, &[Permission::MoviesRead, Permission::MoviesWrite])
            .await?;

        let set = store.permissions_for_user(id).await?;
        assert_eq!(
            set.codes(),
            vec!["movies:read".to_string(), "movies:write".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn insert_drops_expired_tokens() -> Result<()> {
        let store = MemoryStore::default();
        let user_id = Uuid::new_v4();
        let record = |hash: u8, expiry| TokenRecord {
            hash: vec![hash; 32],
            user_id,
            expiry,
            scope: TokenScope::Authentication,
        };

        store
            .insert(&record(1, Utc::now() - Duration::minutes(1)))
            .await?;
        store
            .insert(&record(2, Utc::now() + Duration::hours(1)))
            .await?;
        store
            .insert(&record(3, Utc::now() + Duration::hours(2)))
            .await?;

        assert_eq!(store.stored_hashes(), vec![vec![2; 32], vec![3; 32]]);
        Ok(())
    }
}
