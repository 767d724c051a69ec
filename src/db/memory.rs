use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{StoreError, UserStore};
use crate::models::{
    DeleteOutcome, NewUser, PasswordResetLink, Role, User, UserChanges, UserFilter,
    VerificationCode,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    codes: HashMap<Uuid, VerificationCode>,
    links: HashMap<Uuid, PasswordResetLink>,
}

/// Process-local store used when no database is configured, and by the tests.
///
/// All tables sit behind one mutex so uniqueness checks and compare-and-swap
/// updates are atomic. The lock is never held across an await point.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    user_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of user-row reads served so far.
    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::Relaxed)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.user_lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.tables().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.user_lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .tables()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables();
        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::Conflict);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            email: new_user.email,
            username: new_user.username,
            password_hash: new_user.password_hash,
            refresh_token_hash: None,
            role: Role::Customer,
            email_verified: new_user.email_verified,
            google_id: new_user.google_id,
            twitter_id: new_user.twitter_id,
            avatar_url: new_user.avatar_url,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables();

        if let Some(email) = changes.email.as_deref() {
            if tables.users.values().any(|u| u.id != id && u.email == email) {
                return Err(StoreError::Conflict);
            }
        }

        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = Some(hash);
        }
        if let Some(verified) = changes.email_verified {
            user.email_verified = verified;
        }
        if let Some(google_id) = changes.google_id {
            user.google_id = Some(google_id);
        }
        if let Some(twitter_id) = changes.twitter_id {
            user.twitter_id = Some(twitter_id);
        }
        if let Some(avatar_url) = changes.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables();
        Ok(tables.users.get_mut(&id).map(|user| {
            user.role = role;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_refresh_hash(&self, id: Uuid, hash: Option<&str>) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        match tables.users.get_mut(&id) {
            Some(user) => {
                user.refresh_token_hash = hash.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn swap_refresh_hash(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        match tables.users.get_mut(&id) {
            Some(user) if user.refresh_token_hash.as_deref() == Some(current) => {
                user.refresh_token_hash = Some(next.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_user(&self, id: Uuid) -> Result<DeleteOutcome, StoreError> {
        let mut tables = self.tables();
        match tables.users.get(&id).map(|u| u.role) {
            None => Ok(DeleteOutcome::NotFound),
            Some(Role::Admin) => Ok(DeleteOutcome::Protected),
            Some(_) => {
                tables.users.remove(&id);
                tables.codes.retain(|_, c| c.user_id != id);
                tables.links.retain(|_, l| l.user_id != id);
                Ok(DeleteOutcome::Deleted)
            }
        }
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut users: Vec<User> = self
            .tables()
            .users
            .values()
            .filter(|u| filter.role.is_none_or(|role| u.role == role))
            .filter(|u| {
                search.as_deref().is_none_or(|needle| {
                    u.email.to_lowercase().contains(needle)
                        || u.username.to_lowercase().contains(needle)
                })
            })
            .cloned()
            .collect();

        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(users
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn replace_verification_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<VerificationCode, StoreError> {
        let mut tables = self.tables();
        tables.codes.retain(|_, c| c.user_id != user_id);

        let code = VerificationCode {
            id: Uuid::now_v7(),
            user_id,
            code_hash: code_hash.to_string(),
            expires_at,
            created_at: Utc::now(),
        };
        tables.codes.insert(code.id, code.clone());
        Ok(code)
    }

    async fn verification_codes(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<VerificationCode>, StoreError> {
        Ok(self
            .tables()
            .codes
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_verification_code(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables().codes.remove(&id);
        Ok(())
    }

    async fn replace_reset_link(
        &self,
        user_id: Uuid,
        link_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetLink, StoreError> {
        let mut tables = self.tables();
        tables.links.retain(|_, l| l.user_id != user_id);

        let link = PasswordResetLink {
            id: Uuid::now_v7(),
            user_id,
            link_hash: link_hash.to_string(),
            expires_at,
            created_at: Utc::now(),
        };
        tables.links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn find_reset_link(
        &self,
        link_hash: &str,
    ) -> Result<Option<PasswordResetLink>, StoreError> {
        Ok(self
            .tables()
            .links
            .values()
            .find(|l| l.link_hash == link_hash)
            .cloned())
    }

    async fn delete_reset_link(&self, id: Uuid) -> Result<(), StoreError> {
        self.tables().links.remove(&id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        let before = tables.codes.len() + tables.links.len();
        tables.codes.retain(|_, c| !c.is_expired(now));
        tables.links.retain(|_, l| !l.is_expired(now));
        let after = tables.codes.len() + tables.links.len();
        Ok((before - after) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser::local(email, "shopper", "hash".to_string())
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();

        let err = store.create_user(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn swap_only_succeeds_against_the_current_hash() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        store.set_refresh_hash(user.id, Some("one")).await.unwrap();

        assert!(!store.swap_refresh_hash(user.id, "stale", "two").await.unwrap());
        assert!(store.swap_refresh_hash(user.id, "one", "two").await.unwrap());
        assert!(!store.swap_refresh_hash(user.id, "one", "three").await.unwrap());

        let stored = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn admins_are_never_deleted() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("boss@x.com")).await.unwrap();
        store.set_role(user.id, Role::Admin).await.unwrap();

        assert_eq!(store.delete_user(user.id).await.unwrap(), DeleteOutcome::Protected);
        assert_eq!(
            store.delete_user(Uuid::now_v7()).await.unwrap(),
            DeleteOutcome::NotFound
        );
        assert!(store.find_user_by_id(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn issuing_a_code_purges_earlier_ones() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        let expires = Utc::now() + Duration::minutes(2);

        store.replace_verification_code(user.id, "first", expires).await.unwrap();
        store.replace_verification_code(user.id, "second", expires).await.unwrap();

        let codes = store.verification_codes(user.id).await.unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code_hash, "second");
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let store = MemoryStore::new();
        let alice = store.create_user(new_user("a@x.com")).await.unwrap();
        let bob = store.create_user(new_user("b@x.com")).await.unwrap();
        let now = Utc::now();

        store
            .replace_verification_code(alice.id, "old", now - Duration::seconds(1))
            .await
            .unwrap();
        store
            .replace_verification_code(bob.id, "fresh", now + Duration::minutes(2))
            .await
            .unwrap();
        store
            .replace_reset_link(alice.id, "stale-link", now - Duration::minutes(10))
            .await
            .unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 2);
        assert!(store.verification_codes(alice.id).await.unwrap().is_empty());
        assert_eq!(store.verification_codes(bob.id).await.unwrap().len(), 1);
        assert!(store.find_reset_link("stale-link").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_role_and_search() {
        let store = MemoryStore::new();
        let manager = store.create_user(new_user("manager@shop.com")).await.unwrap();
        store.set_role(manager.id, Role::Manager).await.unwrap();
        store.create_user(new_user("buyer@mail.com")).await.unwrap();

        let managers = store
            .list_users(&UserFilter {
                role: Some(Role::Manager),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(managers.len(), 1);
        assert_eq!(managers[0].id, manager.id);

        let found = store
            .list_users(&UserFilter {
                search: Some("MAIL".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].email, "buyer@mail.com");
    }
}
