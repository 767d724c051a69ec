use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, UserStore, password_reset_links, users, verification_codes};
use crate::models::{
    DeleteOutcome, NewUser, PasswordResetLink, Role, User, UserChanges, UserFilter,
    VerificationCode,
};

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        users::find_by_id(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        users::find_by_email(&self.pool, email)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        users::create(&self.pool, &new_user)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        users::update(&self.pool, id, &changes)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, StoreError> {
        users::update_role(&self.pool, id, role)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn set_refresh_hash(&self, id: Uuid, hash: Option<&str>) -> Result<bool, StoreError> {
        users::set_refresh_hash(&self.pool, id, hash)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn swap_refresh_hash(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        users::swap_refresh_hash(&self.pool, id, current, next)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn delete_user(&self, id: Uuid) -> Result<DeleteOutcome, StoreError> {
        let Some(user) = users::find_by_id(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)?
        else {
            return Ok(DeleteOutcome::NotFound);
        };

        if user.role == Role::Admin {
            return Ok(DeleteOutcome::Protected);
        }

        let removed = users::delete_non_admin(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)?;
        if removed > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        // Lost a race with a delete or a promotion to Admin.
        let still_there = users::exists(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(if still_there {
            DeleteOutcome::Protected
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        users::list(&self.pool, filter)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn replace_verification_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<VerificationCode, StoreError> {
        verification_codes::replace(&self.pool, user_id, code_hash, expires_at)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn verification_codes(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<VerificationCode>, StoreError> {
        verification_codes::list_for_user(&self.pool, user_id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn delete_verification_code(&self, id: Uuid) -> Result<(), StoreError> {
        verification_codes::delete(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn replace_reset_link(
        &self,
        user_id: Uuid,
        link_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetLink, StoreError> {
        password_reset_links::replace(&self.pool, user_id, link_hash, expires_at)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_reset_link(
        &self,
        link_hash: &str,
    ) -> Result<Option<PasswordResetLink>, StoreError> {
        password_reset_links::find_by_hash(&self.pool, link_hash)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn delete_reset_link(&self, id: Uuid) -> Result<(), StoreError> {
        password_reset_links::delete(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let codes = verification_codes::delete_expired(&self.pool, now)
            .await
            .map_err(StoreError::from_sqlx)?;
        let links = password_reset_links::delete_expired(&self.pool, now)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(codes + links)
    }
}
