pub mod memory;
pub mod password_reset_links;
pub mod postgres;
pub mod users;
pub mod verification_codes;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    DeleteOutcome, NewUser, PasswordResetLink, Role, User, UserChanges, UserFilter,
    VerificationCode,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    Conflict,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Translate a sqlx error, folding unique violations into `Conflict`.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict
            }
            other => StoreError::Database(other),
        }
    }
}

/// User records plus the one-time codes and links hanging off them.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Returns `None` when no row has that id.
    async fn update_user(&self, id: Uuid, changes: UserChanges)
    -> Result<Option<User>, StoreError>;

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, StoreError>;

    /// Overwrite (or clear) the stored refresh hash. Returns false when the user is missing.
    async fn set_refresh_hash(&self, id: Uuid, hash: Option<&str>) -> Result<bool, StoreError>;

    /// Replace the refresh hash only if it still equals `current`.
    async fn swap_refresh_hash(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError>;

    /// Admin rows are never deleted.
    async fn delete_user(&self, id: Uuid) -> Result<DeleteOutcome, StoreError>;

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError>;

    /// Store a new code for the user, purging any earlier ones.
    async fn replace_verification_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<VerificationCode, StoreError>;

    async fn verification_codes(&self, user_id: Uuid)
    -> Result<Vec<VerificationCode>, StoreError>;

    async fn delete_verification_code(&self, id: Uuid) -> Result<(), StoreError>;

    /// Store a new reset link for the user, purging any earlier ones.
    async fn replace_reset_link(
        &self,
        user_id: Uuid,
        link_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetLink, StoreError>;

    async fn find_reset_link(&self, link_hash: &str)
    -> Result<Option<PasswordResetLink>, StoreError>;

    async fn delete_reset_link(&self, id: Uuid) -> Result<(), StoreError>;

    /// Delete every code and link that expired at or before `now`. Returns the number removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
