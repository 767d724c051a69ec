use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role")]
pub enum Role {
    Customer,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "Customer",
            Role::Manager => "Manager",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub google_id: Option<String>,
    pub twitter_id: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a freshly inserted user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub google_id: Option<String>,
    pub twitter_id: Option<String>,
    pub avatar_url: Option<String>,
}

impl NewUser {
    pub fn local(email: &str, username: &str, password_hash: String) -> Self {
        Self {
            email: email.to_string(),
            username: username.to_string(),
            password_hash: Some(password_hash),
            email_verified: false,
            google_id: None,
            twitter_id: None,
            avatar_url: None,
        }
    }
}

/// Partial update of a user row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub email_verified: Option<bool>,
    pub google_id: Option<String>,
    pub twitter_id: Option<String>,
    pub avatar_url: Option<String>,
}

/// Admin listing filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub role: Option<Role>,
}

impl UserFilter {
    pub const DEFAULT_PER_PAGE: u32 = 25;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn limit(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u32 {
        self.page.unwrap_or(1).max(1).saturating_sub(1) * self.limit()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Protected,
}
