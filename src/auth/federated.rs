use crate::auth::jwt::TokenPair;
use crate::auth::oauth::Provider;
use crate::auth::service;
use crate::db::{StoreError, UserStore};
use crate::error::AppError;
use crate::models::{NewUser, User, UserChanges};
use crate::state::AppState;

/// What an identity provider told us about the caller.
#[derive(Debug, Clone)]
pub struct ExternalProfile {
    pub provider: Provider,
    pub provider_id: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub display_name: Option<String>,
    pub email: String,
    pub email_verified: bool,
    pub avatar_url: Option<String>,
}

impl ExternalProfile {
    fn username(&self) -> String {
        let joined = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            return joined;
        }

        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| service::default_username(&self.email))
    }

    fn linked_to(&self, user: &User) -> bool {
        let linked = match self.provider {
            Provider::Google => user.google_id.as_deref(),
            Provider::Twitter => user.twitter_id.as_deref(),
        };
        linked.is_some()
    }

    fn provider_changes(&self, user: &User) -> UserChanges {
        let mut changes = UserChanges::default();
        match self.provider {
            Provider::Google => changes.google_id = Some(self.provider_id.clone()),
            Provider::Twitter => changes.twitter_id = Some(self.provider_id.clone()),
        }
        if user.avatar_url.is_none() {
            changes.avatar_url = self.avatar_url.clone();
        }
        changes
    }

    fn into_new_user(self, email: String) -> NewUser {
        let username = self.username();
        let (google_id, twitter_id) = match self.provider {
            Provider::Google => (Some(self.provider_id), None),
            Provider::Twitter => (None, Some(self.provider_id)),
        };
        NewUser {
            email,
            username,
            password_hash: None,
            email_verified: self.email_verified,
            google_id,
            twitter_id,
            avatar_url: self.avatar_url,
        }
    }
}

/// Map a provider profile onto a user row, creating or linking as needed.
pub async fn resolve(
    store: &dyn UserStore,
    profile: Option<ExternalProfile>,
) -> Result<User, AppError> {
    let profile = profile.ok_or_else(|| AppError::Unauthorized("Unauthenticated".to_string()))?;

    let email = service::normalize_email(&profile.email);
    if email.is_empty() {
        return Err(AppError::Unauthorized(format!(
            "{} did not share an e-mail address",
            profile.provider
        )));
    }

    if let Some(user) = store.find_user_by_email(&email).await? {
        return link(store, user, &profile).await;
    }

    match store.create_user(profile.clone().into_new_user(email.clone())).await {
        Ok(user) => {
            tracing::info!("Created user {} from {} login", user.id, profile.provider);
            Ok(user)
        }
        // Another callback for the same address won the insert.
        Err(StoreError::Conflict) => {
            let user = store
                .find_user_by_email(&email)
                .await?
                .ok_or_else(|| AppError::Conflict("User already exists".to_string()))?;
            link(store, user, &profile).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn link(store: &dyn UserStore, user: User, profile: &ExternalProfile) -> Result<User, AppError> {
    if profile.linked_to(&user) {
        return Ok(user);
    }

    tracing::info!("Linking {} identity to user {}", profile.provider, user.id);
    store
        .update_user(user.id, profile.provider_changes(&user))
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn sign_in_federated(
    state: &AppState,
    profile: Option<ExternalProfile>,
) -> Result<(User, TokenPair), AppError> {
    let user = resolve(state.store.as_ref(), profile).await?;
    let pair = service::start_session(state, &user).await?;
    Ok((user, pair))
}
