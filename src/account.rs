use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{password, service, tokens};
use crate::error::AppError;
use crate::models::{DeleteOutcome, User, UserChanges};
use crate::state::AppState;

pub const VERIFICATION_CODE_TTL_SECS: i64 = 2 * 60;
pub const RESET_LINK_TTL_SECS: i64 = 5 * 60;

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub avatar_url: Option<String>,
}

pub async fn profile(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .store
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Role is never changed here. A new e-mail address starts unverified.
pub async fn update_profile(
    state: &AppState,
    id: Uuid,
    update: ProfileUpdate,
) -> Result<User, AppError> {
    let current = profile(state, id).await?;
    let mut changes = UserChanges::default();

    if let Some(username) = update.username {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::BadRequest("Username cannot be empty".to_string()));
        }
        changes.username = Some(username.to_string());
    }

    if let Some(email) = update.email {
        let email = service::normalize_email(&email);
        service::validate_email(&email)?;
        if email != current.email {
            changes.email = Some(email);
            changes.email_verified = Some(false);
        }
    }

    if let Some(new_password) = update.password {
        password::validate_new(&new_password)?;
        changes.password_hash = Some(password::hash(&new_password)?);
    }

    if let Some(avatar_url) = update.avatar_url {
        changes.avatar_url = Some(avatar_url);
    }

    let user = state
        .store
        .update_user(id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!("Updated profile of user {id}");
    Ok(user)
}

pub async fn delete_account(state: &AppState, id: Uuid) -> Result<(), AppError> {
    match state.store.delete_user(id).await? {
        DeleteOutcome::Deleted => {
            tracing::info!("Deleted user {id}");
            Ok(())
        }
        DeleteOutcome::NotFound => Err(AppError::NotFound("User not found".to_string())),
        DeleteOutcome::Protected => Err(AppError::Forbidden(
            "Admin accounts cannot be deleted".to_string(),
        )),
    }
}

/// Issue a fresh code, invalidating earlier ones, and mail it.
pub async fn send_verification_code(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let user = profile(state, id).await?;
    if user.email_verified {
        return Err(AppError::BadRequest("E-mail is already verified".to_string()));
    }

    let code = tokens::generate_numeric_code();
    let expires_at = Utc::now() + Duration::seconds(VERIFICATION_CODE_TTL_SECS);
    state
        .store
        .replace_verification_code(user.id, &password::hash(&code)?, expires_at)
        .await?;

    match &state.mailer {
        Some(mailer) => mailer
            .send_verification_code(&user.email, &code)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to send verification code: {e}")))?,
        None => tracing::warn!("No mailer configured, verification code for {id} not sent"),
    }

    Ok(())
}

/// Expired codes are dropped as they are met.
pub async fn verify_email(state: &AppState, id: Uuid, code: &str) -> Result<User, AppError> {
    let user = profile(state, id).await?;
    let now = Utc::now();

    let mut matched = None;
    for stored in state.store.verification_codes(user.id).await? {
        if stored.is_expired(now) {
            state.store.delete_verification_code(stored.id).await?;
            continue;
        }
        if matched.is_none() && password::verify(code.trim(), &stored.code_hash) {
            matched = Some(stored.id);
        }
    }

    let Some(code_id) = matched else {
        return Err(AppError::BadRequest(
            "Invalid or expired verification code".to_string(),
        ));
    };

    let user = state
        .store
        .update_user(
            user.id,
            UserChanges {
                email_verified: Some(true),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    state.store.delete_verification_code(code_id).await?;

    tracing::info!("User {id} verified their e-mail");
    Ok(user)
}

/// Mail a single-use reset link pointing at the storefront.
pub async fn request_password_reset(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let user = profile(state, id).await?;

    let token = tokens::generate_opaque_token();
    let expires_at = Utc::now() + Duration::seconds(RESET_LINK_TTL_SECS);
    state
        .store
        .replace_reset_link(user.id, &tokens::hash_token(&token), expires_at)
        .await?;

    let reset_url = format!(
        "{}/reset-password?token={token}",
        state.config.client_url.trim_end_matches('/')
    );

    match &state.mailer {
        Some(mailer) => mailer
            .send_password_reset(&user.email, &reset_url)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to send reset link: {e}")))?,
        None => tracing::warn!("No mailer configured, reset link for {id} not sent"),
    }

    Ok(())
}

/// Consume a reset link. Every session of the user ends.
pub async fn reset_password(
    state: &AppState,
    token: &str,
    new_password: &str,
) -> Result<(), AppError> {
    password::validate_new(new_password)?;

    let link = state
        .store
        .find_reset_link(&tokens::hash_token(token.trim()))
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired reset link".to_string()))?;

    if link.is_expired(Utc::now()) {
        state.store.delete_reset_link(link.id).await?;
        return Err(AppError::BadRequest("Invalid or expired reset link".to_string()));
    }

    let changes = UserChanges {
        password_hash: Some(password::hash(new_password)?),
        ..Default::default()
    };
    state
        .store
        .update_user(link.user_id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    state.store.delete_reset_link(link.id).await?;
    state.store.set_refresh_hash(link.user_id, None).await?;

    tracing::info!("Password reset for user {}", link.user_id);
    Ok(())
}
