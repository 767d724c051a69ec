use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use uuid::Uuid;

use crate::auth::jwt::{TokenKind, TokenPair};
use crate::auth::{password, tokens};
use crate::error::AppError;
use crate::models::{NewUser, Role, User};
use crate::state::AppState;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid e-mail address".to_string()))
    }
}

/// Local part of the address, used when no username was supplied.
pub fn default_username(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

/// Issue a fresh pair and make its refresh token the only valid one.
pub async fn start_session(state: &AppState, user: &User) -> Result<TokenPair, AppError> {
    let pair = state.tokens.issue_pair(user)?;
    let stored = state
        .store
        .set_refresh_hash(user.id, Some(&tokens::hash_token(&pair.refresh_token)))
        .await?;
    if !stored {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    Ok(pair)
}

/// Look up the account and check its password, counting failures.
async fn check_credentials(state: &AppState, email: &str, pass: &str) -> Result<User, AppError> {
    let email = normalize_email(email);

    if let Err(retry_after) = state.login_limiter.try_acquire(&email) {
        tracing::warn!("Sign-in for {email} throttled for {retry_after}s");
        return Err(AppError::RateLimited(
            "Too many sign-in attempts. Please try again later.".to_string(),
        ));
    }

    let user = match state.store.find_user_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            state.login_limiter.release(&email);
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Err(e) => {
            state.login_limiter.release(&email);
            return Err(e.into());
        }
    };

    let Some(hash) = user.password_hash.as_deref() else {
        state.login_limiter.release(&email);
        return Err(AppError::BadRequest(
            "This account signs in through Google or Twitter".to_string(),
        ));
    };

    // A wrong password keeps its reserved attempt.
    if !password::verify(pass, hash) {
        return Err(AppError::Forbidden("Invalid credentials".to_string()));
    }

    state.login_limiter.reset(&email);
    Ok(user)
}

pub async fn sign_in(
    state: &AppState,
    email: &str,
    pass: &str,
) -> Result<(User, TokenPair), AppError> {
    let user = check_credentials(state, email, pass).await?;
    let pair = start_session(state, &user).await?;
    tracing::info!("User {} signed in", user.id);
    Ok((user, pair))
}

pub async fn sign_up(
    state: &AppState,
    email: &str,
    pass: &str,
    username: Option<&str>,
) -> Result<(User, TokenPair), AppError> {
    let email = normalize_email(email);
    validate_email(&email)?;
    password::validate_new(pass)?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("User already exists".to_string()));
    }

    let username = username
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_username(&email));

    let hash = password::hash(pass)?;
    let user = state
        .store
        .create_user(NewUser::local(&email, &username, hash))
        .await?;

    let pair = start_session(state, &user).await?;
    tracing::info!("User {} signed up", user.id);
    Ok((user, pair))
}

/// Credentials are checked before the role so the response never reveals
/// which accounts hold staff roles.
pub async fn sign_in_admin(
    state: &AppState,
    email: &str,
    pass: &str,
) -> Result<(User, String), AppError> {
    let user = check_credentials(state, email, pass).await?;

    if !matches!(user.role, Role::Manager | Role::Admin) {
        return Err(AppError::Forbidden("Admin panel access denied".to_string()));
    }

    let token = state.tokens.issue_admin(&user)?;
    tracing::info!("User {} signed in to the admin panel", user.id);
    Ok((user, token))
}

/// Rotate a refresh token. Each token can be exchanged exactly once.
pub async fn refresh(state: &AppState, raw: &str) -> Result<TokenPair, AppError> {
    let claims = state.tokens.decode_unverified(raw)?;
    if claims.is_expired_at(Utc::now()) {
        return Err(AppError::Unauthorized("Refresh token has expired".to_string()));
    }

    let user = state
        .store
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let Some(stored) = user.refresh_token_hash.as_deref() else {
        return Err(AppError::Unauthorized("Session has ended".to_string()));
    };

    state.tokens.verify(TokenKind::Refresh, raw)?;

    if !tokens::matches_hash(raw, stored) {
        tracing::warn!("Stale refresh token presented for user {}", user.id);
        return Err(AppError::Forbidden("Refresh token has been revoked".to_string()));
    }

    let pair = state.tokens.issue_pair(&user)?;
    let rotated = state
        .store
        .swap_refresh_hash(user.id, stored, &tokens::hash_token(&pair.refresh_token))
        .await?;
    if !rotated {
        tracing::warn!("Concurrent refresh for user {} lost the swap", user.id);
        return Err(AppError::Forbidden("Refresh token has been revoked".to_string()));
    }

    tracing::debug!("Rotated refresh token for user {}", user.id);
    Ok(pair)
}

pub async fn log_out(state: &AppState, user_id: Uuid) -> Result<(), AppError> {
    if !state.store.set_refresh_hash(user_id, None).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    tracing::info!("User {user_id} logged out");
    Ok(())
}
