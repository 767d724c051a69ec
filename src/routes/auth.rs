use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::account;
use crate::auth::cookies::{clear_session_cookies, session_cookies};
use crate::auth::extractor::Principal;
use crate::auth::guard::extract_token;
use crate::auth::jwt::{TokenKind, TokenPair};
use crate::auth::service;
use crate::error::AppError;
use crate::models::User;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
}

#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

fn auth_response(user: User, pair: TokenPair) -> Json<AuthResponse> {
    Json(AuthResponse {
        user,
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    })
}

pub async fn sign_up(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(req): Json<SignUpRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AppError> {
    let (user, pair) =
        service::sign_up(&state, &req.email, &req.password, req.username.as_deref()).await?;
    let jar = session_cookies(jar, &pair, state.config.secure_cookies);
    Ok((StatusCode::CREATED, jar, auth_response(user, pair)))
}

pub async fn sign_in(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(req): Json<SignInRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let (user, pair) = service::sign_in(&state, &req.email, &req.password).await?;
    let jar = session_cookies(jar, &pair, state.config.secure_cookies);
    Ok((jar, auth_response(user, pair)))
}

pub async fn log_out(
    State(state): State<SharedState>,
    principal: Principal,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    service::log_out(&state, principal.user_id).await?;
    Ok((clear_session_cookies(jar), MessageResponse::new("Logged out")))
}

/// Takes the refresh token from its cookie, or from a bearer header.
pub async fn refresh(
    State(state): State<SharedState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<TokenPair>), AppError> {
    let raw = extract_token(&headers, TokenKind::Refresh.cookie_name())
        .ok_or_else(|| AppError::Unauthorized("Refresh token is not provided".to_string()))?;

    let pair = service::refresh(&state, &raw).await?;
    let jar = session_cookies(jar, &pair, state.config.secure_cookies);
    Ok((jar, Json(pair)))
}

pub async fn reset_password(
    State(state): State<SharedState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    account::reset_password(&state, &req.token, &req.password).await?;
    Ok(MessageResponse::new("Password has been reset"))
}
