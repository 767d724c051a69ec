use axum::Json;
use axum::extract::{Path, Query, State};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::cookies::{clear_admin_cookie, token_cookie};
use crate::auth::extractor::Principal;
use crate::auth::jwt::TokenKind;
use crate::auth::service;
use crate::error::AppError;
use crate::models::{Role, User, UserFilter};
use crate::routes::auth::{MessageResponse, SignInRequest};
use crate::state::SharedState;

#[derive(Serialize)]
pub struct AdminSignInResponse {
    pub user: User,
    pub admin_token: String,
}

#[derive(Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Deserialize)]
pub struct ChangeRole {
    pub role: Role,
}

pub async fn sign_in(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(req): Json<SignInRequest>,
) -> Result<(CookieJar, Json<AdminSignInResponse>), AppError> {
    let (user, token) = service::sign_in_admin(&state, &req.email, &req.password).await?;
    let jar = jar.add(token_cookie(
        TokenKind::Admin,
        token.clone(),
        state.config.secure_cookies,
    ));
    Ok((
        jar,
        Json(AdminSignInResponse {
            user,
            admin_token: token,
        }),
    ))
}

pub async fn log_out(principal: Principal, jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    tracing::info!("User {} left the admin panel", principal.user_id);
    (clear_admin_cookie(jar), MessageResponse::new("Logged out"))
}

pub async fn list_users(
    State(state): State<SharedState>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<UserPage>, AppError> {
    let users = state.store.list_users(&filter).await?;
    Ok(Json(UserPage {
        users,
        page: filter.page.unwrap_or(1).max(1),
        per_page: filter.limit(),
    }))
}

pub async fn change_role(
    principal: Principal,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeRole>,
) -> Result<Json<User>, AppError> {
    let user = state
        .store
        .set_role(id, req.role)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!(
        "User {} changed role of {} to {}",
        principal.user_id,
        user.id,
        user.role
    );
    Ok(Json(user))
}
