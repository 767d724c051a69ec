use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::account::{self, ProfileUpdate};
use crate::error::AppError;
use crate::models::User;
use crate::routes::auth::MessageResponse;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub code: String,
}

pub async fn get(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    Ok(Json(account::profile(&state, id).await?))
}

pub async fn update(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    Ok(Json(account::update_profile(&state, id, req).await?))
}

pub async fn delete(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    account::delete_account(&state, id).await?;
    Ok(MessageResponse::new("User deleted"))
}

pub async fn send_verification_code(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    account::send_verification_code(&state, id).await?;
    Ok(MessageResponse::new("Verification code sent"))
}

pub async fn verify_email(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(account::verify_email(&state, id, &req.code).await?))
}

pub async fn request_password_reset(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    account::request_password_reset(&state, id).await?;
    Ok(MessageResponse::new("Password reset link sent"))
}
