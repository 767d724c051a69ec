use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::VerificationCode;

/// Insert a new code, dropping any earlier ones for the same user.
pub async fn replace(
    pool: &PgPool,
    user_id: Uuid,
    code_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<VerificationCode, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM verification_codes WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let code = sqlx::query_as::<_, VerificationCode>(
        "INSERT INTO verification_codes (id, user_id, code_hash, expires_at)
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(code_hash)
    .bind(expires_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(code)
}

pub async fn list_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<VerificationCode>, sqlx::Error> {
    sqlx::query_as::<_, VerificationCode>(
        "SELECT * FROM verification_codes WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM verification_codes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM verification_codes WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
