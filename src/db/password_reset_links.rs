use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::PasswordResetLink;

/// Insert a new link, dropping any earlier ones for the same user.
pub async fn replace(
    pool: &PgPool,
    user_id: Uuid,
    link_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<PasswordResetLink, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM password_reset_links WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let link = sqlx::query_as::<_, PasswordResetLink>(
        "INSERT INTO password_reset_links (id, user_id, link_hash, expires_at)
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(link_hash)
    .bind(expires_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(link)
}

pub async fn find_by_hash(
    pool: &PgPool,
    link_hash: &str,
) -> Result<Option<PasswordResetLink>, sqlx::Error> {
    sqlx::query_as::<_, PasswordResetLink>(
        "SELECT * FROM password_reset_links WHERE link_hash = $1",
    )
    .bind(link_hash)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM password_reset_links WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM password_reset_links WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
