use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{NewUser, Role, User, UserChanges, UserFilter};

pub async fn create(pool: &PgPool, new_user: &NewUser) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, username, password_hash, email_verified, google_id, twitter_id, avatar_url)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&new_user.email)
    .bind(&new_user.username)
    .bind(&new_user.password_hash)
    .bind(new_user.email_verified)
    .bind(&new_user.google_id)
    .bind(&new_user.twitter_id)
    .bind(&new_user.avatar_url)
    .fetch_one(pool)
    .await
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    changes: &UserChanges,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET
            email = COALESCE($2, email),
            username = COALESCE($3, username),
            password_hash = COALESCE($4, password_hash),
            email_verified = COALESCE($5, email_verified),
            google_id = COALESCE($6, google_id),
            twitter_id = COALESCE($7, twitter_id),
            avatar_url = COALESCE($8, avatar_url),
            updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&changes.email)
    .bind(&changes.username)
    .bind(&changes.password_hash)
    .bind(changes.email_verified)
    .bind(&changes.google_id)
    .bind(&changes.twitter_id)
    .bind(&changes.avatar_url)
    .fetch_optional(pool)
    .await
}

pub async fn update_role(pool: &PgPool, id: Uuid, role: Role) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(role)
    .fetch_optional(pool)
    .await
}

pub async fn set_refresh_hash(
    pool: &PgPool,
    id: Uuid,
    hash: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET refresh_token_hash = $2 WHERE id = $1")
        .bind(id)
        .bind(hash)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn swap_refresh_hash(
    pool: &PgPool,
    id: Uuid,
    current: &str,
    next: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET refresh_token_hash = $3 WHERE id = $1 AND refresh_token_hash = $2",
    )
    .bind(id)
    .bind(current)
    .bind(next)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn exists(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Deletes a non-admin user. Returns the number of rows removed.
pub async fn delete_non_admin(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1 AND role <> 'Admin'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn list(pool: &PgPool, filter: &UserFilter) -> Result<Vec<User>, sqlx::Error> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM users WHERE TRUE");

    if let Some(role) = filter.role {
        query.push(" AND role = ").push_bind(role);
    }

    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        query
            .push(" AND (email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR username ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    query
        .push(" ORDER BY created_at ASC LIMIT ")
        .push_bind(i64::from(filter.limit()))
        .push(" OFFSET ")
        .push_bind(i64::from(filter.offset()));

    query.build_query_as::<User>().fetch_all(pool).await
}
