use sqlx::PgPool;
use uuid::Uuid;

use crate::models::User;

pub struct NewUser<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub user_name: &'a str,
    pub avatar_url: &'a str,
    pub blur_hash: &'a str,
}

pub async fn create(pool: &PgPool, new: &NewUser<'_>) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, password_hash, user_name, avatar_url, blur_hash)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(new.id)
    .bind(new.email)
    .bind(new.password_hash)
    .bind(new.user_name)
    .bind(new.avatar_url)
    .bind(new.blur_hash)
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

/// Swap in `new_hash` only if the stored hash is still `expected_old_hash`.
/// Returns false when another update got there first.
pub async fn update_password(
    pool: &PgPool,
    id: Uuid,
    expected_old_hash: &str,
    new_hash: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET password_hash = $3, updated_at = now()
         WHERE id = $1 AND password_hash = $2",
    )
    .bind(id)
    .bind(expected_old_hash)
    .bind(new_hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
