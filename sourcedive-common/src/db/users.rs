//! Users and API tokens
//!
//! Tokens are random 256-bit values handed out once; only their SHA-256
//! hash is stored.

use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use super::models::{validate_email, User};
use crate::config::AuthConfig;
use crate::{time, Error, Result};

const USER_COLUMNS: &str = "id, username, email, is_staff, last_login, created";

/// Generate a new random API token (64 hex characters)
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// SHA-256 of a token, hex encoded
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Register a user and issue their first token.
///
/// Registration is refused unless the email domain is whitelisted.
/// Returns the user and the plaintext token, which is not stored.
pub async fn register_user(
    pool: &SqlitePool,
    auth: &AuthConfig,
    username: &str,
    email: &str,
) -> Result<(User, String)> {
    let username = username.trim();
    let email = email.trim();
    if username.is_empty() {
        return Err(Error::InvalidInput("username is required".to_string()));
    }
    validate_email(email)?;
    if !auth.is_allowed_email(email) {
        return Err(Error::Forbidden(format!(
            "{} is not in an allowed email domain",
            email
        )));
    }

    let token = generate_token();
    let result = sqlx::query(
        "INSERT INTO users (username, email, token_hash, is_staff, created) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(username)
    .bind(email)
    .bind(hash_token(&token))
    .bind(time::now())
    .execute(pool)
    .await
    .map_err(|e| Error::from_unique_violation(e, format!("user '{}' already exists", username)))?;

    let user = get_user(pool, result.last_insert_rowid()).await?;
    info!("Registered user '{}' <{}>", user.username, user.email);
    Ok((user, token))
}

/// Replace a user's token, returning the new plaintext token
pub async fn issue_token(pool: &SqlitePool, auth: &AuthConfig, user_id: i64) -> Result<String> {
    let user = get_user(pool, user_id).await?;
    if !auth.is_allowed_email(&user.email) {
        return Err(Error::Forbidden(format!(
            "{} is not in an allowed email domain",
            user.email
        )));
    }

    let token = generate_token();
    sqlx::query("UPDATE users SET token_hash = ? WHERE id = ?")
        .bind(hash_token(&token))
        .bind(user_id)
        .execute(pool)
        .await?;

    info!("Issued new token for user '{}'", user.username);
    Ok(token)
}

/// Resolve a bearer token to its user.
///
/// The first successful authentication records `last_login` and grants
/// staff status.
pub async fn authenticate_token(pool: &SqlitePool, token: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE token_hash = ?", USER_COLUMNS);
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await?;

    let Some(mut user) = user else {
        return Ok(None);
    };

    if user.last_login.is_none() {
        let now = time::now();
        sqlx::query("UPDATE users SET last_login = ?, is_staff = 1 WHERE id = ?")
            .bind(now)
            .bind(user.id)
            .execute(pool)
            .await?;
        user.last_login = Some(now);
        user.is_staff = true;
        info!("First login for user '{}'", user.username);
    }

    Ok(Some(user))
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<User> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {}", id)))
}

pub async fn find_user_by_username(pool: &SqlitePool, username: &str) -> Result<User> {
    let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user '{}'", username)))
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>> {
    let sql = format!("SELECT {} FROM users ORDER BY username", USER_COLUMNS);
    let users = sqlx::query_as::<_, User>(&sql).fetch_all(pool).await?;
    Ok(users)
}

/// Look up a user by email (case-insensitive), creating a non-staff user
/// without a token when missing. The username defaults to the email.
pub async fn get_or_create_user_by_email(conn: &mut SqliteConnection, email: &str) -> Result<i64> {
    let email = email.trim();
    validate_email(email)?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let mut username = email.to_string();
    let mut suffix = 1;
    loop {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
            .bind(&username)
            .fetch_one(&mut *conn)
            .await?;
        if !taken {
            break;
        }
        suffix += 1;
        username = format!("{}-{}", email, suffix);
    }

    let result =
        sqlx::query("INSERT INTO users (username, email, is_staff, created) VALUES (?, ?, 0, ?)")
            .bind(&username)
            .bind(email)
            .bind(time::now())
            .execute(&mut *conn)
            .await?;

    info!("Created user '{}' from import", username);
    Ok(result.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_is_random_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_token_is_stable() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
