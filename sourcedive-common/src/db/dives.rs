//! Dives (teams of users)
//!
//! A source can be made exportable by one or more dives; every member of
//! such a dive may then include it in a CSV export.

use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;

use super::models::{Dive, NamedRef};
use crate::{time, Error, Result};

pub async fn create_dive(pool: &SqlitePool, name: &str) -> Result<Dive> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("name is required".to_string()));
    }

    let now = time::now();
    let result = sqlx::query("INSERT INTO dives (name, created, updated) VALUES (?, ?, ?)")
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| Error::from_unique_violation(e, format!("dive '{}' already exists", name)))?;

    info!("Created dive '{}'", name);
    Ok(Dive {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        members: Vec::new(),
        created: now,
        updated: now,
    })
}

/// Load one dive with its members
pub async fn get_dive(pool: &SqlitePool, id: i64) -> Result<Dive> {
    let row = sqlx::query("SELECT id, name, created, updated FROM dives WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("dive {}", id)))?;

    Ok(Dive {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
        members: members(pool, id).await?,
    })
}

/// All dives ordered by name, with members
pub async fn list_dives(pool: &SqlitePool) -> Result<Vec<Dive>> {
    let rows = sqlx::query("SELECT id, name, created, updated FROM dives ORDER BY name")
        .fetch_all(pool)
        .await?;

    let mut dives = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get("id")?;
        dives.push(Dive {
            id,
            name: row.try_get("name")?,
            created: row.try_get("created")?,
            updated: row.try_get("updated")?,
            members: members(pool, id).await?,
        });
    }
    Ok(dives)
}

async fn members(pool: &SqlitePool, dive_id: i64) -> Result<Vec<NamedRef>> {
    let rows = sqlx::query_as::<_, NamedRef>(
        r#"
        SELECT u.id, u.username AS name
        FROM dive_members m
        JOIN users u ON u.id = m.user_id
        WHERE m.dive_id = ?
        ORDER BY u.username
        "#,
    )
    .bind(dive_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn add_member(pool: &SqlitePool, dive_id: i64, user_id: i64) -> Result<()> {
    let mut conn = pool.acquire().await?;
    super::ensure_ids_exist(&mut conn, "dives", &[dive_id])
        .await
        .map_err(|_| Error::NotFound(format!("dive {}", dive_id)))?;
    super::ensure_ids_exist(&mut conn, "users", &[user_id])
        .await
        .map_err(|_| Error::NotFound(format!("user {}", user_id)))?;

    sqlx::query("INSERT OR IGNORE INTO dive_members (dive_id, user_id) VALUES (?, ?)")
        .bind(dive_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    touch(&mut conn, dive_id).await?;

    info!("Added user {} to dive {}", user_id, dive_id);
    Ok(())
}

pub async fn remove_member(pool: &SqlitePool, dive_id: i64, user_id: i64) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let result = sqlx::query("DELETE FROM dive_members WHERE dive_id = ? AND user_id = ?")
        .bind(dive_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!(
            "user {} is not a member of dive {}",
            user_id, dive_id
        )));
    }
    touch(&mut conn, dive_id).await?;

    info!("Removed user {} from dive {}", user_id, dive_id);
    Ok(())
}

async fn touch(conn: &mut SqliteConnection, dive_id: i64) -> Result<()> {
    sqlx::query("UPDATE dives SET updated = ? WHERE id = ?")
        .bind(time::now())
        .bind(dive_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Look up a dive by exact name, creating it when missing
pub async fn get_or_create_dive(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("dive name is required".to_string()));
    }

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM dives WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let now = time::now();
    let result = sqlx::query("INSERT INTO dives (name, created, updated) VALUES (?, ?, ?)")
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Dives a person is exportable by
pub async fn exportable_by(pool: &SqlitePool, person_id: i64) -> Result<Vec<NamedRef>> {
    let rows = sqlx::query_as::<_, NamedRef>(
        r#"
        SELECT d.id, d.name
        FROM dives d
        JOIN person_exportable_by e ON e.dive_id = d.id
        WHERE e.person_id = ?
        ORDER BY d.name
        "#,
    )
    .bind(person_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Replace the dives a person is exportable by
pub async fn set_exportable_by(
    conn: &mut SqliteConnection,
    person_id: i64,
    dive_ids: &[i64],
) -> Result<()> {
    sqlx::query("DELETE FROM person_exportable_by WHERE person_id = ?")
        .bind(person_id)
        .execute(&mut *conn)
        .await?;

    for dive_id in dive_ids {
        sqlx::query("INSERT OR IGNORE INTO person_exportable_by (person_id, dive_id) VALUES (?, ?)")
            .bind(person_id)
            .bind(dive_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
