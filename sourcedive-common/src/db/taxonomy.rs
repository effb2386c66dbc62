//! Expertise, industry and organization tags
//!
//! The three tables share one shape (`id`, unique `name`, timestamps) and
//! attach to people through their own join table.

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use super::models::NamedRef;
use crate::{time, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Taxonomy {
    Expertise,
    Industry,
    Organization,
}

impl Taxonomy {
    pub const ALL: [Taxonomy; 3] = [
        Taxonomy::Expertise,
        Taxonomy::Industry,
        Taxonomy::Organization,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Taxonomy::Expertise => "expertise",
            Taxonomy::Industry => "industries",
            Taxonomy::Organization => "organizations",
        }
    }

    /// Join table linking people to this taxonomy
    pub fn join_table(&self) -> &'static str {
        match self {
            Taxonomy::Expertise => "person_expertise",
            Taxonomy::Industry => "person_industries",
            Taxonomy::Organization => "person_organizations",
        }
    }

    /// Foreign key column in [`Taxonomy::join_table`]
    pub fn join_column(&self) -> &'static str {
        match self {
            Taxonomy::Expertise => "expertise_id",
            Taxonomy::Industry => "industry_id",
            Taxonomy::Organization => "organization_id",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Taxonomy::Expertise => "expertise",
            Taxonomy::Industry => "industry",
            Taxonomy::Organization => "organization",
        }
    }
}

fn clean_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("name is required".to_string()));
    }
    Ok(name.to_string())
}

/// List entries ordered by name, optionally filtered by a name substring
pub async fn list(pool: &SqlitePool, taxonomy: Taxonomy, q: Option<&str>) -> Result<Vec<NamedRef>> {
    let pattern = q
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q));

    let sql = format!(
        "SELECT id, name FROM {} WHERE (? IS NULL OR name LIKE ?) ORDER BY name",
        taxonomy.table()
    );
    let rows = sqlx::query_as::<_, NamedRef>(&sql)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn create(pool: &SqlitePool, taxonomy: Taxonomy, name: &str) -> Result<NamedRef> {
    let name = clean_name(name)?;
    let now = time::now();

    let sql = format!(
        "INSERT INTO {} (name, created, updated) VALUES (?, ?, ?)",
        taxonomy.table()
    );
    let result = sqlx::query(&sql)
        .bind(&name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| {
            Error::from_unique_violation(e, format!("{} '{}' already exists", taxonomy.label(), name))
        })?;

    info!("Created {} '{}'", taxonomy.label(), name);
    Ok(NamedRef {
        id: result.last_insert_rowid(),
        name,
    })
}

/// Look up an entry by exact name, creating it when missing
pub async fn get_or_create(
    conn: &mut SqliteConnection,
    taxonomy: Taxonomy,
    name: &str,
) -> Result<i64> {
    let name = clean_name(name)?;

    let select = format!("SELECT id FROM {} WHERE name = ?", taxonomy.table());
    let existing: Option<i64> = sqlx::query_scalar(&select)
        .bind(&name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let now = time::now();
    let insert = format!(
        "INSERT INTO {} (name, created, updated) VALUES (?, ?, ?)",
        taxonomy.table()
    );
    let result = sqlx::query(&insert)
        .bind(&name)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_rowid())
}

pub async fn delete(pool: &SqlitePool, taxonomy: Taxonomy, id: i64) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE id = ?", taxonomy.table());
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("{} {}", taxonomy.label(), id)));
    }
    info!("Deleted {} {}", taxonomy.label(), id);
    Ok(())
}

/// Entries attached to a person, ordered by name
pub async fn refs_for_person(
    pool: &SqlitePool,
    taxonomy: Taxonomy,
    person_id: i64,
) -> Result<Vec<NamedRef>> {
    let sql = format!(
        r#"
        SELECT t.id, t.name
        FROM {table} t
        JOIN {join} j ON j.{column} = t.id
        WHERE j.person_id = ?
        ORDER BY t.name
        "#,
        table = taxonomy.table(),
        join = taxonomy.join_table(),
        column = taxonomy.join_column()
    );
    let rows = sqlx::query_as::<_, NamedRef>(&sql)
        .bind(person_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Replace a person's entries with `ids`
pub async fn set_for_person(
    conn: &mut SqliteConnection,
    taxonomy: Taxonomy,
    person_id: i64,
    ids: &[i64],
) -> Result<()> {
    let delete = format!("DELETE FROM {} WHERE person_id = ?", taxonomy.join_table());
    sqlx::query(&delete).bind(person_id).execute(&mut *conn).await?;

    let insert = format!(
        "INSERT OR IGNORE INTO {} (person_id, {}) VALUES (?, ?)",
        taxonomy.join_table(),
        taxonomy.join_column()
    );
    for id in ids {
        sqlx::query(&insert)
            .bind(person_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn ensure_exist(conn: &mut SqliteConnection, taxonomy: Taxonomy, ids: &[i64]) -> Result<()> {
    super::ensure_ids_exist(conn, taxonomy.table(), ids).await
}
