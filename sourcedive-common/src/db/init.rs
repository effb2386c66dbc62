//! Database initialization
//!
//! Creates the database on first run and brings the schema up to date on
//! every start. All table creation is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Per-connection pragma: ON DELETE SET NULL / CASCADE rely on it
                sqlx::query("PRAGMA foreign_keys = ON")
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("PRAGMA busy_timeout = 5000")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    // Manual migrations run after CREATE TABLE IF NOT EXISTS so that
    // legacy databases keep their data
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_users_table(pool).await?;
    create_dive_tables(pool).await?;
    create_taxonomy_tables(pool).await?;
    create_people_table(pool).await?;
    create_person_link_tables(pool).await?;
    create_interaction_tables(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            token_hash TEXT UNIQUE,
            is_staff INTEGER NOT NULL DEFAULT 0,
            last_login TIMESTAMP,
            created TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_dive_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dives (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created TIMESTAMP NOT NULL,
            updated TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dive_members (
            dive_id INTEGER NOT NULL REFERENCES dives(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (dive_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dive_members_user ON dive_members(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Expertise, industries and organizations share one shape
async fn create_taxonomy_tables(pool: &SqlitePool) -> Result<()> {
    for table in ["expertise", "industries", "organizations"] {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created TIMESTAMP NOT NULL,
                updated TIMESTAMP NOT NULL
            )
            "#,
            table
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    Ok(())
}

/// Create the people table
///
/// One row per source. `created_by` is cleared when the creating user is
/// deleted, which leaves private rows visible to nobody.
async fn create_people_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS people (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created TIMESTAMP NOT NULL,
            updated TIMESTAMP NOT NULL,
            privacy_level TEXT NOT NULL CHECK (privacy_level IN ('public', 'searchable', 'private_individual')),
            name TEXT NOT NULL,
            email_address TEXT NOT NULL,
            prefix TEXT,
            pronouns TEXT,
            title TEXT,
            type_of_expert TEXT,
            website TEXT,
            linkedin TEXT,
            twitter TEXT,
            skype TEXT,
            phone_number_primary TEXT,
            phone_number_secondary TEXT,
            city TEXT,
            state TEXT,
            country TEXT,
            timezone TEXT,
            language TEXT,
            gatekeeper INTEGER NOT NULL DEFAULT 0,
            import_notes TEXT,
            entry_method TEXT,
            entry_type TEXT DEFAULT 'manual',
            created_by INTEGER REFERENCES users(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_people_email ON people(email_address)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_people_updated ON people(updated)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_people_created_by ON people(created_by)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Many-to-many tables hanging off people
async fn create_person_link_tables(pool: &SqlitePool) -> Result<()> {
    let links = [
        ("person_expertise", "expertise_id", "expertise"),
        ("person_industries", "industry_id", "industries"),
        ("person_organizations", "organization_id", "organizations"),
        ("person_exportable_by", "dive_id", "dives"),
    ];

    for (table, column, target) in links {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                person_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
                {column} INTEGER NOT NULL REFERENCES {target}(id) ON DELETE CASCADE,
                PRIMARY KEY (person_id, {column})
            )
            "#,
            table = table,
            column = column,
            target = target
        );
        sqlx::query(&sql).execute(pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})",
            table = table,
            column = column
        );
        sqlx::query(&index).execute(pool).await?;
    }

    Ok(())
}

async fn create_interaction_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created TIMESTAMP NOT NULL,
            updated TIMESTAMP NOT NULL,
            privacy_level TEXT NOT NULL CHECK (privacy_level IN ('public', 'searchable', 'private_individual')),
            created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
            date_time TIMESTAMP NOT NULL,
            interaction_type TEXT NOT NULL DEFAULT '' CHECK (interaction_type IN ('', 'email', 'inperson', 'telephone')),
            interviewee_id INTEGER REFERENCES people(id) ON DELETE SET NULL,
            notes TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interaction_interviewers (
            interaction_id INTEGER NOT NULL REFERENCES interactions(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (interaction_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_interactions_interviewee ON interactions(interviewee_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_interactions_date_time ON interactions(date_time)")
        .execute(pool)
        .await?;

    Ok(())
}
