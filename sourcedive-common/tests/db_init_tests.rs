//! Tests for database creation and migrations

use sourcedive_common::db::{get_schema_version, init_database, CURRENT_SCHEMA_VERSION};
use sqlx::sqlite::SqlitePoolOptions;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("data").join("sourcedive.db");

    let pool = init_database(&db_path).await.expect("init failed");
    assert!(db_path.exists(), "Database file was not created");

    let version = get_schema_version(&pool).await.unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sourcedive.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("sourcedive.db")).await.unwrap();

    for table in [
        "users",
        "dives",
        "dive_members",
        "expertise",
        "industries",
        "organizations",
        "people",
        "person_expertise",
        "person_industries",
        "person_organizations",
        "person_exportable_by",
        "interactions",
        "interaction_interviewers",
        "schema_version",
    ] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_foreign_keys_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("sourcedive.db")).await.unwrap();

    let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(enabled, 1);
}

#[tokio::test]
async fn test_migration_v1_renames_legacy_notes_column() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("legacy.db");

    // Build a database the way early releases did
    {
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new().connect(&url).await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE people (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created TIMESTAMP NOT NULL,
                updated TIMESTAMP NOT NULL,
                privacy_level TEXT NOT NULL,
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
                notes TEXT,
                entry_method TEXT,
                entry_type TEXT DEFAULT 'manual',
                created_by INTEGER
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO people (created, updated, privacy_level, name, email_address, notes) \
             VALUES ('2019-01-01 00:00:00+00:00', '2019-01-01 00:00:00+00:00', 'public', 'Ada', 'ada@example.com', 'met at conference')",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    let pool = init_database(&db_path).await.unwrap();

    let notes: Option<String> =
        sqlx::query_scalar("SELECT import_notes FROM people WHERE email_address = 'ada@example.com'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(notes.as_deref(), Some("met at conference"));
    assert_eq!(get_schema_version(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sourcedive.db");

    let pool = init_database(&db_path).await.unwrap();
    sourcedive_common::db::run_migrations(&pool).await.unwrap();
    sourcedive_common::db::run_migrations(&pool).await.unwrap();

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}
