//! Database initialization, models and repositories

pub mod dives;
pub mod init;
pub mod interactions;
pub mod migrations;
pub mod models;
pub mod people;
pub mod taxonomy;
pub mod users;

pub use init::*;
pub use migrations::*;
pub use models::*;

use crate::{Error, Result};
use sqlx::SqliteConnection;

/// Fail with [`Error::InvalidInput`] unless every id exists in `table`
pub(crate) async fn ensure_ids_exist(
    conn: &mut SqliteConnection,
    table: &str,
    ids: &[i64],
) -> Result<()> {
    for id in ids {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", table);
        let exists: bool = sqlx::query_scalar(&sql).bind(id).fetch_one(&mut *conn).await?;
        if !exists {
            return Err(Error::InvalidInput(format!("No {} with id {}", table, id)));
        }
    }
    Ok(())
}
