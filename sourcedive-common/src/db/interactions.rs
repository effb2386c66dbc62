//! Interactions (logged contact with a source)
//!
//! Notes follow the same rule as a source's contact fields: only the
//! creator or anyone for a public interaction may read them.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::info;

use super::models::{
    InlineInteraction, InteractionDetail, InteractionInput, InteractionQuery, InteractionRecord,
    InteractionSummary, InteractionType, NamedRef,
};
use crate::privacy::{
    self, can_view_contact_fields, is_owner, push_visibility_filter, PrivacyLevel, Viewer,
};
use crate::{time, Error, Result};

/// Select list shared by detail and list queries.
///
/// Contains one `?` bound to the viewer id so the interviewee's name is
/// only returned when the viewer may see that source.
const INTERACTION_COLUMNS: &str = r#"
    SELECT i.id, i.created, i.updated, i.privacy_level, i.created_by,
           u.username AS created_by_username, i.date_time, i.interaction_type,
           i.interviewee_id, i.notes,
           CASE
               WHEN ip.id IS NOT NULL
                    AND (ip.privacy_level != 'private_individual' OR ip.created_by = ?)
               THEN ip.name
           END AS interviewee_name
    FROM interactions i
    LEFT JOIN users u ON u.id = i.created_by
    LEFT JOIN people ip ON ip.id = i.interviewee_id
"#;

fn interaction_from_row(row: &SqliteRow) -> Result<InteractionRecord> {
    let level: String = row.try_get("privacy_level")?;
    let kind: String = row.try_get("interaction_type")?;
    let interaction_type = if kind.is_empty() {
        None
    } else {
        Some(kind.parse::<InteractionType>()?)
    };
    let notes: String = row.try_get("notes")?;
    let stored_interviewee: Option<i64> = row.try_get("interviewee_id")?;
    let interviewee_name: Option<String> = row.try_get("interviewee_name")?;
    let interviewee_hidden = stored_interviewee.is_some() && interviewee_name.is_none();

    Ok(InteractionRecord {
        id: row.try_get("id")?,
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
        privacy_level: level.parse()?,
        created_by: row.try_get("created_by")?,
        created_by_username: row.try_get("created_by_username")?,
        date_time: row.try_get("date_time")?,
        interaction_type,
        interviewee_id: stored_interviewee.filter(|_| !interviewee_hidden),
        interviewee_name,
        interviewee_hidden,
        notes: Some(notes),
    })
}

/// Users who conducted an interaction, ordered by username
pub async fn interviewers(pool: &SqlitePool, interaction_id: i64) -> Result<Vec<NamedRef>> {
    let rows = sqlx::query_as::<_, NamedRef>(
        r#"
        SELECT u.id, u.username AS name
        FROM interaction_interviewers ii
        JOIN users u ON u.id = ii.user_id
        WHERE ii.interaction_id = ?
        ORDER BY u.username
        "#,
    )
    .bind(interaction_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn set_interviewers(
    conn: &mut SqliteConnection,
    interaction_id: i64,
    user_ids: &[i64],
) -> Result<()> {
    sqlx::query("DELETE FROM interaction_interviewers WHERE interaction_id = ?")
        .bind(interaction_id)
        .execute(&mut *conn)
        .await?;
    for user_id in user_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO interaction_interviewers (interaction_id, user_id) VALUES (?, ?)",
        )
        .bind(interaction_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// The interviewee must exist and be visible to the viewer
async fn ensure_interviewee_visible(
    conn: &mut SqliteConnection,
    viewer: &Viewer,
    person_id: i64,
) -> Result<()> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM people p WHERE p.id = ? AND {})",
        privacy::visibility_clause("p")
    );
    let visible: bool = sqlx::query_scalar(&sql)
        .bind(person_id)
        .bind(viewer.user_id)
        .fetch_one(&mut *conn)
        .await?;
    if !visible {
        return Err(Error::InvalidInput(format!("No source with id {}", person_id)));
    }
    Ok(())
}

pub async fn create_interaction(
    pool: &SqlitePool,
    viewer: &Viewer,
    mut input: InteractionInput,
) -> Result<i64> {
    input.normalize();
    let level = input
        .privacy_level
        .ok_or_else(|| Error::InvalidInput("privacy_level is required".to_string()))?;
    let date_time = input
        .date_time
        .ok_or_else(|| Error::InvalidInput("date_time is required".to_string()))?;

    let mut tx = pool.begin().await?;
    if let Some(person_id) = input.interviewee_id {
        ensure_interviewee_visible(&mut tx, viewer, person_id).await?;
    }
    super::ensure_ids_exist(&mut tx, "users", &input.interviewers).await?;

    let now = time::now();
    let result = sqlx::query(
        r#"
        INSERT INTO interactions (
            created, updated, privacy_level, created_by, date_time,
            interaction_type, interviewee_id, notes
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(level.as_str())
    .bind(viewer.user_id)
    .bind(date_time)
    .bind(input.interaction_type.map(|t| t.as_str()).unwrap_or_default())
    .bind(input.interviewee_id)
    .bind(input.notes.as_deref().unwrap_or_default())
    .execute(&mut *tx)
    .await?;

    let id = result.last_insert_rowid();
    set_interviewers(&mut tx, id, &input.interviewers).await?;
    tx.commit().await?;

    info!("User '{}' created interaction {}", viewer.username, id);
    Ok(id)
}

/// Load an interaction visible to `viewer`, unredacted
pub async fn get_interaction_record(
    pool: &SqlitePool,
    viewer: &Viewer,
    id: i64,
) -> Result<InteractionRecord> {
    let sql = format!(
        "{} WHERE i.id = ? AND {}",
        INTERACTION_COLUMNS,
        privacy::visibility_clause("i")
    );
    let row = sqlx::query(&sql)
        .bind(viewer.user_id)
        .bind(id)
        .bind(viewer.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("interaction {}", id)))?;

    interaction_from_row(&row)
}

/// Load an interaction as shown to `viewer`
pub async fn get_interaction(
    pool: &SqlitePool,
    viewer: &Viewer,
    id: i64,
) -> Result<InteractionDetail> {
    let mut interaction = get_interaction_record(pool, viewer, id).await?;
    let notes_visible =
        can_view_contact_fields(interaction.privacy_level, interaction.created_by, viewer);

    let notes_semiprivate_display = if notes_visible {
        None
    } else {
        interaction.notes = None;
        Some(privacy::redaction_notice(
            interaction.created_by_username.as_deref(),
        ))
    };

    Ok(InteractionDetail {
        display: interaction.display(),
        interviewers: interviewers(pool, id).await?,
        notes_visible,
        notes_semiprivate_display,
        fields: privacy::interaction_fields(!notes_visible),
        readonly_fields: privacy::interaction_readonly_fields(!notes_visible),
        interaction,
    })
}

fn push_interaction_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    viewer: &Viewer,
    query: &InteractionQuery,
) {
    builder.push(" WHERE ");
    push_visibility_filter(builder, "i", viewer);
    if let Some(kind) = query.interaction_type {
        builder.push(" AND i.interaction_type = ");
        builder.push_bind(kind.as_str());
    }
}

pub async fn count_interactions(
    pool: &SqlitePool,
    viewer: &Viewer,
    query: &InteractionQuery,
) -> Result<i64> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM interactions i");
    push_interaction_filters(&mut builder, viewer, query);
    let count = builder.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(count)
}

/// One page of the interactions change list, most recent first
pub async fn list_interactions(
    pool: &SqlitePool,
    viewer: &Viewer,
    query: &InteractionQuery,
    limit: i64,
    offset: i64,
) -> Result<Vec<InteractionSummary>> {
    // INTERACTION_COLUMNS carries its own placeholder, so bind it by hand
    let (head, tail) = INTERACTION_COLUMNS
        .split_once('?')
        .ok_or_else(|| Error::Internal("interaction select has no placeholder".to_string()))?;
    let mut builder = QueryBuilder::<Sqlite>::new(head);
    builder.push_bind(viewer.user_id);
    builder.push(tail);
    push_interaction_filters(&mut builder, viewer, query);
    builder.push(" ORDER BY i.date_time DESC, i.id DESC LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let rows = builder.build().fetch_all(pool).await?;
    let mut summaries = Vec::with_capacity(rows.len());
    for row in &rows {
        let record = interaction_from_row(row)?;
        let names: Vec<String> = interviewers(pool, record.id)
            .await?
            .into_iter()
            .map(|u| u.name)
            .collect();
        summaries.push(InteractionSummary {
            id: record.id,
            display: record.display(),
            interviewee: record.interviewee_name.clone(),
            interaction_type: record.interaction_type,
            date_time: record.date_time,
            created_by: record.created_by_username.clone(),
            interviewers: names.join(", "),
            privacy_level: record.privacy_level,
        });
    }
    Ok(summaries)
}

/// Replace an interaction's editable fields.
///
/// When the viewer cannot read the notes, notes and privacy level are
/// read-only: notes must be omitted and the level left unchanged.
pub async fn update_interaction(
    pool: &SqlitePool,
    viewer: &Viewer,
    id: i64,
    mut input: InteractionInput,
) -> Result<()> {
    let existing = get_interaction_record(pool, viewer, id).await?;
    let redacted = !can_view_contact_fields(existing.privacy_level, existing.created_by, viewer);

    input.normalize();
    if redacted {
        if input.notes.is_some() {
            return Err(Error::Forbidden(
                "Notes of this interaction are read-only for you".to_string(),
            ));
        }
        if input.privacy_level.is_some_and(|l| l != existing.privacy_level) {
            return Err(Error::Forbidden(
                "Privacy level of this interaction is read-only for you".to_string(),
            ));
        }
    }

    let level: PrivacyLevel = match input.privacy_level {
        Some(level) => level,
        None if redacted => existing.privacy_level,
        None => return Err(Error::InvalidInput("privacy_level is required".to_string())),
    };
    let date_time = input
        .date_time
        .ok_or_else(|| Error::InvalidInput("date_time is required".to_string()))?;
    let notes = if redacted {
        existing.notes.clone().unwrap_or_default()
    } else {
        input.notes.clone().unwrap_or_default()
    };

    let mut tx = pool.begin().await?;
    let interviewee_id = match input.interviewee_id {
        // A hidden interviewee is kept unless the viewer picks another source
        None if existing.interviewee_hidden => {
            sqlx::query_scalar::<_, Option<i64>>(
                "SELECT interviewee_id FROM interactions WHERE id = ?",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?
        }
        Some(person_id) => {
            if existing.interviewee_id != Some(person_id) {
                ensure_interviewee_visible(&mut tx, viewer, person_id).await?;
            }
            Some(person_id)
        }
        None => None,
    };
    super::ensure_ids_exist(&mut tx, "users", &input.interviewers).await?;

    sqlx::query(
        r#"
        UPDATE interactions SET
            updated = ?, privacy_level = ?, date_time = ?, interaction_type = ?,
            interviewee_id = ?, notes = ?
        WHERE id = ?
        "#,
    )
    .bind(time::now())
    .bind(level.as_str())
    .bind(date_time)
    .bind(input.interaction_type.map(|t| t.as_str()).unwrap_or_default())
    .bind(interviewee_id)
    .bind(notes)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    set_interviewers(&mut tx, id, &input.interviewers).await?;
    tx.commit().await?;

    info!("User '{}' updated interaction {}", viewer.username, id);
    Ok(())
}

/// Delete an interaction. Only the creator may do so.
pub async fn delete_interaction(pool: &SqlitePool, viewer: &Viewer, id: i64) -> Result<()> {
    let existing = get_interaction_record(pool, viewer, id).await?;
    if !is_owner(existing.created_by, viewer) {
        return Err(Error::Forbidden(
            "Only the creator of an interaction may delete it".to_string(),
        ));
    }

    sqlx::query("DELETE FROM interactions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    info!("User '{}' deleted interaction {}", viewer.username, id);
    Ok(())
}

/// Interactions shown on a source's page: visible ones, newest first, with
/// hidden notes replaced by a notice
pub async fn inline_interactions_for_person(
    pool: &SqlitePool,
    viewer: &Viewer,
    person_id: i64,
) -> Result<Vec<InlineInteraction>> {
    let sql = format!(
        "{} WHERE i.interviewee_id = ? AND {} ORDER BY i.date_time DESC, i.id DESC",
        INTERACTION_COLUMNS,
        privacy::visibility_clause("i")
    );
    let rows = sqlx::query(&sql)
        .bind(viewer.user_id)
        .bind(person_id)
        .bind(viewer.user_id)
        .fetch_all(pool)
        .await?;

    let mut inline = Vec::with_capacity(rows.len());
    for row in &rows {
        let record = interaction_from_row(row)?;
        // Searchable notes stay on the interaction page, even for their creator
        let notes_view = if record.privacy_level == PrivacyLevel::Searchable {
            privacy::inline_notes_notice(record.created_by_username.as_deref())
        } else {
            record.notes.clone().unwrap_or_default()
        };
        inline.push(InlineInteraction {
            id: record.id,
            privacy_level: record.privacy_level,
            date_time: record.date_time,
            interaction_type: record.interaction_type,
            interviewers: interviewers(pool, record.id).await?,
            created_by: record.created_by_username,
            notes_view,
        });
    }
    Ok(inline)
}
