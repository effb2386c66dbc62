use sqlx::SqlitePool;
use std::io::Write;
use tracing::info;

use super::{EXPORT_COLUMNS, LIST_SEPARATOR};
use crate::db::dives;
use crate::db::people::person_from_row;
use crate::db::taxonomy::{self, Taxonomy};
use crate::db::NamedRef;
use crate::privacy::{self, can_view_contact_fields, Viewer};
use crate::Result;

fn join_names(refs: &[NamedRef]) -> String {
    refs.iter()
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

/// Write the sources `viewer` may export as CSV.
///
/// Included: sources the viewer created, plus sources made exportable by a
/// dive the viewer belongs to. Other users' private sources are never
/// written, and contact fields are blank where the viewer may not see them.
/// Returns the number of rows written.
pub async fn export_sources<W: Write>(
    pool: &SqlitePool,
    viewer: &Viewer,
    writer: W,
) -> Result<usize> {
    let sql = format!(
        r#"
        SELECT p.id, p.created, p.updated, p.privacy_level, p.name, p.email_address,
               p.prefix, p.pronouns, p.title, p.type_of_expert, p.website, p.linkedin,
               p.twitter, p.skype, p.phone_number_primary, p.phone_number_secondary,
               p.city, p.state, p.country, p.timezone, p.language, p.gatekeeper,
               p.import_notes, p.entry_method, p.entry_type, p.created_by,
               u.username AS created_by_username, u.email AS created_by_email
        FROM people p
        LEFT JOIN users u ON u.id = p.created_by
        WHERE {visible}
          AND (
              p.created_by = ?
              OR EXISTS (
                  SELECT 1
                  FROM person_exportable_by e
                  JOIN dive_members m ON m.dive_id = e.dive_id
                  WHERE e.person_id = p.id AND m.user_id = ?
              )
          )
        ORDER BY p.id
        "#,
        visible = privacy::visibility_clause("p")
    );
    let rows = sqlx::query(&sql)
        .bind(viewer.user_id)
        .bind(viewer.user_id)
        .bind(viewer.user_id)
        .fetch_all(pool)
        .await?;

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(EXPORT_COLUMNS)?;

    let mut count = 0;
    for row in &rows {
        let mut person = person_from_row(row)?;
        if !can_view_contact_fields(person.privacy_level, person.created_by, viewer) {
            person.redact_contact_fields();
        }

        let expertise = taxonomy::refs_for_person(pool, Taxonomy::Expertise, person.id).await?;
        let industries = taxonomy::refs_for_person(pool, Taxonomy::Industry, person.id).await?;
        let organizations =
            taxonomy::refs_for_person(pool, Taxonomy::Organization, person.id).await?;
        let owned_by = dives::exportable_by(pool, person.id).await?;

        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        let record: [String; 30] = [
            person.id.to_string(),
            person.created.to_rfc3339(),
            person.updated.to_rfc3339(),
            person.privacy_level.to_string(),
            person.name.clone(),
            text(&person.prefix),
            text(&person.pronouns),
            text(&person.title),
            text(&person.type_of_expert),
            text(&person.email_address),
            text(&person.phone_number_primary),
            text(&person.phone_number_secondary),
            text(&person.linkedin),
            text(&person.twitter),
            text(&person.skype),
            text(&person.website),
            text(&person.city),
            text(&person.state),
            text(&person.country),
            text(&person.timezone),
            text(&person.language),
            person.gatekeeper.to_string(),
            text(&person.import_notes),
            text(&person.entry_method),
            text(&person.entry_type),
            text(&person.created_by_email),
            join_names(&expertise),
            join_names(&industries),
            join_names(&organizations),
            join_names(&owned_by),
        ];
        csv_writer.write_record(&record)?;
        count += 1;
    }
    csv_writer.flush()?;

    info!("User '{}' exported {} sources", viewer.username, count);
    Ok(count)
}
