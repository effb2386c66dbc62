//! Sources (people)
//!
//! Every read goes through the viewer's row visibility filter, and detail
//! reads redact contact fields the viewer may not see.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::info;

use super::dives;
use super::interactions;
use super::models::{
    FilterOptions, FormLayout, PersonDetail, PersonInput, PersonQuery, PersonRecord,
    PersonSummary, ENTRY_METHOD_ADMIN_FORM, ENTRY_TYPE_MANUAL,
};
use super::taxonomy::{self, Taxonomy};
use crate::privacy::{
    self, can_view_contact_fields, is_owner, push_contact_visibility_filter,
    push_visibility_filter, PrivacyLevel, Viewer, PERSON_CONTACT_FIELDS,
    SEMIPRIVATE_DISPLAY_SUFFIX,
};
use crate::{time, Error, Result};

const PERSON_SELECT: &str = r#"
    SELECT p.id, p.created, p.updated, p.privacy_level, p.name, p.email_address,
           p.prefix, p.pronouns, p.title, p.type_of_expert, p.website, p.linkedin,
           p.twitter, p.skype, p.phone_number_primary, p.phone_number_secondary,
           p.city, p.state, p.country, p.timezone, p.language, p.gatekeeper,
           p.import_notes, p.entry_method, p.entry_type, p.created_by,
           u.username AS created_by_username, u.email AS created_by_email
    FROM people p
    LEFT JOIN users u ON u.id = p.created_by
"#;

/// A person ready to be written, with server-managed fields filled in
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub input: PersonInput,
    pub created_by: Option<i64>,
    pub entry_method: Option<String>,
    pub entry_type: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

pub(crate) fn person_from_row(row: &SqliteRow) -> Result<PersonRecord> {
    let level: String = row.try_get("privacy_level")?;
    Ok(PersonRecord {
        id: row.try_get("id")?,
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
        privacy_level: level.parse()?,
        name: row.try_get("name")?,
        email_address: row.try_get("email_address")?,
        prefix: row.try_get("prefix")?,
        pronouns: row.try_get("pronouns")?,
        title: row.try_get("title")?,
        type_of_expert: row.try_get("type_of_expert")?,
        website: row.try_get("website")?,
        linkedin: row.try_get("linkedin")?,
        twitter: row.try_get("twitter")?,
        skype: row.try_get("skype")?,
        phone_number_primary: row.try_get("phone_number_primary")?,
        phone_number_secondary: row.try_get("phone_number_secondary")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        country: row.try_get("country")?,
        timezone: row.try_get("timezone")?,
        language: row.try_get("language")?,
        gatekeeper: row.try_get("gatekeeper")?,
        import_notes: row.try_get("import_notes")?,
        entry_method: row.try_get("entry_method")?,
        entry_type: row.try_get("entry_type")?,
        created_by: row.try_get("created_by")?,
        created_by_username: row.try_get("created_by_username")?,
        created_by_email: row.try_get("created_by_email")?,
    })
}

/// Validate the relations referenced by an input
async fn ensure_relations_exist(conn: &mut SqliteConnection, input: &PersonInput) -> Result<()> {
    taxonomy::ensure_exist(conn, Taxonomy::Expertise, &input.expertise).await?;
    taxonomy::ensure_exist(conn, Taxonomy::Industry, &input.industries).await?;
    taxonomy::ensure_exist(conn, Taxonomy::Organization, &input.organizations).await?;
    super::ensure_ids_exist(conn, "dives", &input.exportable_by).await?;
    Ok(())
}

async fn write_relations(
    conn: &mut SqliteConnection,
    person_id: i64,
    input: &PersonInput,
) -> Result<()> {
    taxonomy::set_for_person(conn, Taxonomy::Expertise, person_id, &input.expertise).await?;
    taxonomy::set_for_person(conn, Taxonomy::Industry, person_id, &input.industries).await?;
    taxonomy::set_for_person(conn, Taxonomy::Organization, person_id, &input.organizations)
        .await?;
    dives::set_exportable_by(conn, person_id, &input.exportable_by).await?;
    Ok(())
}

/// Insert a person row and its relations without validation
pub async fn insert_person(conn: &mut SqliteConnection, person: &NewPerson) -> Result<i64> {
    let input = &person.input;
    let level = input
        .privacy_level
        .ok_or_else(|| Error::InvalidInput("privacy_level is required".to_string()))?;

    let result = sqlx::query(
        r#"
        INSERT INTO people (
            created, updated, privacy_level, name, email_address, prefix, pronouns,
            title, type_of_expert, website, linkedin, twitter, skype,
            phone_number_primary, phone_number_secondary, city, state, country,
            timezone, language, gatekeeper, import_notes, entry_method, entry_type,
            created_by
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(person.created)
    .bind(person.updated)
    .bind(level.as_str())
    .bind(input.name.as_deref().unwrap_or_default())
    .bind(input.email_address.as_deref().unwrap_or_default())
    .bind(&input.prefix)
    .bind(&input.pronouns)
    .bind(&input.title)
    .bind(&input.type_of_expert)
    .bind(&input.website)
    .bind(&input.linkedin)
    .bind(&input.twitter)
    .bind(&input.skype)
    .bind(&input.phone_number_primary)
    .bind(&input.phone_number_secondary)
    .bind(&input.city)
    .bind(&input.state)
    .bind(&input.country)
    .bind(&input.timezone)
    .bind(&input.language)
    .bind(input.gatekeeper)
    .bind(&input.import_notes)
    .bind(&person.entry_method)
    .bind(person.entry_type.as_deref().unwrap_or(ENTRY_TYPE_MANUAL))
    .bind(person.created_by)
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    write_relations(conn, id, input).await?;
    Ok(id)
}

/// Create a person on behalf of `viewer`
pub async fn create_person(pool: &SqlitePool, viewer: &Viewer, mut input: PersonInput) -> Result<i64> {
    input.normalize();
    input.validate(true)?;

    let mut tx = pool.begin().await?;
    ensure_relations_exist(&mut tx, &input).await?;

    let now = time::now();
    let name = input.name.clone().unwrap_or_default();
    let person = NewPerson {
        input,
        created_by: Some(viewer.user_id),
        entry_method: Some(ENTRY_METHOD_ADMIN_FORM.to_string()),
        entry_type: Some(ENTRY_TYPE_MANUAL.to_string()),
        created: now,
        updated: now,
    };
    let id = insert_person(&mut tx, &person).await?;
    tx.commit().await?;

    info!("User '{}' created person {} ({})", viewer.username, id, name);
    Ok(id)
}

/// Load a person visible to `viewer`, unredacted
pub async fn get_person_record(pool: &SqlitePool, viewer: &Viewer, id: i64) -> Result<PersonRecord> {
    let sql = format!(
        "{} WHERE p.id = ? AND {}",
        PERSON_SELECT,
        privacy::visibility_clause("p")
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(viewer.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("person {}", id)))?;

    person_from_row(&row)
}

/// Load a person as shown to `viewer`
pub async fn get_person(pool: &SqlitePool, viewer: &Viewer, id: i64) -> Result<PersonDetail> {
    let mut person = get_person_record(pool, viewer, id).await?;
    let contact_fields_visible =
        can_view_contact_fields(person.privacy_level, person.created_by, viewer);

    let mut semiprivate_display = BTreeMap::new();
    if !contact_fields_visible {
        person.redact_contact_fields();
        let notice = privacy::redaction_notice(person.created_by_username.as_deref());
        for field in PERSON_CONTACT_FIELDS {
            semiprivate_display.insert(
                format!("{}{}", field, SEMIPRIVATE_DISPLAY_SUFFIX),
                notice.clone(),
            );
        }
    }

    Ok(PersonDetail {
        contact_fields_visible,
        semiprivate_display,
        expertise: taxonomy::refs_for_person(pool, Taxonomy::Expertise, id).await?,
        industries: taxonomy::refs_for_person(pool, Taxonomy::Industry, id).await?,
        organizations: taxonomy::refs_for_person(pool, Taxonomy::Organization, id).await?,
        exportable_by: dives::exportable_by(pool, id).await?,
        interactions: interactions::inline_interactions_for_person(pool, viewer, id).await?,
        person,
    })
}

/// Change-page layout for `viewer` on an existing person
pub async fn person_layout(pool: &SqlitePool, viewer: &Viewer, id: i64) -> Result<FormLayout> {
    let person = get_person_record(pool, viewer, id).await?;
    let redacted = !can_view_contact_fields(person.privacy_level, person.created_by, viewer);
    Ok(FormLayout {
        fieldsets: privacy::person_fieldsets(redacted),
        readonly_fields: privacy::person_readonly_fields(redacted),
    })
}

/// Escape LIKE wildcards and wrap in `%`
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_taxonomy_exists(builder: &mut QueryBuilder<'_, Sqlite>, taxonomy: Taxonomy, op: &str) {
    builder.push(format!(
        "EXISTS (SELECT 1 FROM {join} j JOIN {table} t ON t.id = j.{column} \
         WHERE j.person_id = p.id AND t.name {op} ",
        join = taxonomy.join_table(),
        table = taxonomy.table(),
        column = taxonomy.join_column(),
        op = op
    ));
}

/// Append the viewer's visibility and every list filter
fn push_person_filters(builder: &mut QueryBuilder<'_, Sqlite>, viewer: &Viewer, query: &PersonQuery) {
    builder.push(" WHERE ");
    push_visibility_filter(builder, "p", viewer);

    let taxonomy_filters = [
        (Taxonomy::Industry, &query.industry),
        (Taxonomy::Expertise, &query.expertise),
        (Taxonomy::Organization, &query.organization),
    ];
    for (taxonomy, value) in taxonomy_filters {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            builder.push(" AND ");
            push_taxonomy_exists(builder, taxonomy, "=");
            builder.push_bind(value.to_string());
            builder.push(")");
        }
    }

    let column_filters = [
        ("timezone", &query.timezone),
        ("city", &query.city),
        ("state", &query.state),
    ];
    for (column, value) in column_filters {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            builder.push(format!(" AND p.{} = ", column));
            builder.push_bind(value.to_string());
        }
    }

    if let Some(level) = query.privacy_level {
        builder.push(" AND p.privacy_level = ");
        builder.push_bind(level.as_str());
    }

    // Every whitespace-separated term must match at least one field
    let terms = query.q.as_deref().unwrap_or_default().split_whitespace();
    for term in terms {
        let pattern = like_pattern(term);
        builder.push(" AND (");
        for (i, column) in [
            "city",
            "country",
            "language",
            "name",
            "import_notes",
            "state",
            "title",
            "type_of_expert",
            "twitter",
            "website",
        ]
        .iter()
        .enumerate()
        {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push(format!("p.{} LIKE ", column));
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\'");
        }

        // Email only matches where the viewer may see it
        builder.push(" OR (");
        push_contact_visibility_filter(builder, "p", viewer);
        builder.push(" AND p.email_address LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\')");

        for taxonomy in [Taxonomy::Expertise, Taxonomy::Organization] {
            builder.push(" OR ");
            push_taxonomy_exists(builder, taxonomy, "LIKE");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\')");
        }
        builder.push(")");
    }
}

/// Number of people matching `query` that `viewer` may see
pub async fn count_people(pool: &SqlitePool, viewer: &Viewer, query: &PersonQuery) -> Result<i64> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM people p");
    push_person_filters(&mut builder, viewer, query);
    let count = builder.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(count)
}

/// One page of the people change list, most recently updated first
pub async fn list_people(
    pool: &SqlitePool,
    viewer: &Viewer,
    query: &PersonQuery,
    limit: i64,
    offset: i64,
) -> Result<Vec<PersonSummary>> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT p.id, p.name, p.updated, p.privacy_level, u.username AS created_by \
         FROM people p LEFT JOIN users u ON u.id = p.created_by",
    );
    push_person_filters(&mut builder, viewer, query);
    builder.push(" ORDER BY p.updated DESC, p.id DESC LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter()
        .map(|row| -> Result<PersonSummary> {
            let level: String = row.try_get("privacy_level")?;
            Ok(PersonSummary {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                updated: row.try_get("updated")?,
                created_by: row.try_get("created_by")?,
                privacy_level: level.parse()?,
            })
        })
        .collect()
}

/// Replace a person's editable fields.
///
/// Contact fields and the privacy level are read-only for a viewer who
/// cannot see the contact fields. Contact fields must be left out of the
/// input; the privacy level may be omitted or repeated unchanged.
pub async fn update_person(
    pool: &SqlitePool,
    viewer: &Viewer,
    id: i64,
    mut input: PersonInput,
) -> Result<()> {
    let existing = get_person_record(pool, viewer, id).await?;
    let redacted = !can_view_contact_fields(existing.privacy_level, existing.created_by, viewer);

    input.normalize();
    if redacted {
        if input.has_contact_fields() {
            return Err(Error::Forbidden(
                "Contact fields of this source are read-only for you".to_string(),
            ));
        }
        if input.privacy_level.is_some_and(|l| l != existing.privacy_level) {
            return Err(Error::Forbidden(
                "Privacy level of this source is read-only for you".to_string(),
            ));
        }
        input.privacy_level = Some(existing.privacy_level);
    }
    input.validate(!redacted)?;

    if redacted {
        input.email_address = existing.email_address.clone();
        input.phone_number_primary = existing.phone_number_primary.clone();
        input.phone_number_secondary = existing.phone_number_secondary.clone();
    }

    let level = input.privacy_level.unwrap_or(existing.privacy_level);

    let mut tx = pool.begin().await?;
    ensure_relations_exist(&mut tx, &input).await?;

    sqlx::query(
        r#"
        UPDATE people SET
            updated = ?, privacy_level = ?, name = ?, email_address = ?, prefix = ?,
            pronouns = ?, title = ?, type_of_expert = ?, website = ?, linkedin = ?,
            twitter = ?, skype = ?, phone_number_primary = ?, phone_number_secondary = ?,
            city = ?, state = ?, country = ?, timezone = ?, language = ?, gatekeeper = ?,
            import_notes = ?
        WHERE id = ?
        "#,
    )
    .bind(time::now())
    .bind(level.as_str())
    .bind(input.name.as_deref().unwrap_or_default())
    .bind(input.email_address.as_deref().unwrap_or_default())
    .bind(&input.prefix)
    .bind(&input.pronouns)
    .bind(&input.title)
    .bind(&input.type_of_expert)
    .bind(&input.website)
    .bind(&input.linkedin)
    .bind(&input.twitter)
    .bind(&input.skype)
    .bind(&input.phone_number_primary)
    .bind(&input.phone_number_secondary)
    .bind(&input.city)
    .bind(&input.state)
    .bind(&input.country)
    .bind(&input.timezone)
    .bind(&input.language)
    .bind(input.gatekeeper)
    .bind(&input.import_notes)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    write_relations(&mut tx, id, &input).await?;
    tx.commit().await?;

    info!("User '{}' updated person {}", viewer.username, id);
    Ok(())
}

/// Delete a person. Only the creator may do so.
pub async fn delete_person(pool: &SqlitePool, viewer: &Viewer, id: i64) -> Result<()> {
    let existing = get_person_record(pool, viewer, id).await?;
    if !is_owner(existing.created_by, viewer) {
        return Err(Error::Forbidden(
            "Only the creator of a source may delete it".to_string(),
        ));
    }

    sqlx::query("DELETE FROM people WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    info!("User '{}' deleted person {}", viewer.username, id);
    Ok(())
}

/// Distinct tag names attached to people `viewer` may see
pub async fn filter_options(pool: &SqlitePool, viewer: &Viewer) -> Result<FilterOptions> {
    let mut names = Vec::with_capacity(Taxonomy::ALL.len());
    for taxonomy in [Taxonomy::Industry, Taxonomy::Expertise, Taxonomy::Organization] {
        let sql = format!(
            r#"
            SELECT DISTINCT t.name
            FROM {table} t
            JOIN {join} j ON j.{column} = t.id
            JOIN people p ON p.id = j.person_id
            WHERE {visible}
            ORDER BY t.name
            "#,
            table = taxonomy.table(),
            join = taxonomy.join_table(),
            column = taxonomy.join_column(),
            visible = privacy::visibility_clause("p")
        );
        let values: Vec<String> = sqlx::query_scalar(&sql)
            .bind(viewer.user_id)
            .fetch_all(pool)
            .await?;
        names.push(values);
    }

    let organizations = names.pop().unwrap_or_default();
    let expertise = names.pop().unwrap_or_default();
    let industries = names.pop().unwrap_or_default();
    Ok(FilterOptions {
        industries,
        expertise,
        organizations,
        privacy_levels: PrivacyLevel::ALL.to_vec(),
    })
}

/// True when any person already uses `email` (case-insensitive)
pub async fn email_exists(conn: &mut SqliteConnection, email: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM people WHERE email_address = ? COLLATE NOCASE)",
    )
    .bind(email.trim())
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}
