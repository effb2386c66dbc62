use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, info, warn};

use super::split_list;
use crate::db::models::{validate_email, PersonInput, ENTRY_METHOD_IMPORT, ENTRY_TYPE_AUTOMATED};
use crate::db::people::{self, NewPerson};
use crate::db::taxonomy::{self, Taxonomy};
use crate::db::{dives, users};
use crate::privacy::PrivacyLevel;
use crate::{time, Error, Result};

/// Which of the two accepted layouts a file uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportLayout {
    /// Produced by `export_sources`
    Export,
    /// Hand-assembled spreadsheet
    Sheet,
}

impl ImportLayout {
    /// Files carrying both `id` and `created` columns are exports
    pub fn detect(headers: &csv::StringRecord) -> Self {
        let has = |name: &str| headers.iter().any(|h| h == name);
        if has("id") && has("created") {
            ImportLayout::Export
        } else {
            ImportLayout::Sheet
        }
    }
}

/// Result of importing one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Created { person_id: i64 },
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RowReport {
    /// Line in the file (the header is line 1)
    pub line: usize,
    pub email_address: String,
    #[serde(flatten)]
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub layout: ImportLayout,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub duration_ms: i64,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rows: Vec<RowReport>,
}

/// Header-indexed access to one CSV record
struct Row<'a> {
    index: &'a HashMap<String, usize>,
    record: &'a csv::StringRecord,
}

impl Row<'_> {
    fn get(&self, column: &str) -> &str {
        self.index
            .get(column)
            .and_then(|i| self.record.get(*i))
            .map(str::trim)
            .unwrap_or("")
    }

    fn opt(&self, column: &str) -> Option<String> {
        Some(self.get(column).to_string()).filter(|v| !v.is_empty())
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y" | "t"
    )
}

/// Map a row to person fields. Relations are resolved separately.
fn row_to_input(row: &Row<'_>, layout: ImportLayout) -> Result<PersonInput> {
    let privacy_level: PrivacyLevel = row.get("privacy_level").parse()?;

    let name = row
        .opt("name")
        .ok_or_else(|| Error::InvalidInput("name is empty".to_string()))?;
    let email = row.get("email_address");
    validate_email(email)?;

    let mut input = PersonInput {
        privacy_level: Some(privacy_level),
        name: Some(name),
        email_address: Some(email.to_string()),
        prefix: row.opt("prefix"),
        title: row.opt("title"),
        type_of_expert: row.opt("type_of_expert"),
        twitter: row.opt("twitter"),
        phone_number_primary: row.opt("phone_number_primary"),
        phone_number_secondary: row.opt("phone_number_secondary"),
        city: row.opt("city"),
        state: row.opt("state"),
        country: row.opt("country"),
        timezone: row.opt("timezone"),
        ..Default::default()
    };

    if layout == ImportLayout::Export {
        input.pronouns = row.opt("pronouns");
        input.website = row.opt("website");
        input.linkedin = row.opt("linkedin");
        input.skype = row.opt("skype");
        input.language = row.opt("language");
        input.gatekeeper = parse_bool(row.get("gatekeeper"));
        input.import_notes = row.opt("import_notes");
    }

    input.normalize();
    Ok(input)
}

fn timestamp_or_now(row: &Row<'_>, column: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let value = row.get(column);
    if value.is_empty() {
        return Ok(now);
    }
    time::parse_timestamp(value)
        .ok_or_else(|| Error::InvalidInput(format!("unreadable {} '{}'", column, value)))
}

/// Create the person for one row inside the caller's transaction
async fn import_row(
    conn: &mut SqliteConnection,
    row: &Row<'_>,
    layout: ImportLayout,
    default_creator: Option<i64>,
) -> Result<RowOutcome> {
    let input = row_to_input(row, layout)?;
    let email = input.email_address.clone().unwrap_or_default();

    if people::email_exists(conn, &email).await? {
        return Ok(RowOutcome::Skipped {
            reason: format!("Person with {} already exists", email),
        });
    }

    let now = time::now();
    let (created, updated) = match layout {
        ImportLayout::Export => (
            timestamp_or_now(row, "created", now)?,
            timestamp_or_now(row, "updated", now)?,
        ),
        ImportLayout::Sheet => (now, now),
    };

    let created_by = match row.opt("created_by") {
        Some(creator_email) => Some(users::get_or_create_user_by_email(conn, &creator_email).await?),
        None => default_creator,
    };

    let mut input = input;
    for name in split_list(row.get("expertise")) {
        input
            .expertise
            .push(taxonomy::get_or_create(conn, Taxonomy::Expertise, &name).await?);
    }
    for name in split_list(row.get("industries")) {
        input
            .industries
            .push(taxonomy::get_or_create(conn, Taxonomy::Industry, &name).await?);
    }
    for name in split_list(row.get("organization")) {
        input
            .organizations
            .push(taxonomy::get_or_create(conn, Taxonomy::Organization, &name).await?);
    }
    for name in split_list(row.get("owned_by")) {
        input
            .exportable_by
            .push(dives::get_or_create_dive(conn, &name).await?);
    }

    let person = NewPerson {
        input,
        created_by,
        entry_method: Some(ENTRY_METHOD_IMPORT.to_string()),
        entry_type: Some(ENTRY_TYPE_AUTOMATED.to_string()),
        created,
        updated,
    };
    let person_id = people::insert_person(conn, &person).await?;
    Ok(RowOutcome::Created { person_id })
}

/// Import sources from CSV.
///
/// Each row runs in its own transaction; a failed row is reported and the
/// import carries on. `default_creator` is used for rows with an empty
/// `created_by` column.
pub async fn import_sources<R: Read>(
    pool: &SqlitePool,
    reader: R,
    default_creator: Option<i64>,
) -> Result<ImportSummary> {
    let started = time::now();
    info!("Started import at {}", started);

    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let layout = ImportLayout::detect(&headers);

    let index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_string(), i))
        .collect();
    for required in ["privacy_level", "name", "email_address"] {
        if !index.contains_key(required) {
            return Err(Error::InvalidInput(format!(
                "CSV header is missing the '{}' column",
                required
            )));
        }
    }
    debug!("Import layout: {:?}", layout);

    let mut rows = Vec::new();
    let (mut created, mut skipped, mut failed) = (0, 0, 0);

    for (i, result) in csv_reader.records().enumerate() {
        let fallback_line = i + 2;

        let record = match result {
            Ok(record) => record,
            // An unreadable record fails on its own; a broken reader ends the import
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                failed += 1;
                warn!("Line {}: failed, {}", line, e);
                rows.push(RowReport {
                    line,
                    email_address: String::new(),
                    outcome: RowOutcome::Failed {
                        reason: e.to_string(),
                    },
                });
                continue;
            }
        };
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);
        let row = Row {
            index: &index,
            record: &record,
        };

        let mut tx = pool.begin().await?;
        let outcome = match import_row(&mut tx, &row, layout, default_creator).await {
            Ok(outcome @ RowOutcome::Created { .. }) => {
                tx.commit().await?;
                outcome
            }
            Ok(outcome) => {
                tx.rollback().await?;
                outcome
            }
            Err(e) => {
                tx.rollback().await?;
                RowOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        match &outcome {
            RowOutcome::Created { person_id } => {
                created += 1;
                debug!("Line {}: created person {}", line, person_id);
            }
            RowOutcome::Skipped { reason } => {
                skipped += 1;
                info!("Line {}: skipping, {}", line, reason);
            }
            RowOutcome::Failed { reason } => {
                failed += 1;
                warn!("Line {}: failed, {}", line, reason);
            }
        }

        rows.push(RowReport {
            line,
            email_address: row.get("email_address").to_string(),
            outcome,
        });
    }

    let finished = time::now();
    let duration_ms = (finished - started).num_milliseconds();
    info!(
        "Finished import at {} in {} ms: {} created, {} skipped, {} failed",
        finished, duration_ms, created, skipped, failed
    );

    Ok(ImportSummary {
        layout,
        started,
        finished,
        duration_ms,
        created,
        skipped,
        failed,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_layout_from_header() {
        let export = csv::StringRecord::from(vec!["id", "created", "name"]);
        let sheet = csv::StringRecord::from(vec!["privacy_level", "name", "email_address"]);
        assert_eq!(ImportLayout::detect(&export), ImportLayout::Export);
        assert_eq!(ImportLayout::detect(&sheet), ImportLayout::Sheet);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(!parse_bool(""));
        assert!(!parse_bool("false"));
    }

    #[test]
    fn test_row_to_input_rejects_bad_rows() {
        let index: HashMap<String, usize> = ["privacy_level", "name", "email_address"]
            .iter()
            .enumerate()
            .map(|(i, h)| (h.to_string(), i))
            .collect();

        let good = csv::StringRecord::from(vec!["public", "Ada", "ada@example.com"]);
        let row = Row { index: &index, record: &good };
        assert!(row_to_input(&row, ImportLayout::Sheet).is_ok());

        let bad_level = csv::StringRecord::from(vec!["secret", "Ada", "ada@example.com"]);
        let row = Row { index: &index, record: &bad_level };
        assert!(row_to_input(&row, ImportLayout::Sheet).is_err());

        let bad_email = csv::StringRecord::from(vec!["public", "Ada", "not-an-email"]);
        let row = Row { index: &index, record: &bad_email };
        assert!(row_to_input(&row, ImportLayout::Sheet).is_err());
    }
}
