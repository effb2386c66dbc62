//! Row and field visibility rules for sources and interactions
//!
//! Every Person and Interaction carries a [`PrivacyLevel`]. Whether a row is
//! listed at all, and which of its fields are exposed, depends on that level
//! and on whether the requesting [`Viewer`] created the record:
//!
//! | level                | creator        | other users                       |
//! |----------------------|----------------|-----------------------------------|
//! | `public`             | everything     | everything                        |
//! | `searchable`         | everything     | row visible, contact info hidden  |
//! | `private_individual` | everything     | row hidden                        |
//!
//! There is no superuser bypass. Staff accounts follow the same rules.

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Who may see a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    /// Visible to every user with all fields
    Public,
    /// Semi-private: general information is visible, contact details are not
    Searchable,
    /// Visible only to the user who created the record
    PrivateIndividual,
}

impl PrivacyLevel {
    pub const ALL: [PrivacyLevel; 3] = [
        PrivacyLevel::Public,
        PrivacyLevel::Searchable,
        PrivacyLevel::PrivateIndividual,
    ];

    /// Value stored in the database and used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::Public => "public",
            PrivacyLevel::Searchable => "searchable",
            PrivacyLevel::PrivateIndividual => "private_individual",
        }
    }

    /// Human-readable label for forms
    pub fn label(&self) -> &'static str {
        match self {
            PrivacyLevel::Public => "Public",
            PrivacyLevel::Searchable => "Searchable (semi-private)",
            PrivacyLevel::PrivateIndividual => "Private (only me)",
        }
    }
}

impl fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "public" => Ok(PrivacyLevel::Public),
            "searchable" => Ok(PrivacyLevel::Searchable),
            "private_individual" => Ok(PrivacyLevel::PrivateIndividual),
            other => Err(Error::InvalidInput(format!(
                "Unknown privacy level '{}' (expected public, searchable or private_individual)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for PrivacyLevel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The authenticated user a query runs on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: i64,
    pub username: String,
}

impl Viewer {
    pub fn new(user_id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

/// True when `viewer` created the record
pub fn is_owner(created_by: Option<i64>, viewer: &Viewer) -> bool {
    created_by == Some(viewer.user_id)
}

/// Row-level rule: private rows are visible to their creator only
pub fn is_row_visible(level: PrivacyLevel, created_by: Option<i64>, viewer: &Viewer) -> bool {
    level != PrivacyLevel::PrivateIndividual || is_owner(created_by, viewer)
}

/// Field-level rule for contact details (email, phone numbers) and
/// interaction notes
pub fn can_view_contact_fields(
    level: PrivacyLevel,
    created_by: Option<i64>,
    viewer: &Viewer,
) -> bool {
    is_owner(created_by, viewer) || level == PrivacyLevel::Public
}

/// SQL form of [`is_row_visible`] for a table aliased as `alias`.
///
/// The returned fragment contains exactly one `?` placeholder which must be
/// bound to the viewer's user id.
pub fn visibility_clause(alias: &str) -> String {
    format!(
        "({alias}.privacy_level != 'private_individual' OR {alias}.created_by = ?)",
        alias = alias
    )
}

/// SQL form of [`can_view_contact_fields`]; one `?` bound to the viewer id
pub fn contact_visibility_clause(alias: &str) -> String {
    format!(
        "({alias}.privacy_level = 'public' OR {alias}.created_by = ?)",
        alias = alias
    )
}

/// Append the [`visibility_clause`] predicate to a dynamic query
pub fn push_visibility_filter(builder: &mut QueryBuilder<'_, Sqlite>, alias: &str, viewer: &Viewer) {
    builder.push(format!(
        "({alias}.privacy_level != 'private_individual' OR {alias}.created_by = ",
        alias = alias
    ));
    builder.push_bind(viewer.user_id);
    builder.push(")");
}

/// Append the [`contact_visibility_clause`] predicate to a dynamic query
pub fn push_contact_visibility_filter(
    builder: &mut QueryBuilder<'_, Sqlite>,
    alias: &str,
    viewer: &Viewer,
) {
    builder.push(format!(
        "({alias}.privacy_level = 'public' OR {alias}.created_by = ",
        alias = alias
    ));
    builder.push_bind(viewer.user_id);
    builder.push(")");
}

/// Text shown in place of a hidden field
pub fn redaction_notice(creator: Option<&str>) -> String {
    format!(
        "Please contact {} for this information",
        creator.unwrap_or("the creator")
    )
}

/// Text shown in place of hidden interaction notes on a source page
pub fn inline_notes_notice(creator: Option<&str>) -> String {
    format!(
        "Contact {} for these notes. View the interaction page for details.",
        creator.unwrap_or("the creator")
    )
}

/// Person fields hidden from non-owners of searchable records
pub const PERSON_CONTACT_FIELDS: [&str; 3] = [
    "email_address",
    "phone_number_primary",
    "phone_number_secondary",
];

/// Suffix of the read-only display fields that replace hidden values
pub const SEMIPRIVATE_DISPLAY_SUFFIX: &str = "_semiprivate_display";

/// A named group of form fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fieldset {
    pub name: &'static str,
    pub fields: Vec<String>,
    pub collapsed: bool,
}

impl Fieldset {
    fn new(name: &'static str, fields: &[&str]) -> Self {
        Self {
            name,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            collapsed: false,
        }
    }

    fn collapsed(mut self) -> Self {
        self.collapsed = true;
        self
    }
}

/// Form layout for a person's change page.
///
/// When `redacted`, each contact field is swapped for its read-only
/// `*_semiprivate_display` counterpart.
pub fn person_fieldsets(redacted: bool) -> Vec<Fieldset> {
    let contact: Vec<String> = PERSON_CONTACT_FIELDS
        .iter()
        .map(|field| {
            if redacted {
                format!("{}{}", field, SEMIPRIVATE_DISPLAY_SUFFIX)
            } else {
                field.to_string()
            }
        })
        .chain(["linkedin", "twitter", "skype"].iter().map(|f| f.to_string()))
        .collect();

    vec![
        Fieldset::new("Privacy", &["privacy_level"]),
        Fieldset::new(
            "General info",
            &[
                "prefix",
                "pronouns",
                "name",
                "title",
                "industries",
                "organizations",
                "website",
                "type_of_expert",
                "expertise",
            ],
        ),
        Fieldset {
            name: "Contact info",
            fields: contact,
            collapsed: false,
        },
        Fieldset::new("Location info", &["timezone", "city", "state", "country"]),
        Fieldset::new("Advanced info", &["entry_method", "entry_type", "created_by"]).collapsed(),
    ]
}

/// Fields the viewer may not edit on a person's change page
pub fn person_readonly_fields(redacted: bool) -> Vec<String> {
    let mut fields: Vec<String> = ["created_by", "entry_method", "entry_type"]
        .iter()
        .map(|f| f.to_string())
        .collect();
    if redacted {
        fields.push("privacy_level".to_string());
        fields.extend(
            PERSON_CONTACT_FIELDS
                .iter()
                .map(|f| format!("{}{}", f, SEMIPRIVATE_DISPLAY_SUFFIX)),
        );
    }
    fields
}

/// Form fields for an interaction's change page
pub fn interaction_fields(redacted: bool) -> Vec<String> {
    let notes = if redacted {
        "notes_semiprivate_display"
    } else {
        "notes"
    };
    [
        "privacy_level",
        "date_time",
        "interaction_type",
        "interviewee",
        "interviewers",
        notes,
        "created_by",
    ]
    .iter()
    .map(|f| f.to_string())
    .collect()
}

/// Fields the viewer may not edit on an interaction's change page
pub fn interaction_readonly_fields(redacted: bool) -> Vec<String> {
    let fields: &[&str] = if redacted {
        &["created_by", "privacy_level", "notes_semiprivate_display"]
    } else {
        &["created_by"]
    };
    fields.iter().map(|f| f.to_string()).collect()
}
