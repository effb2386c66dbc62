//! CSV export and import of sources
//!
//! Exports are written in the layout that [`import_sources`] reads back.
//! A second, shorter "sheet" layout is accepted for spreadsheets assembled
//! by hand.

mod export;
mod import;

pub use export::export_sources;
pub use import::{import_sources, ImportLayout, ImportSummary, RowOutcome, RowReport};

/// Column order of exported files
pub const EXPORT_COLUMNS: [&str; 30] = [
    "id",
    "created",
    "updated",
    "privacy_level",
    "name",
    "prefix",
    "pronouns",
    "title",
    "type_of_expert",
    "email_address",
    "phone_number_primary",
    "phone_number_secondary",
    "linkedin",
    "twitter",
    "skype",
    "website",
    "city",
    "state",
    "country",
    "timezone",
    "language",
    "gatekeeper",
    "import_notes",
    "entry_method",
    "entry_type",
    "created_by",
    "expertise",
    "industries",
    "organization",
    "owned_by",
];

/// Columns of the hand-assembled sheet layout
pub const SHEET_COLUMNS: [&str; 18] = [
    "privacy_level",
    "name",
    "type_of_expert",
    "title",
    "city",
    "state",
    "country",
    "phone_number_primary",
    "phone_number_secondary",
    "twitter",
    "prefix",
    "email_address",
    "timezone",
    "created_by",
    "expertise",
    "industries",
    "organization",
    "owned_by",
];

/// Separator for multi-valued cells
pub(crate) const LIST_SEPARATOR: &str = ", ";

/// Split a multi-valued cell into trimmed, non-empty names
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
