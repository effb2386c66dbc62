//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::privacy::{Fieldset, PrivacyLevel};
use crate::{Error, Result};

/// Allowed values for `Person::prefix`
pub const PREFIX_CHOICES: [&str; 6] = ["Dr.", "Miss", "Mr.", "Mrs.", "Ms.", "Mx."];

/// `entry_method` for rows created through the admin API
pub const ENTRY_METHOD_ADMIN_FORM: &str = "admin-form";
/// `entry_method` for rows created by CSV import
pub const ENTRY_METHOD_IMPORT: &str = "import";
/// Default `entry_type`
pub const ENTRY_TYPE_MANUAL: &str = "manual";
/// `entry_type` for rows created by CSV import
pub const ENTRY_TYPE_AUTOMATED: &str = "automated";

/// Shown instead of an interviewee the viewer may not see
pub const PRIVATE_SOURCE_LABEL: &str = "(private source)";

const PHONE_MAX_LEN: usize = 30;
const TWITTER_MAX_LEN: usize = 140;
const TEXT_MAX_LEN: usize = 255;

/// `(id, name)` pair for related records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}

/// A login-capable user
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

/// A team of users; sources can be made exportable by a dive
#[derive(Debug, Clone, Serialize)]
pub struct Dive {
    pub id: i64,
    pub name: String,
    pub members: Vec<NamedRef>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

// ========================================
// Person
// ========================================

/// A source as stored, before any privacy redaction
#[derive(Debug, Clone, Serialize)]
pub struct PersonRecord {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub privacy_level: PrivacyLevel,
    pub name: String,
    pub email_address: Option<String>,
    pub prefix: Option<String>,
    pub pronouns: Option<String>,
    pub title: Option<String>,
    pub type_of_expert: Option<String>,
    pub website: Option<String>,
    pub linkedin: Option<String>,
    pub twitter: Option<String>,
    pub skype: Option<String>,
    pub phone_number_primary: Option<String>,
    pub phone_number_secondary: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub gatekeeper: bool,
    pub import_notes: Option<String>,
    pub entry_method: Option<String>,
    pub entry_type: Option<String>,
    pub created_by: Option<i64>,
    pub created_by_username: Option<String>,
    #[serde(skip)]
    pub created_by_email: Option<String>,
}

impl PersonRecord {
    /// Blank out email and phone numbers
    pub fn redact_contact_fields(&mut self) {
        self.email_address = None;
        self.phone_number_primary = None;
        self.phone_number_secondary = None;
    }
}

impl fmt::Display for PersonRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Editable person fields as submitted by a client
///
/// Server-managed fields (`created_by`, `entry_method`, `entry_type`) are
/// deliberately absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonInput {
    pub privacy_level: Option<PrivacyLevel>,
    pub name: Option<String>,
    pub email_address: Option<String>,
    pub prefix: Option<String>,
    pub pronouns: Option<String>,
    pub title: Option<String>,
    pub type_of_expert: Option<String>,
    pub website: Option<String>,
    pub linkedin: Option<String>,
    pub twitter: Option<String>,
    pub skype: Option<String>,
    pub phone_number_primary: Option<String>,
    pub phone_number_secondary: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub gatekeeper: bool,
    pub import_notes: Option<String>,
    pub expertise: Vec<i64>,
    pub industries: Vec<i64>,
    pub organizations: Vec<i64>,
    pub exportable_by: Vec<i64>,
}

impl PersonInput {
    /// Trim strings, turn blanks into `None` and strip `@` from twitter
    pub fn normalize(&mut self) {
        for field in [
            &mut self.name,
            &mut self.email_address,
            &mut self.prefix,
            &mut self.pronouns,
            &mut self.title,
            &mut self.type_of_expert,
            &mut self.website,
            &mut self.linkedin,
            &mut self.twitter,
            &mut self.skype,
            &mut self.phone_number_primary,
            &mut self.phone_number_secondary,
            &mut self.city,
            &mut self.state,
            &mut self.country,
            &mut self.timezone,
            &mut self.language,
            &mut self.import_notes,
        ] {
            *field = field
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }

        if let Some(twitter) = self.twitter.take() {
            let handle = twitter.replace('@', "");
            self.twitter = Some(handle).filter(|h| !h.is_empty());
        }

        for ids in [
            &mut self.expertise,
            &mut self.industries,
            &mut self.organizations,
            &mut self.exportable_by,
        ] {
            ids.sort_unstable();
            ids.dedup();
        }
    }

    /// True when any contact field carries a value
    pub fn has_contact_fields(&self) -> bool {
        self.email_address.is_some()
            || self.phone_number_primary.is_some()
            || self.phone_number_secondary.is_some()
    }

    /// Validate a normalized input.
    ///
    /// With `require_contact == false` (a redacted edit) the email address is
    /// not required because the stored value is kept.
    pub fn validate(&self, require_contact: bool) -> Result<()> {
        if self.privacy_level.is_none() {
            return Err(Error::InvalidInput("privacy_level is required".to_string()));
        }
        if self.name.is_none() {
            return Err(Error::InvalidInput("name is required".to_string()));
        }

        match &self.email_address {
            Some(email) => validate_email(email)?,
            None if require_contact => {
                return Err(Error::InvalidInput("email_address is required".to_string()));
            }
            None => {}
        }

        if let Some(prefix) = &self.prefix {
            if !PREFIX_CHOICES.contains(&prefix.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "prefix must be one of {}",
                    PREFIX_CHOICES.join(", ")
                )));
            }
        }

        for (field, value) in [("website", &self.website), ("linkedin", &self.linkedin)] {
            if let Some(value) = value {
                validate_url(field, value)?;
            }
        }

        for (field, value) in [
            ("phone_number_primary", &self.phone_number_primary),
            ("phone_number_secondary", &self.phone_number_secondary),
        ] {
            check_len(field, value, PHONE_MAX_LEN)?;
        }
        check_len("twitter", &self.twitter, TWITTER_MAX_LEN)?;

        for (field, value) in [
            ("name", &self.name),
            ("pronouns", &self.pronouns),
            ("title", &self.title),
            ("type_of_expert", &self.type_of_expert),
            ("skype", &self.skype),
            ("city", &self.city),
            ("state", &self.state),
            ("country", &self.country),
            ("timezone", &self.timezone),
            ("language", &self.language),
        ] {
            check_len(field, value, TEXT_MAX_LEN)?;
        }

        Ok(())
    }
}

fn check_len(field: &str, value: &Option<String>, max: usize) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(Error::InvalidInput(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

/// Loose address check: one `@`, non-empty local part, dotted domain
pub fn validate_email(email: &str) -> Result<()> {
    let invalid = || Error::InvalidInput(format!("Invalid email address: {}", email));

    if email.chars().any(char::is_whitespace) || email.len() > 254 {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(())
}

/// Web links must be absolute http(s) URLs
pub fn validate_url(field: &str, value: &str) -> Result<()> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(Error::InvalidInput(format!(
            "{} must be a full URL including http:// or https://",
            field
        ))),
    }
}

/// Row of the people change list
#[derive(Debug, Clone, Serialize)]
pub struct PersonSummary {
    pub id: i64,
    pub name: String,
    pub updated: DateTime<Utc>,
    pub created_by: Option<String>,
    pub privacy_level: PrivacyLevel,
}

/// A source as shown to one viewer
#[derive(Debug, Clone, Serialize)]
pub struct PersonDetail {
    #[serde(flatten)]
    pub person: PersonRecord,
    pub contact_fields_visible: bool,
    /// Replacement text for hidden fields keyed by display field name
    pub semiprivate_display: BTreeMap<String, String>,
    pub expertise: Vec<NamedRef>,
    pub industries: Vec<NamedRef>,
    pub organizations: Vec<NamedRef>,
    pub exportable_by: Vec<NamedRef>,
    pub interactions: Vec<InlineInteraction>,
}

/// Change-page layout for one viewer and record
#[derive(Debug, Clone, Serialize)]
pub struct FormLayout {
    pub fieldsets: Vec<Fieldset>,
    pub readonly_fields: Vec<String>,
}

/// Filters for the people change list
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersonQuery {
    pub q: Option<String>,
    pub industry: Option<String>,
    pub expertise: Option<String>,
    pub organization: Option<String>,
    pub timezone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub privacy_level: Option<PrivacyLevel>,
}

/// Values offered by the people list filters
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOptions {
    pub industries: Vec<String>,
    pub expertise: Vec<String>,
    pub organizations: Vec<String>,
    pub privacy_levels: Vec<PrivacyLevel>,
}

// ========================================
// Interaction
// ========================================

/// How the contact happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Email,
    #[serde(rename = "inperson")]
    InPerson,
    Telephone,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Email => "email",
            InteractionType::InPerson => "inperson",
            InteractionType::Telephone => "telephone",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InteractionType::Email => "Email",
            InteractionType::InPerson => "In-person",
            InteractionType::Telephone => "Telephone",
        }
    }
}

impl FromStr for InteractionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "email" => Ok(InteractionType::Email),
            "inperson" => Ok(InteractionType::InPerson),
            "telephone" => Ok(InteractionType::Telephone),
            other => Err(Error::InvalidInput(format!(
                "Unknown interaction type '{}' (expected email, inperson or telephone)",
                other
            ))),
        }
    }
}

/// An interaction as stored, before any privacy redaction
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub privacy_level: PrivacyLevel,
    pub created_by: Option<i64>,
    pub created_by_username: Option<String>,
    pub date_time: DateTime<Utc>,
    pub interaction_type: Option<InteractionType>,
    /// `None` when there is no interviewee or it is hidden from the viewer
    pub interviewee_id: Option<i64>,
    /// Interviewee name, `None` when the source is missing or hidden from the viewer
    pub interviewee_name: Option<String>,
    /// The interviewee is another user's private source
    pub interviewee_hidden: bool,
    pub notes: Option<String>,
}

impl InteractionRecord {
    /// `"<interviewee> via <type> (<date> at <time>)"`
    pub fn display(&self) -> String {
        let interviewee = match &self.interviewee_name {
            Some(name) => name.as_str(),
            None if self.interviewee_hidden => PRIVATE_SOURCE_LABEL,
            None => "",
        };
        let via = self
            .interaction_type
            .map(|t| format!("via {}", t.as_str()))
            .unwrap_or_default();
        format!(
            "{} {} ({} at {})",
            interviewee,
            via,
            self.date_time.date_naive(),
            self.date_time.time().format("%H:%M:%S")
        )
    }
}

/// Editable interaction fields as submitted by a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionInput {
    pub privacy_level: Option<PrivacyLevel>,
    pub date_time: Option<DateTime<Utc>>,
    pub interaction_type: Option<InteractionType>,
    pub interviewee_id: Option<i64>,
    pub interviewers: Vec<i64>,
    pub notes: Option<String>,
}

impl InteractionInput {
    pub fn normalize(&mut self) {
        self.interviewers.sort_unstable();
        self.interviewers.dedup();
    }
}

/// Filters for the interactions change list
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InteractionQuery {
    pub interaction_type: Option<InteractionType>,
}

/// Row of the interactions change list
#[derive(Debug, Clone, Serialize)]
pub struct InteractionSummary {
    pub id: i64,
    pub display: String,
    pub interviewee: Option<String>,
    pub interaction_type: Option<InteractionType>,
    pub date_time: DateTime<Utc>,
    pub created_by: Option<String>,
    /// Interviewer usernames joined with ", "
    pub interviewers: String,
    pub privacy_level: PrivacyLevel,
}

/// An interaction as shown to one viewer
#[derive(Debug, Clone, Serialize)]
pub struct InteractionDetail {
    #[serde(flatten)]
    pub interaction: InteractionRecord,
    pub display: String,
    pub interviewers: Vec<NamedRef>,
    pub notes_visible: bool,
    pub notes_semiprivate_display: Option<String>,
    pub fields: Vec<String>,
    pub readonly_fields: Vec<String>,
}

/// Interaction listed on its interviewee's page
#[derive(Debug, Clone, Serialize)]
pub struct InlineInteraction {
    pub id: i64,
    pub privacy_level: PrivacyLevel,
    pub date_time: DateTime<Utc>,
    pub interaction_type: Option<InteractionType>,
    pub interviewers: Vec<NamedRef>,
    pub created_by: Option<String>,
    /// Notes, or the "contact the creator" notice when hidden
    pub notes_view: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn valid_input() -> PersonInput {
        PersonInput {
            privacy_level: Some(PrivacyLevel::Public),
            name: Some("Ada Lovelace".to_string()),
            email_address: Some("ada@example.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_strips_at_sign_and_blanks() {
        let mut input = valid_input();
        input.twitter = Some("@ada".to_string());
        input.city = Some("   ".to_string());
        input.title = Some("  Countess ".to_string());
        input.expertise = vec![3, 1, 3];
        input.normalize();

        assert_eq!(input.twitter.as_deref(), Some("ada"));
        assert_eq!(input.city, None);
        assert_eq!(input.title.as_deref(), Some("Countess"));
        assert_eq!(input.expertise, vec![1, 3]);
    }

    #[test]
    fn test_validate_requires_core_fields() {
        let mut input = valid_input();
        input.name = None;
        assert!(matches!(input.validate(true), Err(Error::InvalidInput(_))));

        let mut input = valid_input();
        input.privacy_level = None;
        assert!(input.validate(true).is_err());

        let mut input = valid_input();
        input.email_address = None;
        assert!(input.validate(true).is_err());
        assert!(input.validate(false).is_ok());
    }

    #[test]
    fn test_validate_prefix_and_urls() {
        let mut input = valid_input();
        input.prefix = Some("Dr.".to_string());
        input.website = Some("https://example.com".to_string());
        assert!(input.validate(true).is_ok());

        input.prefix = Some("Sir".to_string());
        assert!(input.validate(true).is_err());

        let mut input = valid_input();
        input.linkedin = Some("linkedin.com/in/ada".to_string());
        assert!(input.validate(true).is_err());
    }

    #[test]
    fn test_validate_phone_length() {
        let mut input = valid_input();
        input.phone_number_primary = Some("1".repeat(31));
        assert!(input.validate(true).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@localhost").is_err());
        assert!(validate_email("a b@example.com").is_err());
    }

    #[test]
    fn test_interaction_type_wire_names() {
        let json = serde_json::to_string(&InteractionType::InPerson).unwrap();
        assert_eq!(json, "\"inperson\"");
        assert_eq!("telephone".parse::<InteractionType>().unwrap(), InteractionType::Telephone);
        assert!("fax".parse::<InteractionType>().is_err());
    }

    #[test]
    fn test_interaction_display() {
        let record = InteractionRecord {
            id: 1,
            created: Utc::now(),
            updated: Utc::now(),
            privacy_level: PrivacyLevel::Public,
            created_by: None,
            created_by_username: None,
            date_time: Utc.with_ymd_and_hms(2019, 5, 21, 16, 40, 0).unwrap(),
            interaction_type: Some(InteractionType::Telephone),
            interviewee_id: Some(1),
            interviewee_name: Some("Ada Lovelace".to_string()),
            interviewee_hidden: false,
            notes: None,
        };
        assert_eq!(record.display(), "Ada Lovelace via telephone (2019-05-21 at 16:40:00)");

        let hidden = InteractionRecord {
            interviewee_id: None,
            interviewee_name: None,
            interviewee_hidden: true,
            interaction_type: None,
            ..record
        };
        assert!(hidden.display().starts_with("(private source)"));
    }
}
