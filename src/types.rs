use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::Stage;

/// Numeric identifier the record store assigns to every row.
pub type RecordId = i64;

// =============================================================================
// Configuration
// =============================================================================

/// Main configuration (~/.pipelinecrm/config.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the record-storage API, e.g. `https://records.example.com/v1`
    pub api_base_url: String,
    pub project_id: String,
    /// Bearer key. `PIPELINECRM_API_KEY` takes precedence when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub tables: TableNames,
}

fn default_request_timeout() -> u64 {
    30
}

/// Remote table names per entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableNames {
    #[serde(default = "default_contacts_table")]
    pub contacts: String,
    #[serde(default = "default_deals_table")]
    pub deals: String,
    #[serde(default = "default_activities_table")]
    pub activities: String,
}

fn default_contacts_table() -> String {
    "contact_c".to_string()
}

fn default_deals_table() -> String {
    "deal_c".to_string()
}

fn default_activities_table() -> String {
    "activity_c".to_string()
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            contacts: default_contacts_table(),
            deals: default_deals_table(),
            activities: default_activities_table(),
        }
    }
}

// =============================================================================
// Domain entities
// =============================================================================

/// A person the sales team talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub name: String,
    pub company: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sales opportunity moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub title: String,
    pub value: f64,
    pub stage: Stage,
    /// Win probability in percent, 0..=100.
    pub probability: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_close_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub contact_id: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityType {
    Email,
    Call,
    Meeting,
    Other,
}

impl ActivityType {
    pub const ALL: [ActivityType; 4] = [
        ActivityType::Email,
        ActivityType::Call,
        ActivityType::Meeting,
        ActivityType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Email => "Email",
            ActivityType::Call => "Call",
            ActivityType::Meeting => "Meeting",
            ActivityType::Other => "Other",
        }
    }

    /// Parse a stored label; anything unrecognised is `Other`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => ActivityType::Email,
            "call" => ActivityType::Call,
            "meeting" => ActivityType::Meeting,
            _ => ActivityType::Other,
        }
    }
}

/// A logged touchpoint with a contact. Created once, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "Id")]
    pub id: RecordId,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub contact_id: RecordId,
}

// =============================================================================
// Write inputs
// =============================================================================

/// Validated data for creating a contact.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    pub name: String,
    pub email: String,
    pub company: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial contact update. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl From<ContactInput> for ContactPatch {
    fn from(input: ContactInput) -> Self {
        ContactPatch {
            name: Some(input.name),
            email: Some(input.email),
            company: Some(input.company),
            phone: Some(input.phone),
            notes: Some(input.notes.unwrap_or_default()),
        }
    }
}

/// Validated data for creating a deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealInput {
    pub title: String,
    pub value: f64,
    pub stage: Stage,
    pub probability: u8,
    pub expected_close_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    pub contact_id: RecordId,
}

/// Partial deal update. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealPatch {
    pub title: Option<String>,
    pub value: Option<f64>,
    pub stage: Option<Stage>,
    pub probability: Option<u8>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub contact_id: Option<RecordId>,
}

impl From<DealInput> for DealPatch {
    fn from(input: DealInput) -> Self {
        DealPatch {
            title: Some(input.title),
            value: Some(input.value),
            stage: Some(input.stage),
            probability: Some(input.probability),
            expected_close_date: input.expected_close_date,
            notes: Some(input.notes.unwrap_or_default()),
            contact_id: Some(input.contact_id),
        }
    }
}

/// Data for logging an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInput {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub description: String,
    pub contact_id: RecordId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "apiBaseUrl": "https://records.example.com/v1", "projectId": "crm" }"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.tables, TableNames::default());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_activity_type_lossy_parse() {
        assert_eq!(ActivityType::from_str_lossy("call"), ActivityType::Call);
        assert_eq!(ActivityType::from_str_lossy(" Meeting "), ActivityType::Meeting);
        assert_eq!(ActivityType::from_str_lossy("sms"), ActivityType::Other);
    }

    #[test]
    fn test_deal_input_into_patch_keeps_every_field() {
        let input = DealInput {
            title: "Renewal".to_string(),
            value: 1200.0,
            stage: Stage::Proposal,
            probability: 75,
            expected_close_date: NaiveDate::from_ymd_opt(2024, 9, 30),
            notes: None,
            contact_id: 3,
        };
        let patch = DealPatch::from(input);
        assert_eq!(patch.stage, Some(Stage::Proposal));
        assert_eq!(patch.contact_id, Some(3));
        assert_eq!(patch.notes.as_deref(), Some(""));
    }
}
