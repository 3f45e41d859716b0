//! Entity kinds and the mapping between store records and domain structs.
//!
//! Each entity has exactly one reader (`from_record`) and one writer per
//! input shape. Nothing outside this module looks at suffixed field names.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::CrmError;
use crate::fields::{self, *};
use crate::pipeline::Stage;
use crate::records::Record;
use crate::types::{
    Activity, ActivityInput, ActivityType, Contact, ContactInput, ContactPatch, Deal, DealInput,
    DealPatch, RecordId, TableNames,
};

/// The kind of entity a service manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Contact,
    Deal,
    Activity,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Contact => "contact",
            EntityType::Deal => "deal",
            EntityType::Activity => "activity",
        }
    }

    /// Plural label used in user-facing messages.
    pub fn plural(&self) -> &'static str {
        match self {
            EntityType::Contact => "contacts",
            EntityType::Deal => "deals",
            EntityType::Activity => "activities",
        }
    }

    /// Capitalized label for notifications ("Deal created successfully!").
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Contact => "Contact",
            EntityType::Deal => "Deal",
            EntityType::Activity => "Activity",
        }
    }

    pub fn table<'a>(&self, tables: &'a TableNames) -> &'a str {
        match self {
            EntityType::Contact => &tables.contacts,
            EntityType::Deal => &tables.deals,
            EntityType::Activity => &tables.activities,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain struct backed by one store table.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityType;

    /// Store fields to project on reads.
    const FIELDS: &'static [&'static str];

    /// Store field reads are ordered by (descending).
    const SORT_FIELD: &'static str;

    /// Translate a raw store record into the domain struct.
    fn from_record(record: &Value) -> Result<Self, CrmError>;

    fn id(&self) -> RecordId;

    /// Recency key; collections are listed newest first.
    fn sort_key(&self) -> DateTime<Utc>;
}

fn stamp(now: &DateTime<Utc>) -> Value {
    Value::String(crate::util::iso_timestamp(now))
}

fn to_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

// =============================================================================
// Contact
// =============================================================================

impl Entity for Contact {
    const KIND: EntityType = EntityType::Contact;
    const FIELDS: &'static [&'static str] =
        &[NAME, EMAIL, COMPANY, PHONE, NOTES, CREATED_AT, UPDATED_AT];
    const SORT_FIELD: &'static str = UPDATED_AT;

    fn from_record(record: &Value) -> Result<Self, CrmError> {
        Ok(Contact {
            id: fields::required_id(record, &[ID, "id"])?,
            name: fields::text(record, &[NAME, "name"]),
            company: fields::text(record, &[COMPANY, "company"]),
            email: fields::text(record, &[EMAIL, "email"]),
            phone: fields::text(record, &[PHONE, "phone"]),
            notes: fields::optional_text(record, &[NOTES, "notes"]),
            created_at: fields::timestamp(record, &[CREATED_AT, "createdAt", "CreatedOn"]),
            updated_at: fields::timestamp(record, &[UPDATED_AT, "updatedAt", "ModifiedOn"]),
        })
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

pub fn contact_create_record(input: &ContactInput, now: &DateTime<Utc>) -> Record {
    to_record(json!({
        NAME: input.name.trim(),
        EMAIL: input.email.trim(),
        COMPANY: input.company.trim(),
        PHONE: input.phone.trim(),
        NOTES: input.notes.clone().unwrap_or_default(),
        CREATED_AT: stamp(now),
        UPDATED_AT: stamp(now),
    }))
}

pub fn contact_update_record(id: RecordId, patch: &ContactPatch, now: &DateTime<Utc>) -> Record {
    let mut record = Record::new();
    record.insert(ID.to_string(), json!(id));
    if let Some(ref name) = patch.name {
        record.insert(NAME.to_string(), json!(name.trim()));
    }
    if let Some(ref email) = patch.email {
        record.insert(EMAIL.to_string(), json!(email.trim()));
    }
    if let Some(ref company) = patch.company {
        record.insert(COMPANY.to_string(), json!(company.trim()));
    }
    if let Some(ref phone) = patch.phone {
        record.insert(PHONE.to_string(), json!(phone.trim()));
    }
    if let Some(ref notes) = patch.notes {
        record.insert(NOTES.to_string(), json!(notes));
    }
    record.insert(UPDATED_AT.to_string(), stamp(now));
    record
}

// =============================================================================
// Deal
// =============================================================================

impl Entity for Deal {
    const KIND: EntityType = EntityType::Deal;
    const FIELDS: &'static [&'static str] = &[
        NAME,
        TITLE,
        VALUE,
        STAGE,
        PROBABILITY,
        EXPECTED_CLOSE_DATE,
        NOTES,
        CONTACT_ID,
        CREATED_AT,
        UPDATED_AT,
    ];
    const SORT_FIELD: &'static str = UPDATED_AT;

    fn from_record(record: &Value) -> Result<Self, CrmError> {
        let stage = fields::optional_text(record, &[STAGE, "stage"])
            .and_then(|s| s.parse::<Stage>().ok())
            .unwrap_or(Stage::Lead);
        let probability = fields::number(record, &[PROBABILITY, "probability"])
            .round()
            .clamp(0.0, 100.0) as u8;

        Ok(Deal {
            id: fields::required_id(record, &[ID, "id"])?,
            title: fields::text(record, &[TITLE, NAME, "title"]),
            value: fields::number(record, &[VALUE, "value"]),
            stage,
            probability,
            expected_close_date: fields::date(record, &[EXPECTED_CLOSE_DATE, "expectedCloseDate"]),
            notes: fields::optional_text(record, &[NOTES, "notes"]),
            contact_id: fields::record_id(record, &[CONTACT_ID, "contactId"]).unwrap_or_default(),
            created_at: fields::timestamp(record, &[CREATED_AT, "createdAt", "CreatedOn"]),
            updated_at: fields::timestamp(record, &[UPDATED_AT, "updatedAt", "ModifiedOn"]),
        })
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

pub fn deal_create_record(input: &DealInput, now: &DateTime<Utc>) -> Record {
    to_record(json!({
        NAME: input.title.trim(),
        TITLE: input.title.trim(),
        VALUE: input.value,
        STAGE: input.stage.name(),
        PROBABILITY: input.probability.min(100),
        EXPECTED_CLOSE_DATE: input.expected_close_date.map(|d| d.format("%Y-%m-%d").to_string()),
        NOTES: input.notes.clone().unwrap_or_default(),
        CONTACT_ID: input.contact_id,
        CREATED_AT: stamp(now),
        UPDATED_AT: stamp(now),
    }))
}

pub fn deal_update_record(id: RecordId, patch: &DealPatch, now: &DateTime<Utc>) -> Record {
    let mut record = Record::new();
    record.insert(ID.to_string(), json!(id));
    if let Some(ref title) = patch.title {
        record.insert(NAME.to_string(), json!(title.trim()));
        record.insert(TITLE.to_string(), json!(title.trim()));
    }
    if let Some(value) = patch.value {
        record.insert(VALUE.to_string(), json!(value));
    }
    if let Some(stage) = patch.stage {
        record.insert(STAGE.to_string(), json!(stage.name()));
    }
    if let Some(probability) = patch.probability {
        record.insert(PROBABILITY.to_string(), json!(probability.min(100)));
    }
    if let Some(date) = patch.expected_close_date {
        record.insert(
            EXPECTED_CLOSE_DATE.to_string(),
            json!(date.format("%Y-%m-%d").to_string()),
        );
    }
    if let Some(ref notes) = patch.notes {
        record.insert(NOTES.to_string(), json!(notes));
    }
    if let Some(contact_id) = patch.contact_id {
        record.insert(CONTACT_ID.to_string(), json!(contact_id));
    }
    record.insert(UPDATED_AT.to_string(), stamp(now));
    record
}

/// Stage transitions touch nothing but the stage and the update stamp.
pub fn deal_stage_record(id: RecordId, stage: Stage, now: &DateTime<Utc>) -> Record {
    to_record(json!({
        ID: id,
        STAGE: stage.name(),
        UPDATED_AT: stamp(now),
    }))
}

// =============================================================================
// Activity
// =============================================================================

impl Entity for Activity {
    const KIND: EntityType = EntityType::Activity;
    const FIELDS: &'static [&'static str] = &[TYPE, DESCRIPTION, TIMESTAMP, CONTACT_ID];
    const SORT_FIELD: &'static str = TIMESTAMP;

    fn from_record(record: &Value) -> Result<Self, CrmError> {
        Ok(Activity {
            id: fields::required_id(record, &[ID, "id"])?,
            activity_type: ActivityType::from_str_lossy(&fields::text(record, &[TYPE, "type"])),
            description: fields::text(record, &[DESCRIPTION, "description"]),
            timestamp: fields::timestamp(record, &[TIMESTAMP, "timestamp", "CreatedOn"]),
            contact_id: fields::record_id(record, &[CONTACT_ID, "contactId"]).unwrap_or_default(),
        })
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

pub fn activity_create_record(input: &ActivityInput, now: &DateTime<Utc>) -> Record {
    to_record(json!({
        TYPE: input.activity_type.as_str(),
        DESCRIPTION: input.description.trim(),
        TIMESTAMP: stamp(now),
        CONTACT_ID: input.contact_id,
    }))
}
