//! Boundary to the hosted record-storage API.
//!
//! The store is table oriented: every entity type lives in its own table and
//! every call answers with a `success` flag. Writes are batched and report a
//! result per record, so a batch can partially succeed.
//!
//! Two implementations ship with the crate: [`client::HttpRecordStore`] talks
//! to the hosted API, [`memory::MemoryRecordStore`] keeps tables in process.

pub mod client;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CrmError;
use crate::types::RecordId;

/// One raw record as the store sees it (suffixed field names).
pub type Record = Map<String, Value>;

/// Per-record `code` the store uses when an id does not exist.
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";

// ---------------------------------------------------------------------------
// Query model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    EqualTo,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field_name: String,
    pub operator: Operator,
    pub values: Vec<Value>,
}

impl Condition {
    pub fn equal_to(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field_name: field.to_string(),
            operator: Operator::EqualTo,
            values: vec![value.into()],
        }
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self {
            field_name: field.to_string(),
            operator: Operator::Contains,
            values: vec![Value::String(value.to_string())],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOperator {
    And,
    Or,
}

/// Conditions inside one sub group are ANDed; sub groups are combined with
/// the group operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionGroup {
    pub operator: GroupOperator,
    pub sub_groups: Vec<Vec<Condition>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortType {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub field_name: String,
    pub sort_type: SortType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub limit: usize,
    pub offset: usize,
}

/// Projection, filters, ordering and paging for a read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    pub where_: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub where_groups: Vec<ConditionGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging_info: Option<Paging>,
}

impl Query {
    /// A query projecting the given fields.
    pub fn select(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.where_.push(condition);
        self
    }

    /// Match records satisfying at least one of the conditions.
    pub fn any_of(mut self, conditions: Vec<Condition>) -> Self {
        self.where_groups.push(ConditionGroup {
            operator: GroupOperator::Or,
            sub_groups: conditions.into_iter().map(|c| vec![c]).collect(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, sort_type: SortType) -> Self {
        self.order_by.push(OrderBy {
            field_name: field.to_string(),
            sort_type,
        });
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.paging_info = Some(Paging { limit, offset });
        self
    }
}

// ---------------------------------------------------------------------------
// Response model
// ---------------------------------------------------------------------------

/// Answer to a read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ReadResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// A field-level validation message attached to a rejected record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field_label: String,
    pub message: String,
}

/// Outcome for one record inside a write batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl RecordResult {
    pub fn saved(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn rejected(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            errors,
            ..Default::default()
        }
    }

    pub fn not_found(id: RecordId) -> Self {
        Self {
            success: false,
            message: Some(format!("Record {} does not exist", id)),
            code: Some(CODE_NOT_FOUND.to_string()),
            ..Default::default()
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code.as_deref() == Some(CODE_NOT_FOUND)
    }
}

/// Answer to a create/update/delete batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub results: Vec<RecordResult>,
}

/// A record the store refused, with whatever explanation it gave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub message: Option<String>,
    pub field_errors: Vec<FieldError>,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or("record rejected"))?;
        for err in &self.field_errors {
            write!(f, " [{}: {}]", err.field_label, err.message)?;
        }
        Ok(())
    }
}

impl From<&RecordResult> for RecordFailure {
    fn from(result: &RecordResult) -> Self {
        RecordFailure {
            message: result.message.clone(),
            field_errors: result.errors.clone(),
        }
    }
}

impl WriteResponse {
    /// Split the batch into saved payloads and per-record failures.
    ///
    /// A response with `success == false` and no per-record results counts as
    /// one failure carrying the top-level message.
    pub fn split(self) -> (Vec<Value>, Vec<RecordFailure>) {
        if !self.success && self.results.is_empty() {
            return (
                Vec::new(),
                vec![RecordFailure {
                    message: self.message,
                    field_errors: Vec::new(),
                }],
            );
        }

        let mut saved = Vec::new();
        let mut failures = Vec::new();
        for result in &self.results {
            if result.success {
                saved.push(result.data.clone().unwrap_or(Value::Null));
            } else {
                failures.push(RecordFailure::from(result));
            }
        }
        (saved, failures)
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Table-oriented CRUD against the record store.
///
/// An `Err` means no answer was obtained (network, timeout, undecodable body).
/// Refusals the store reports come back as `Ok` with `success == false`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_records(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<ReadResponse<Vec<Value>>, CrmError>;

    async fn get_record_by_id(
        &self,
        table: &str,
        id: RecordId,
        query: &Query,
    ) -> Result<ReadResponse<Value>, CrmError>;

    async fn create_records(
        &self,
        table: &str,
        records: Vec<Record>,
    ) -> Result<WriteResponse, CrmError>;

    async fn update_records(
        &self,
        table: &str,
        records: Vec<Record>,
    ) -> Result<WriteResponse, CrmError>;

    async fn delete_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> Result<WriteResponse, CrmError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_serializes_where_groups() {
        let query = Query::select(&["Name", "email_c"])
            .any_of(vec![
                Condition::contains("Name", "acme"),
                Condition::contains("company_c", "acme"),
            ])
            .order_by("updated_at_c", SortType::Desc);

        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["fields"], json!(["Name", "email_c"]));
        assert_eq!(value["whereGroups"][0]["operator"], "OR");
        assert_eq!(value["whereGroups"][0]["subGroups"].as_array().unwrap().len(), 2);
        assert_eq!(value["orderBy"][0]["sortType"], "DESC");
        assert!(value.get("where").is_none());
    }

    #[test]
    fn test_split_partial_batch() {
        let response: WriteResponse = serde_json::from_value(json!({
            "success": true,
            "results": [
                { "success": true, "data": { "Id": 4 } },
                { "success": false, "message": "Invalid",
                  "errors": [{ "fieldLabel": "email_c", "message": "required" }] }
            ]
        }))
        .unwrap();

        let (saved, failures) = response.split();
        assert_eq!(saved, vec![json!({ "Id": 4 })]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field_errors[0].field_label, "email_c");
        assert_eq!(failures[0].to_string(), "Invalid [email_c: required]");
    }

    #[test]
    fn test_split_top_level_failure_without_results() {
        let response = WriteResponse {
            success: false,
            message: Some("Table is read-only".to_string()),
            results: Vec::new(),
        };
        let (saved, failures) = response.split();
        assert!(saved.is_empty());
        assert_eq!(failures[0].message.as_deref(), Some("Table is read-only"));
    }
}
