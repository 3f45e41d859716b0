//! In-process record store.
//!
//! Keeps each table as a vector of JSON records behind one lock and answers
//! queries the way the hosted store does: projection, `EqualTo`/`Contains`
//! filters (case-insensitive contains), where groups, ordering and paging.
//! Ids are assigned as `max(existing) + 1`.
//!
//! Used for demo mode and as the store behind service and controller tests.
//! Required-field rules and an offline switch let tests exercise rejections
//! and transport failures.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{
    Condition, ConditionGroup, FieldError, GroupOperator, Operator, Query, ReadResponse, Record,
    RecordResult, RecordStore, SortType, WriteResponse,
};
use crate::error::CrmError;
use crate::fields::ID;
use crate::types::RecordId;

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Record>>,
    required: HashMap<String, Vec<String>>,
    offline: bool,
    write_calls: usize,
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert records as-is. Records without an `Id` get the next free one.
    pub fn seed(&self, table: &str, records: Vec<Value>) {
        let mut inner = self.inner.lock();
        let rows = inner.rows.entry(table.to_string()).or_default();
        for record in records {
            if let Value::Object(mut map) = record {
                if record_id_of(&map).is_none() {
                    let next = next_id(rows);
                    map.insert(ID.to_string(), json!(next));
                }
                rows.push(map);
            }
        }
    }

    /// Reject creates/updates that leave any of `fields` empty.
    pub fn require_fields(&self, table: &str, fields: &[&str]) {
        self.inner.lock().required.insert(
            table.to_string(),
            fields.iter().map(|f| f.to_string()).collect(),
        );
    }

    /// While offline every call fails as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Number of create/update/delete calls received so far.
    pub fn write_calls(&self) -> usize {
        self.inner.lock().write_calls
    }

    /// Raw copy of a table.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.inner.lock().rows.get(table).cloned().unwrap_or_default()
    }

    fn check_online(inner: &Tables) -> Result<(), CrmError> {
        if inner.offline {
            Err(CrmError::Network("record store unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

fn record_id_of(record: &Record) -> Option<RecordId> {
    match record.get(ID)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn next_id(rows: &[Record]) -> RecordId {
    rows.iter().filter_map(record_id_of).max().unwrap_or(0) + 1
}

fn missing_required(record: &Record, required: &[String], partial: bool) -> Vec<FieldError> {
    required
        .iter()
        .filter(|field| match record.get(field.as_str()) {
            None => !partial,
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|field| FieldError {
            field_label: field.clone(),
            message: format!("{} is required", field),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Query evaluation
// ---------------------------------------------------------------------------

/// Scalar view of a field; lookup objects compare by their `Id`.
fn scalar(value: &Value) -> &Value {
    match value {
        Value::Object(obj) => obj.get(ID).unwrap_or(value),
        other => other,
    }
}

fn as_text(value: &Value) -> String {
    match scalar(value) {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match scalar(value) {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_eq(field: &Value, wanted: &Value) -> bool {
    match (as_number(field), as_number(wanted)) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => as_text(field) == as_text(wanted),
    }
}

fn matches_condition(record: &Record, condition: &Condition) -> bool {
    let field = record.get(&condition.field_name).unwrap_or(&Value::Null);
    match condition.operator {
        Operator::EqualTo => condition.values.iter().any(|v| loose_eq(field, v)),
        Operator::Contains => {
            let haystack = as_text(field).to_lowercase();
            condition
                .values
                .iter()
                .any(|v| haystack.contains(&as_text(v).to_lowercase()))
        }
    }
}

fn matches_group(record: &Record, group: &ConditionGroup) -> bool {
    let sub_matches = group
        .sub_groups
        .iter()
        .map(|conds| conds.iter().all(|c| matches_condition(record, c)));
    match group.operator {
        GroupOperator::And => sub_matches.into_iter().all(|m| m),
        GroupOperator::Or => sub_matches.into_iter().any(|m| m),
    }
}

fn compare_field(a: &Record, b: &Record, field: &str) -> Ordering {
    let left = a.get(field).unwrap_or(&Value::Null);
    let right = b.get(field).unwrap_or(&Value::Null);
    match (as_number(left), as_number(right)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => as_text(left).cmp(&as_text(right)),
    }
}

fn project(record: &Record, fields: &[String]) -> Value {
    if fields.is_empty() {
        return Value::Object(record.clone());
    }
    let mut out = Record::new();
    if let Some(id) = record.get(ID) {
        out.insert(ID.to_string(), id.clone());
    }
    for field in fields {
        if let Some(value) = record.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    Value::Object(out)
}

fn run_query(rows: &[Record], query: &Query) -> Vec<Value> {
    let mut matched: Vec<&Record> = rows
        .iter()
        .filter(|r| query.where_.iter().all(|c| matches_condition(r, c)))
        .filter(|r| query.where_groups.iter().all(|g| matches_group(r, g)))
        .collect();

    if !query.order_by.is_empty() {
        matched.sort_by(|a, b| {
            query
                .order_by
                .iter()
                .map(|o| {
                    let ord = compare_field(a, b, &o.field_name);
                    match o.sort_type {
                        SortType::Asc => ord,
                        SortType::Desc => ord.reverse(),
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    let (offset, limit) = match query.paging_info {
        Some(p) => (p.offset, p.limit),
        None => (0, usize::MAX),
    };

    matched
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|r| project(r, &query.fields))
        .collect()
}

// ---------------------------------------------------------------------------
// RecordStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_records(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<ReadResponse<Vec<Value>>, CrmError> {
        let inner = self.inner.lock();
        Self::check_online(&inner)?;
        let rows = inner.rows.get(table).map(Vec::as_slice).unwrap_or(&[]);
        Ok(ReadResponse::ok(run_query(rows, query)))
    }

    async fn get_record_by_id(
        &self,
        table: &str,
        id: RecordId,
        query: &Query,
    ) -> Result<ReadResponse<Value>, CrmError> {
        let inner = self.inner.lock();
        Self::check_online(&inner)?;
        let found = inner
            .rows
            .get(table)
            .and_then(|rows| rows.iter().find(|r| record_id_of(r) == Some(id)));
        Ok(match found {
            Some(record) => ReadResponse::ok(project(record, &query.fields)),
            None => ReadResponse::failed(format!("Record {} does not exist", id)),
        })
    }

    async fn create_records(
        &self,
        table: &str,
        records: Vec<Record>,
    ) -> Result<WriteResponse, CrmError> {
        let mut inner = self.inner.lock();
        Self::check_online(&inner)?;
        inner.write_calls += 1;

        let required = inner.required.get(table).cloned().unwrap_or_default();
        let rows = inner.rows.entry(table.to_string()).or_default();
        let mut results = Vec::with_capacity(records.len());
        for mut record in records {
            let missing = missing_required(&record, &required, false);
            if !missing.is_empty() {
                results.push(RecordResult::rejected("Required fields are missing", missing));
                continue;
            }
            let id = next_id(rows);
            record.insert(ID.to_string(), json!(id));
            rows.push(record.clone());
            results.push(RecordResult::saved(Value::Object(record)));
        }

        Ok(WriteResponse {
            success: true,
            message: None,
            results,
        })
    }

    async fn update_records(
        &self,
        table: &str,
        records: Vec<Record>,
    ) -> Result<WriteResponse, CrmError> {
        let mut inner = self.inner.lock();
        Self::check_online(&inner)?;
        inner.write_calls += 1;

        let required = inner.required.get(table).cloned().unwrap_or_default();
        let rows = inner.rows.entry(table.to_string()).or_default();
        let mut results = Vec::with_capacity(records.len());
        for patch in records {
            let Some(id) = record_id_of(&patch) else {
                results.push(RecordResult::rejected(
                    "Update is missing Id",
                    vec![FieldError {
                        field_label: ID.to_string(),
                        message: "Id is required".to_string(),
                    }],
                ));
                continue;
            };
            let Some(existing) = rows.iter_mut().find(|r| record_id_of(r) == Some(id)) else {
                results.push(RecordResult::not_found(id));
                continue;
            };
            let missing = missing_required(&patch, &required, true);
            if !missing.is_empty() {
                results.push(RecordResult::rejected("Required fields are missing", missing));
                continue;
            }
            for (key, value) in patch {
                if key != ID {
                    existing.insert(key, value);
                }
            }
            results.push(RecordResult::saved(Value::Object(existing.clone())));
        }

        Ok(WriteResponse {
            success: true,
            message: None,
            results,
        })
    }

    async fn delete_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> Result<WriteResponse, CrmError> {
        let mut inner = self.inner.lock();
        Self::check_online(&inner)?;
        inner.write_calls += 1;

        let rows = inner.rows.entry(table.to_string()).or_default();
        let results = ids
            .iter()
            .map(|&id| match rows.iter().position(|r| record_id_of(r) == Some(id)) {
                Some(index) => {
                    rows.remove(index);
                    RecordResult::saved(json!({ ID: id }))
                }
                None => RecordResult::not_found(id),
            })
            .collect();

        Ok(WriteResponse {
            success: true,
            message: None,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_contacts() -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        store.seed(
            "contact_c",
            vec![
                json!({ "Id": 1, "Name": "Ana Ruiz", "company_c": "Acme", "updated_at_c": "2024-01-01T00:00:00.000Z" }),
                json!({ "Id": 2, "Name": "Ben Ode", "company_c": "Globex", "updated_at_c": "2024-03-01T00:00:00.000Z" }),
                json!({ "Id": 5, "Name": "Cy Acker", "company_c": "ACME Labs", "updated_at_c": "2024-02-01T00:00:00.000Z" }),
            ],
        );
        store
    }

    #[tokio::test]
    async fn test_fetch_orders_and_projects() {
        let store = store_with_contacts();
        let query = Query::select(&["Name"]).order_by("updated_at_c", SortType::Desc);
        let resp = store.fetch_records("contact_c", &query).await.unwrap();
        let data = resp.data.unwrap();

        let ids: Vec<i64> = data.iter().map(|r| r["Id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 5, 1]);
        assert!(data[0].get("company_c").is_none());
    }

    #[tokio::test]
    async fn test_contains_is_case_insensitive_in_or_group() {
        let store = store_with_contacts();
        let query = Query::default().any_of(vec![
            Condition::contains("Name", "acme"),
            Condition::contains("company_c", "acme"),
        ]);
        let resp = store.fetch_records("contact_c", &query).await.unwrap();
        assert_eq!(resp.data.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_equal_to_matches_numeric_strings_and_lookups() {
        let store = MemoryRecordStore::new();
        store.seed(
            "deal_c",
            vec![
                json!({ "Id": 1, "contact_id_c": { "Id": 3, "Name": "Ana" } }),
                json!({ "Id": 2, "contact_id_c": "3" }),
                json!({ "Id": 3, "contact_id_c": 4 }),
            ],
        );
        let query = Query::default().filter(Condition::equal_to("contact_id_c", 3));
        let resp = store.fetch_records("deal_c", &query).await.unwrap();
        assert_eq!(resp.data.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_assigns_next_id() {
        let store = store_with_contacts();
        let resp = store
            .create_records("contact_c", vec![Record::from_iter([("Name".to_string(), json!("Dee"))])])
            .await
            .unwrap();
        assert_eq!(resp.results[0].data.as_ref().unwrap()["Id"], json!(6));

        let empty = MemoryRecordStore::new();
        let resp = empty
            .create_records("contact_c", vec![Record::new()])
            .await
            .unwrap();
        assert_eq!(resp.results[0].data.as_ref().unwrap()["Id"], json!(1));
    }

    #[tokio::test]
    async fn test_required_fields_reject_per_record() {
        let store = MemoryRecordStore::new();
        store.require_fields("contact_c", &["email_c"]);
        let good = Record::from_iter([("email_c".to_string(), json!("a@x.com"))]);
        let bad = Record::from_iter([("email_c".to_string(), json!(" "))]);

        let resp = store.create_records("contact_c", vec![good, bad]).await.unwrap();
        assert!(resp.results[0].success);
        assert!(!resp.results[1].success);
        assert_eq!(resp.results[1].errors[0].field_label, "email_c");
        assert_eq!(store.rows("contact_c").len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_ids() {
        let store = store_with_contacts();
        let patch = Record::from_iter([("Id".to_string(), json!(99))]);
        let resp = store.update_records("contact_c", vec![patch]).await.unwrap();
        assert!(resp.results[0].is_not_found());

        let resp = store.delete_records("contact_c", &[2, 99]).await.unwrap();
        assert!(resp.results[0].success);
        assert!(resp.results[1].is_not_found());
        assert_eq!(store.rows("contact_c").len(), 2);
        assert_eq!(store.write_calls(), 2);
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let store = store_with_contacts();
        store.set_offline(true);
        let err = store
            .fetch_records("contact_c", &Query::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_paging() {
        let store = store_with_contacts();
        let query = Query::default().order_by("Id", SortType::Asc).page(1, 1);
        let resp = store.fetch_records("contact_c", &query).await.unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["Id"], json!(2));
    }
}
