// Entity service — shared CRUD over one record-store table.
// Contacts, deals and activities wrap this with their typed inputs.

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::entity::Entity;
use crate::error::{CrmError, WriteOp};
use crate::fields;
use crate::notification::Notifier;
use crate::records::{Condition, Query, Record, RecordFailure, RecordStore, SortType};
use crate::types::RecordId;

/// Result of a multi-record write: what was saved and what was refused.
#[derive(Debug, Clone)]
pub struct BatchOutcome<E> {
    pub saved: Vec<E>,
    pub failures: Vec<RecordFailure>,
}

impl<E> BatchOutcome<E> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct EntityService<E: Entity> {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    table: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for EntityService<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            table: self.table.clone(),
            _entity: PhantomData,
        }
    }
}

/// Newest first. Stable, so equal stamps keep store order.
pub fn sort_newest_first<E: Entity>(items: &mut [E]) {
    items.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
}

impl<E: Entity> EntityService<E> {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn Notifier>, table: &str) -> Self {
        Self {
            store,
            notifier,
            table: table.to_string(),
            _entity: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Projection of every mapped field, newest first.
    pub fn base_query(&self) -> Query {
        Query::select(&fields::projection(E::FIELDS)).order_by(E::SORT_FIELD, SortType::Desc)
    }

    fn decode_all(&self, data: Vec<Value>) -> Vec<E> {
        data.iter()
            .filter_map(|record| match E::from_record(record) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    log::warn!("Skipping undecodable {} record: {}", E::KIND, e);
                    None
                }
            })
            .collect()
    }

    /// Turn a read failure into the degraded value and tell the user.
    fn degrade<T: Default>(&self, result: Result<T, CrmError>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                log::error!("Failed to load {} from {}: {}", E::KIND.plural(), self.table, e);
                self.notifier
                    .error(&format!("Failed to load {}", E::KIND.plural()));
                T::default()
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Run a query and decode the result, newest first.
    pub async fn fetch(&self, query: &Query) -> Result<Vec<E>, CrmError> {
        let resp = self.store.fetch_records(&self.table, query).await?;
        if !resp.success {
            return Err(CrmError::Remote(
                resp.message
                    .unwrap_or_else(|| format!("Failed to fetch {}", E::KIND.plural())),
            ));
        }
        let mut items = self.decode_all(resp.data.unwrap_or_default());
        sort_newest_first(&mut items);
        Ok(items)
    }

    /// Every record in the table, newest first. Fails loudly.
    pub async fn fetch_all(&self) -> Result<Vec<E>, CrmError> {
        self.fetch(&self.base_query()).await
    }

    /// Every record in the table, newest first. Never fails: errors are
    /// logged, notified, and produce an empty list.
    pub async fn get_all(&self) -> Vec<E> {
        let result = self.fetch_all().await;
        self.degrade(result)
    }

    /// Records whose `field` equals `value`, newest first.
    pub async fn fetch_where(&self, field: &str, value: Value) -> Result<Vec<E>, CrmError> {
        let query = self.base_query().filter(Condition::equal_to(field, value));
        self.fetch(&query).await
    }

    pub async fn get_where(&self, field: &str, value: Value) -> Vec<E> {
        let result = self.fetch_where(field, value).await;
        self.degrade(result)
    }

    /// One record, or `None` when the store has no such id.
    pub async fn fetch_by_id(&self, id: RecordId) -> Result<Option<E>, CrmError> {
        let query = Query::select(&fields::projection(E::FIELDS));
        let resp = self.store.get_record_by_id(&self.table, id, &query).await?;
        if !resp.success {
            log::debug!(
                "{} {} not found: {}",
                E::KIND,
                id,
                resp.message.as_deref().unwrap_or("no message")
            );
            return Ok(None);
        }
        match resp.data {
            None | Some(Value::Null) => Ok(None),
            Some(record) => E::from_record(&record).map(Some),
        }
    }

    pub async fn get_by_id(&self, id: RecordId) -> Option<E> {
        let result = self.fetch_by_id(id).await;
        self.degrade(result)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Submit several new records in one call.
    pub async fn create_records(&self, records: Vec<Record>) -> Result<BatchOutcome<E>, CrmError> {
        let count = records.len();
        let resp = self.store.create_records(&self.table, records).await?;
        let (saved, failures) = resp.split();

        for failure in &failures {
            log::error!("Failed to create {} record: {}", E::KIND, failure);
        }
        let saved = self.decode_all(saved);
        log::info!(
            "Created {}/{} {} record(s) in {}",
            saved.len(),
            count,
            E::KIND,
            self.table
        );

        Ok(BatchOutcome { saved, failures })
    }

    /// Submit one new record; any refusal is an error.
    pub async fn create_record(&self, record: Record) -> Result<E, CrmError> {
        let outcome = self.create_records(vec![record]).await?;
        if !outcome.failures.is_empty() {
            return Err(CrmError::Rejected {
                operation: WriteOp::Create,
                failures: outcome.failures,
            });
        }
        outcome
            .saved
            .into_iter()
            .next()
            .ok_or_else(|| CrmError::Remote(format!("Store returned no {} record", E::KIND)))
    }

    /// Submit a partial record for `id`. The record must carry `Id`.
    pub async fn update_record(&self, id: RecordId, record: Record) -> Result<E, CrmError> {
        let resp = self.store.update_records(&self.table, vec![record]).await?;

        if resp.results.first().map(|r| r.is_not_found()).unwrap_or(false) {
            log::warn!("Update of missing {} {}", E::KIND, id);
            return Err(CrmError::NotFound { entity: E::KIND, id });
        }

        let (saved, failures) = resp.split();
        if !failures.is_empty() {
            for failure in &failures {
                log::error!("Failed to update {} {}: {}", E::KIND, id, failure);
            }
            return Err(CrmError::Rejected {
                operation: WriteOp::Update,
                failures,
            });
        }

        log::info!("Updated {} {} in {}", E::KIND, id, self.table);
        match saved.first().map(E::from_record) {
            Some(Ok(entity)) => Ok(entity),
            // Store acknowledged without echoing the record; read it back.
            _ => self
                .fetch_by_id(id)
                .await?
                .ok_or(CrmError::NotFound { entity: E::KIND, id }),
        }
    }

    /// Delete by id. `Ok(false)` when the store has no such record or refuses.
    pub async fn delete(&self, id: RecordId) -> Result<bool, CrmError> {
        let resp = self.store.delete_records(&self.table, &[id]).await?;
        let deleted = match resp.results.first() {
            Some(result) => result.success,
            None => resp.success,
        };

        if deleted {
            log::info!("Deleted {} {} from {}", E::KIND, id, self.table);
        } else {
            let reason = resp
                .results
                .first()
                .and_then(|r| r.message.clone())
                .or(resp.message)
                .unwrap_or_else(|| "no reason given".to_string());
            log::warn!("Delete of {} {} failed: {}", E::KIND, id, reason);
        }
        Ok(deleted)
    }
}
