// Activities service — log and list touchpoints. Activities are never edited.

use std::sync::Arc;

use serde_json::json;

use crate::entity::activity_create_record;
use crate::error::CrmError;
use crate::fields::CONTACT_ID;
use crate::notification::Notifier;
use crate::records::RecordStore;
use crate::types::{Activity, ActivityInput, RecordId};
use crate::util;

use super::entities::{BatchOutcome, EntityService};

#[derive(Clone)]
pub struct ActivityService {
    inner: EntityService<Activity>,
}

impl ActivityService {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn Notifier>, table: &str) -> Self {
        Self {
            inner: EntityService::new(store, notifier, table),
        }
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        self.inner.notifier()
    }

    /// All activities, most recent timestamp first.
    pub async fn get_all(&self) -> Vec<Activity> {
        self.inner.get_all().await
    }

    pub async fn fetch_all(&self) -> Result<Vec<Activity>, CrmError> {
        self.inner.fetch_all().await
    }

    pub async fn get_by_id(&self, id: RecordId) -> Option<Activity> {
        self.inner.get_by_id(id).await
    }

    pub async fn get_by_contact_id(&self, contact_id: RecordId) -> Vec<Activity> {
        self.inner.get_where(CONTACT_ID, json!(contact_id)).await
    }

    pub async fn fetch_by_contact_id(
        &self,
        contact_id: RecordId,
    ) -> Result<Vec<Activity>, CrmError> {
        self.inner.fetch_where(CONTACT_ID, json!(contact_id)).await
    }

    /// Log an activity stamped with the current time.
    pub async fn create(&self, input: &ActivityInput) -> Result<Activity, CrmError> {
        let record = activity_create_record(input, &util::now());
        self.inner.create_record(record).await
    }

    pub async fn create_batch(
        &self,
        inputs: &[ActivityInput],
    ) -> Result<BatchOutcome<Activity>, CrmError> {
        let now = util::now();
        let records = inputs
            .iter()
            .map(|input| activity_create_record(input, &now))
            .collect();
        self.inner.create_records(records).await
    }

    pub async fn delete(&self, id: RecordId) -> Result<bool, CrmError> {
        self.inner.delete(id).await
    }
}
