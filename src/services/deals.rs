// Deals service — CRUD plus contact/stage filters and stage transitions.

use std::sync::Arc;

use serde_json::json;

use crate::entity::{deal_create_record, deal_stage_record, deal_update_record, EntityType};
use crate::error::CrmError;
use crate::fields::CONTACT_ID;
use crate::notification::Notifier;
use crate::pipeline::Stage;
use crate::records::RecordStore;
use crate::types::{Deal, DealInput, DealPatch, RecordId};
use crate::util;

use super::entities::{BatchOutcome, EntityService};

#[derive(Clone)]
pub struct DealService {
    inner: EntityService<Deal>,
}

impl DealService {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn Notifier>, table: &str) -> Self {
        Self {
            inner: EntityService::new(store, notifier, table),
        }
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        self.inner.notifier()
    }

    pub async fn get_all(&self) -> Vec<Deal> {
        self.inner.get_all().await
    }

    pub async fn fetch_all(&self) -> Result<Vec<Deal>, CrmError> {
        self.inner.fetch_all().await
    }

    pub async fn get_by_id(&self, id: RecordId) -> Option<Deal> {
        self.inner.get_by_id(id).await
    }

    pub async fn fetch_by_id(&self, id: RecordId) -> Result<Option<Deal>, CrmError> {
        self.inner.fetch_by_id(id).await
    }

    /// Deals linked to one contact, newest first.
    pub async fn get_by_contact_id(&self, contact_id: RecordId) -> Vec<Deal> {
        self.inner.get_where(CONTACT_ID, json!(contact_id)).await
    }

    pub async fn fetch_by_contact_id(&self, contact_id: RecordId) -> Result<Vec<Deal>, CrmError> {
        self.inner.fetch_where(CONTACT_ID, json!(contact_id)).await
    }

    /// Deals currently in `stage`.
    ///
    /// Matches on the decoded stage, so stored labels in any case land in the
    /// same bucket the board puts them in.
    pub async fn get_by_stage(&self, stage: Stage) -> Vec<Deal> {
        match self.inner.fetch_all().await {
            Ok(mut deals) => {
                deals.retain(|d| d.stage == stage);
                deals
            }
            Err(e) => {
                log::error!("Failed to load {} deals: {}", stage, e);
                self.inner.notifier().error("Failed to load deals");
                Vec::new()
            }
        }
    }

    pub async fn create(&self, input: &DealInput) -> Result<Deal, CrmError> {
        let record = deal_create_record(input, &util::now());
        self.inner.create_record(record).await
    }

    pub async fn create_batch(&self, inputs: &[DealInput]) -> Result<BatchOutcome<Deal>, CrmError> {
        let now = util::now();
        let records = inputs
            .iter()
            .map(|input| deal_create_record(input, &now))
            .collect();
        self.inner.create_records(records).await
    }

    pub async fn update(&self, id: RecordId, patch: &DealPatch) -> Result<Deal, CrmError> {
        let record = deal_update_record(id, patch, &util::now());
        self.inner.update_record(id, record).await
    }

    /// Move a deal to `stage`. Only the stage and update stamp are written;
    /// probability is left as stored. A deal already in `stage` comes back
    /// as stored, without a write.
    pub async fn update_stage(&self, id: RecordId, stage: Stage) -> Result<Deal, CrmError> {
        let current = self
            .inner
            .fetch_by_id(id)
            .await?
            .ok_or(CrmError::NotFound { entity: EntityType::Deal, id })?;
        if current.stage == stage {
            log::debug!("Deal {} already in {}", id, stage);
            return Ok(current);
        }

        log::info!("Moving deal {} from {} to {}", id, current.stage, stage);
        let record = deal_stage_record(id, stage, &util::now());
        self.inner.update_record(id, record).await
    }

    pub async fn delete(&self, id: RecordId) -> Result<bool, CrmError> {
        self.inner.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::notification::QueuedNotifier;
    use crate::records::memory::MemoryRecordStore;
    use chrono::NaiveDate;

    fn seeded() -> (DealService, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::new());
        store.seed(
            "deal_c",
            vec![
                json!({ "Id": 1, "title_c": "Renewal", "value_c": 1000, "stage_c": "Lead", "probability_c": 30, "contact_id_c": 7, "updated_at_c": "2024-01-01T00:00:00.000Z" }),
                json!({ "Id": 2, "title_c": "Upsell", "value_c": 5000, "stage_c": "Won", "probability_c": 100, "contact_id_c": { "Id": 7, "Name": "Ana" }, "updated_at_c": "2024-02-01T00:00:00.000Z" }),
                json!({ "Id": 3, "title_c": "Pilot", "value_c": 250, "stage_c": "Lead", "probability_c": 30, "contact_id_c": 8, "updated_at_c": "2024-03-01T00:00:00.000Z" }),
            ],
        );
        let svc = DealService::new(store.clone(), Arc::new(QueuedNotifier::new()), "deal_c");
        (svc, store)
    }

    #[tokio::test]
    async fn test_by_contact_matches_lookup_objects() {
        let (svc, _) = seeded();
        let ids: Vec<RecordId> = svc.get_by_contact_id(7).await.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_by_stage() {
        let (svc, _) = seeded();
        let leads = svc.get_by_stage(Stage::Lead).await;
        assert_eq!(leads.len(), 2);
        assert!(leads.iter().all(|d| d.stage == Stage::Lead));
        assert!(svc.get_by_stage(Stage::Lost).await.is_empty());
    }

    #[tokio::test]
    async fn test_update_stage_leaves_probability() {
        let (svc, store) = seeded();
        let moved = svc.update_stage(1, Stage::Qualified).await.unwrap();
        assert_eq!(moved.stage, Stage::Qualified);
        assert_eq!(moved.probability, 30);
        assert_eq!(moved.title, "Renewal");
        assert_eq!(store.write_calls(), 1);
    }

    #[tokio::test]
    async fn test_update_stage_to_current_stage_writes_nothing() {
        let (svc, store) = seeded();
        let before = svc.get_by_id(1).await.unwrap();

        let same = svc.update_stage(1, Stage::Lead).await.unwrap();
        assert_eq!(store.write_calls(), 0);
        assert_eq!(same, before);
        assert_eq!(svc.get_by_id(1).await.unwrap().updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn test_by_stage_ignores_label_case() {
        let (svc, store) = seeded();
        store.seed(
            "deal_c",
            vec![json!({ "Id": 9, "title_c": "Late", "value_c": 10, "stage_c": "negotiation", "contact_id_c": 8 })],
        );
        let ids: Vec<RecordId> = svc
            .get_by_stage(Stage::Negotiation)
            .await
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn test_created_probability_stays_in_range() {
        let now = util::now();
        for stage in Stage::ALL {
            for probability in [0u8, 1, 50, 99, 100, 101, 200, 255] {
                let input = DealInput {
                    title: "Any".to_string(),
                    value: 1.0,
                    stage,
                    probability,
                    expected_close_date: None,
                    notes: None,
                    contact_id: 1,
                };
                let mut record = deal_create_record(&input, &now);
                record.insert("Id".to_string(), json!(1));
                let deal = Deal::from_record(&serde_json::Value::Object(record)).unwrap();
                assert!(deal.probability <= 100, "{:?} {}", stage, probability);
                assert_eq!(deal.probability, probability.min(100));
                assert_eq!(deal.stage, stage);
            }
        }
    }

    #[tokio::test]
    async fn test_update_stage_missing_deal() {
        let (svc, _) = seeded();
        let err = svc.update_stage(42, Stage::Won).await.unwrap_err();
        assert!(matches!(err, CrmError::NotFound { id: 42, .. }));
    }

    #[tokio::test]
    async fn test_create_coerces_and_stamps() {
        let (svc, _) = seeded();
        let deal = svc
            .create(&DealInput {
                title: "Expansion".to_string(),
                value: 12500.0,
                stage: Stage::Proposal,
                probability: 75,
                expected_close_date: NaiveDate::from_ymd_opt(2024, 12, 1),
                notes: None,
                contact_id: 8,
            })
            .await
            .unwrap();
        assert_eq!(deal.id, 4);
        assert_eq!(deal.value, 12500.0);
        assert_eq!(deal.contact_id, 8);
        assert_eq!(deal.created_at, deal.updated_at);
    }
}
