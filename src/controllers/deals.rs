//! Deal list and deal detail views.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::CrmError;
use crate::pipeline::Stage;
use crate::services::Services;
use crate::types::{Contact, Deal, RecordId};
use crate::util;

use super::{cmp_f64, cmp_text, LoadState, Sort, SortDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealSortField {
    Title,
    Value,
    Stage,
    Probability,
    ExpectedCloseDate,
    CreatedAt,
    UpdatedAt,
}

impl DealSortField {
    fn compare(&self, a: &Deal, b: &Deal) -> Ordering {
        match self {
            DealSortField::Title => cmp_text(&a.title, &b.title),
            DealSortField::Value => cmp_f64(a.value, b.value),
            // Alphabetical, as the table header sorts by the label.
            DealSortField::Stage => a.stage.name().cmp(b.stage.name()),
            DealSortField::Probability => a.probability.cmp(&b.probability),
            DealSortField::ExpectedCloseDate => a.expected_close_date.cmp(&b.expected_close_date),
            DealSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            DealSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        }
    }
}

// =============================================================================
// List
// =============================================================================

pub struct DealList {
    services: Services,
    deals: Vec<Deal>,
    contacts: HashMap<RecordId, Contact>,
    search: String,
    sort: Sort<DealSortField>,
    state: LoadState,
}

impl DealList {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            deals: Vec::new(),
            contacts: HashMap::new(),
            search: String::new(),
            sort: Sort {
                field: DealSortField::UpdatedAt,
                direction: SortDirection::Desc,
            },
            state: LoadState::Loading,
        }
    }

    /// Deals and contacts in parallel; either failure discards both.
    pub async fn load(&mut self) -> Result<(), CrmError> {
        self.state = LoadState::Loading;
        let result = tokio::try_join!(
            self.services.deals.fetch_all(),
            self.services.contacts.fetch_all()
        );

        match result {
            Ok((deals, contacts)) => {
                self.deals = deals;
                self.contacts = contacts.into_iter().map(|c| (c.id, c)).collect();
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load deals: {}", e);
                self.deals.clear();
                self.contacts.clear();
                self.state = LoadState::Failed(format!("Failed to load deals: {}", e));
                Err(CrmError::LoadFailed(e.to_string()))
            }
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn set_search(&mut self, query: &str) {
        self.search = query.to_string();
    }

    pub fn sort_by(&mut self, field: DealSortField) {
        self.sort.toggle(field);
    }

    pub fn sort(&self) -> Sort<DealSortField> {
        self.sort
    }

    pub fn total(&self) -> usize {
        self.deals.len()
    }

    pub fn contact_for(&self, deal: &Deal) -> Option<&Contact> {
        self.contacts.get(&deal.contact_id)
    }

    fn matches(&self, deal: &Deal, needle: &str) -> bool {
        util::contains_ignore_case(&deal.title, needle)
            || util::contains_ignore_case(deal.stage.name(), needle)
            || self
                .contact_for(deal)
                .map(|c| util::contains_ignore_case(&c.name, needle))
                .unwrap_or(false)
    }

    /// Search by title, stage or contact name, then sort.
    pub fn visible(&self) -> Vec<&Deal> {
        let needle = self.search.trim().to_lowercase();
        let mut rows: Vec<&Deal> = self
            .deals
            .iter()
            .filter(|d| needle.is_empty() || self.matches(d, &needle))
            .collect();
        rows.sort_by(|a, b| self.sort.apply(self.sort.field.compare(a, b)));
        rows
    }

    /// Summed value of the rows the current search leaves visible.
    pub fn visible_value(&self) -> f64 {
        self.visible().iter().map(|d| d.value).sum()
    }

    pub fn apply_saved(&mut self, deal: Deal) {
        match self.deals.iter_mut().find(|d| d.id == deal.id) {
            Some(slot) => *slot = deal,
            None => self.deals.insert(0, deal),
        }
    }

    pub async fn delete(&mut self, id: RecordId) -> Result<bool, CrmError> {
        let notifier = self.services.notifier.clone();
        let deleted = self.services.deals.delete(id).await.map_err(|e| {
            notifier.error("Failed to delete deal");
            e
        })?;
        if deleted {
            self.deals.retain(|d| d.id != id);
            notifier.success("Deal deleted successfully");
        } else {
            notifier.error("Failed to delete deal");
        }
        Ok(deleted)
    }
}

// =============================================================================
// Detail
// =============================================================================

pub struct DealDetail {
    services: Services,
    id: RecordId,
    deal: Option<Deal>,
    contact: Option<Contact>,
    updating_stage: bool,
    state: LoadState,
}

impl DealDetail {
    pub fn new(services: Services, id: RecordId) -> Self {
        Self {
            services,
            id,
            deal: None,
            contact: None,
            updating_stage: false,
            state: LoadState::Loading,
        }
    }

    pub fn from_route(services: Services, raw_id: &str) -> Result<Self, CrmError> {
        let id = util::parse_record_id(raw_id)?;
        Ok(Self::new(services, id))
    }

    /// The deal first, then its contact.
    pub async fn load(&mut self) -> Result<(), CrmError> {
        self.state = LoadState::Loading;
        let loaded = match self.services.deals.fetch_by_id(self.id).await {
            Ok(Some(deal)) => {
                let contact = self.services.contacts.fetch_by_id(deal.contact_id).await;
                contact.map(|c| (deal, c))
            }
            Ok(None) => {
                self.deal = None;
                self.contact = None;
                self.state = LoadState::Failed("Deal not found".to_string());
                return Err(CrmError::NotFound {
                    entity: crate::entity::EntityType::Deal,
                    id: self.id,
                });
            }
            Err(e) => Err(e),
        };

        match loaded {
            Ok((deal, contact)) => {
                self.deal = Some(deal);
                self.contact = contact;
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load deal {}: {}", self.id, e);
                self.deal = None;
                self.contact = None;
                self.state = LoadState::Failed(format!("Failed to load deal: {}", e));
                Err(CrmError::LoadFailed(e.to_string()))
            }
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn deal(&self) -> Option<&Deal> {
        self.deal.as_ref()
    }

    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    pub fn is_updating_stage(&self) -> bool {
        self.updating_stage
    }

    pub fn apply_deal(&mut self, deal: Deal) {
        if deal.id == self.id {
            self.deal = Some(deal);
        }
    }

    /// Move the deal to `stage`. Choosing the current stage writes nothing.
    pub async fn change_stage(&mut self, stage: Stage) -> Result<bool, CrmError> {
        let Some(current) = self.deal.as_ref() else {
            return Ok(false);
        };
        if current.stage == stage {
            return Ok(false);
        }

        let notifier = self.services.notifier.clone();
        self.updating_stage = true;
        let result = self.services.deals.update_stage(self.id, stage).await;
        self.updating_stage = false;

        match result {
            Ok(updated) => {
                self.deal = Some(updated);
                notifier.success(&format!("Deal moved to {}", stage));
                Ok(true)
            }
            Err(e) => {
                log::error!("Failed to move deal {} to {}: {}", self.id, stage, e);
                notifier.error("Failed to update deal stage");
                Err(e)
            }
        }
    }

    pub async fn delete(&mut self) -> Result<bool, CrmError> {
        let notifier = self.services.notifier.clone();
        let deleted = self.services.deals.delete(self.id).await.map_err(|e| {
            notifier.error("Failed to delete deal");
            e
        })?;
        if deleted {
            self.deal = None;
            notifier.success("Deal deleted successfully");
        } else {
            notifier.error("Failed to delete deal");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::QueuedNotifier;
    use crate::records::memory::MemoryRecordStore;
    use crate::types::TableNames;
    use serde_json::json;
    use std::sync::Arc;

    fn fixture() -> (Services, Arc<MemoryRecordStore>, QueuedNotifier) {
        let store = Arc::new(MemoryRecordStore::new());
        store.seed(
            "contact_c",
            vec![
                json!({ "Id": 1, "Name": "Ana Ruiz", "email_c": "ana@acme.com", "company_c": "Acme" }),
                json!({ "Id": 2, "Name": "Ben Ode", "email_c": "ben@globex.com", "company_c": "Globex" }),
            ],
        );
        store.seed(
            "deal_c",
            vec![
                json!({ "Id": 1, "title_c": "Renewal", "value_c": 1000, "stage_c": "Negotiation", "probability_c": 85, "contact_id_c": 1, "updated_at_c": "2024-01-01T00:00:00Z" }),
                json!({ "Id": 2, "title_c": "Upsell", "value_c": 5000, "stage_c": "Lead", "probability_c": 30, "contact_id_c": 2, "updated_at_c": "2024-02-01T00:00:00Z" }),
                json!({ "Id": 3, "title_c": "Pilot", "value_c": 250, "stage_c": "Won", "probability_c": 100, "contact_id_c": 2, "updated_at_c": "2024-03-01T00:00:00Z" }),
            ],
        );
        let notifier = QueuedNotifier::new();
        let services = Services::new(store.clone(), Arc::new(notifier.clone()), &TableNames::default());
        (services, store, notifier)
    }

    fn ids(rows: &[&Deal]) -> Vec<RecordId> {
        rows.iter().map(|d| d.id).collect()
    }

    #[tokio::test]
    async fn test_list_search_by_contact_and_stage() {
        let (services, _, _) = fixture();
        let mut list = DealList::new(services);
        list.load().await.unwrap();
        assert_eq!(ids(&list.visible()), vec![3, 2, 1]);

        list.set_search("ben");
        assert_eq!(ids(&list.visible()), vec![3, 2]);

        list.set_search("negot");
        assert_eq!(ids(&list.visible()), vec![1]);
    }

    #[tokio::test]
    async fn test_list_visible_value_follows_search() {
        let (services, _, _) = fixture();
        let mut list = DealList::new(services);
        list.load().await.unwrap();
        assert_eq!(list.visible_value(), 6250.0);

        list.set_search("ben");
        assert_eq!(list.visible_value(), 5250.0);

        list.set_search("nothing matches");
        assert_eq!(list.visible_value(), 0.0);
        assert_eq!(list.total(), 3);
    }

    #[tokio::test]
    async fn test_list_sort_by_value_toggles() {
        let (services, _, _) = fixture();
        let mut list = DealList::new(services);
        list.load().await.unwrap();

        list.sort_by(DealSortField::Value);
        assert_eq!(ids(&list.visible()), vec![3, 1, 2]);
        list.sort_by(DealSortField::Value);
        assert_eq!(ids(&list.visible()), vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_list_load_failure_is_aggregate() {
        let (services, store, _) = fixture();
        store.set_offline(true);
        let mut list = DealList::new(services);
        assert!(matches!(list.load().await, Err(CrmError::LoadFailed(_))));
        assert_eq!(list.total(), 0);
        assert!(list.state().error().is_some());
    }

    #[tokio::test]
    async fn test_detail_change_stage() {
        let (services, store, notifier) = fixture();
        let mut detail = DealDetail::from_route(services, " 1 ").unwrap();
        detail.load().await.unwrap();
        assert_eq!(detail.contact().map(|c| c.id), Some(1));

        assert!(!detail.change_stage(Stage::Negotiation).await.unwrap());
        assert_eq!(store.write_calls(), 0);

        assert!(detail.change_stage(Stage::Won).await.unwrap());
        assert_eq!(detail.deal().map(|d| d.stage), Some(Stage::Won));
        assert!(!detail.is_updating_stage());
        assert_eq!(store.write_calls(), 1);
        assert_eq!(notifier.drain()[0].message, "Deal moved to Won");
    }

    #[tokio::test]
    async fn test_detail_failed_stage_change_clears_flag() {
        let (services, store, notifier) = fixture();
        let mut detail = DealDetail::new(services, 2);
        detail.load().await.unwrap();
        store.set_offline(true);

        assert!(detail.change_stage(Stage::Qualified).await.is_err());
        assert!(!detail.is_updating_stage());
        assert_eq!(detail.deal().map(|d| d.stage), Some(Stage::Lead));
        assert_eq!(notifier.drain()[0].message, "Failed to update deal stage");
    }

    #[tokio::test]
    async fn test_detail_missing_deal_and_delete() {
        let (services, _, _) = fixture();
        let mut missing = DealDetail::new(services.clone(), 9);
        assert!(matches!(missing.load().await, Err(CrmError::NotFound { .. })));

        let mut detail = DealDetail::new(services, 3);
        detail.load().await.unwrap();
        assert!(detail.delete().await.unwrap());
        assert!(detail.deal().is_none());
        assert!(!detail.delete().await.unwrap());
    }
}
