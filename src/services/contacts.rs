// Contacts service — CRUD and search over the contact table.

use std::sync::Arc;

use crate::entity::{contact_create_record, contact_update_record};
use crate::error::CrmError;
use crate::fields::{COMPANY, EMAIL, NAME};
use crate::notification::Notifier;
use crate::records::{Condition, RecordStore};
use crate::types::{Contact, ContactInput, ContactPatch, RecordId};
use crate::util;

use super::entities::{BatchOutcome, EntityService};

#[derive(Clone)]
pub struct ContactService {
    inner: EntityService<Contact>,
}

/// Client-side match used to re-filter search results.
pub fn contact_matches(contact: &Contact, needle_lower: &str) -> bool {
    util::contains_ignore_case(&contact.name, needle_lower)
        || util::contains_ignore_case(&contact.email, needle_lower)
        || util::contains_ignore_case(&contact.company, needle_lower)
}

impl ContactService {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn Notifier>, table: &str) -> Self {
        Self {
            inner: EntityService::new(store, notifier, table),
        }
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        self.inner.notifier()
    }

    pub async fn get_all(&self) -> Vec<Contact> {
        self.inner.get_all().await
    }

    pub async fn fetch_all(&self) -> Result<Vec<Contact>, CrmError> {
        self.inner.fetch_all().await
    }

    pub async fn get_by_id(&self, id: RecordId) -> Option<Contact> {
        self.inner.get_by_id(id).await
    }

    pub async fn fetch_by_id(&self, id: RecordId) -> Result<Option<Contact>, CrmError> {
        self.inner.fetch_by_id(id).await
    }

    pub async fn create(&self, input: &ContactInput) -> Result<Contact, CrmError> {
        let record = contact_create_record(input, &util::now());
        self.inner.create_record(record).await
    }

    pub async fn create_batch(
        &self,
        inputs: &[ContactInput],
    ) -> Result<BatchOutcome<Contact>, CrmError> {
        let now = util::now();
        let records = inputs
            .iter()
            .map(|input| contact_create_record(input, &now))
            .collect();
        self.inner.create_records(records).await
    }

    pub async fn update(&self, id: RecordId, patch: &ContactPatch) -> Result<Contact, CrmError> {
        let record = contact_update_record(id, patch, &util::now());
        self.inner.update_record(id, record).await
    }

    pub async fn delete(&self, id: RecordId) -> Result<bool, CrmError> {
        self.inner.delete(id).await
    }

    /// Case-insensitive substring search over name, email and company.
    ///
    /// The store filters with an OR group of `Contains` conditions; results
    /// are re-checked locally so a store with case-sensitive matching cannot
    /// widen the result set. Degrades to an empty list like `get_all`.
    pub async fn search(&self, query: &str) -> Vec<Contact> {
        let needle = query.trim();
        if needle.is_empty() {
            return self.get_all().await;
        }

        let q = self.inner.base_query().any_of(vec![
            Condition::contains(NAME, needle),
            Condition::contains(EMAIL, needle),
            Condition::contains(COMPANY, needle),
        ]);

        match self.inner.fetch(&q).await {
            Ok(found) => {
                let needle_lower = needle.to_lowercase();
                let matches: Vec<Contact> = found
                    .into_iter()
                    .filter(|c| contact_matches(c, &needle_lower))
                    .collect();
                log::debug!("Contact search {:?}: {} match(es)", needle, matches.len());
                matches
            }
            Err(e) => {
                log::error!("Contact search {:?} failed: {}", needle, e);
                self.inner.notifier().error("Failed to search contacts");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::QueuedNotifier;
    use crate::records::memory::MemoryRecordStore;
    use serde_json::json;

    fn service_with(store: Arc<MemoryRecordStore>) -> ContactService {
        ContactService::new(store, Arc::new(QueuedNotifier::new()), "contact_c")
    }

    fn seeded() -> Arc<MemoryRecordStore> {
        let store = Arc::new(MemoryRecordStore::new());
        store.seed(
            "contact_c",
            vec![
                json!({ "Id": 1, "Name": "Ana Ruiz", "email_c": "ana@acme.com", "company_c": "Acme", "updated_at_c": "2024-01-01T00:00:00.000Z" }),
                json!({ "Id": 2, "Name": "Ben Ode", "email_c": "ben@globex.com", "company_c": "Globex", "updated_at_c": "2024-02-01T00:00:00.000Z" }),
                json!({ "Id": 3, "Name": "Cy Acker", "email_c": "cy@initech.com", "company_c": "ACME Labs", "updated_at_c": "2024-03-01T00:00:00.000Z" }),
            ],
        );
        store
    }

    #[tokio::test]
    async fn test_create_assigns_next_id_and_equal_stamps() {
        let store = seeded();
        let svc = service_with(store.clone());

        let contact = svc
            .create(&ContactInput {
                name: "Dee Park".to_string(),
                email: "dee@x.com".to_string(),
                company: "Hooli".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(contact.id, 4);
        assert_eq!(contact.created_at, contact.updated_at);
        assert_eq!(svc.get_all().await[0].id, 4);
        assert_eq!(store.rows("contact_c").len(), 4);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let svc = service_with(seeded());
        let found = svc.search("acme").await;
        let ids: Vec<RecordId> = found.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_blank_search_returns_everything() {
        let svc = service_with(seeded());
        assert_eq!(svc.search("   ").await.len(), 3);
    }

    #[tokio::test]
    async fn test_update_keeps_created_at() {
        let svc = service_with(seeded());
        let before = svc.get_by_id(2).await.unwrap();
        let patch = ContactPatch {
            phone: Some("555-0199".to_string()),
            ..Default::default()
        };
        let after = svc.update(2, &patch).await.unwrap();

        assert_eq!(after.phone, "555-0199");
        assert_eq!(after.name, before.name);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn test_delete_missing_contact_is_false() {
        let svc = service_with(seeded());
        assert!(!svc.delete(999).await.unwrap());
        assert!(svc.delete(1).await.unwrap());
        assert!(svc.get_by_id(1).await.is_none());
    }
}
