//! Contact list and contact detail views.

use std::cmp::Ordering;

use crate::error::CrmError;
use crate::pipeline::Stage;
use crate::services::contacts::contact_matches;
use crate::services::Services;
use crate::types::{Activity, Contact, Deal, RecordId};

use super::{cmp_text, LoadState, Sort, SortDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactSortField {
    Name,
    Email,
    Company,
    CreatedAt,
    UpdatedAt,
}

impl ContactSortField {
    fn compare(&self, a: &Contact, b: &Contact) -> Ordering {
        match self {
            ContactSortField::Name => cmp_text(&a.name, &b.name),
            ContactSortField::Email => cmp_text(&a.email, &b.email),
            ContactSortField::Company => cmp_text(&a.company, &b.company),
            ContactSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            ContactSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        }
    }
}

// =============================================================================
// List
// =============================================================================

pub struct ContactList {
    services: Services,
    contacts: Vec<Contact>,
    search: String,
    sort: Sort<ContactSortField>,
    state: LoadState,
}

impl ContactList {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            contacts: Vec::new(),
            search: String::new(),
            sort: Sort {
                field: ContactSortField::UpdatedAt,
                direction: SortDirection::Desc,
            },
            state: LoadState::Loading,
        }
    }

    pub async fn load(&mut self) -> Result<(), CrmError> {
        self.state = LoadState::Loading;
        match self.services.contacts.fetch_all().await {
            Ok(contacts) => {
                self.contacts = contacts;
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load contacts: {}", e);
                self.contacts.clear();
                self.state = LoadState::Failed(format!("Failed to load contacts: {}", e));
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

    pub fn sort_by(&mut self, field: ContactSortField) {
        self.sort.toggle(field);
    }

    pub fn sort(&self) -> Sort<ContactSortField> {
        self.sort
    }

    pub fn total(&self) -> usize {
        self.contacts.len()
    }

    /// The rows to show: search filter, then the current sort.
    pub fn visible(&self) -> Vec<&Contact> {
        let needle = self.search.trim().to_lowercase();
        let mut rows: Vec<&Contact> = self
            .contacts
            .iter()
            .filter(|c| needle.is_empty() || contact_matches(c, &needle))
            .collect();
        rows.sort_by(|a, b| self.sort.apply(self.sort.field.compare(a, b)));
        rows
    }

    /// Fold a contact saved by a form into the list: replace when known,
    /// otherwise prepend.
    pub fn apply_saved(&mut self, contact: Contact) {
        match self.contacts.iter_mut().find(|c| c.id == contact.id) {
            Some(slot) => *slot = contact,
            None => self.contacts.insert(0, contact),
        }
    }

    pub async fn delete(&mut self, id: RecordId) -> Result<bool, CrmError> {
        let notifier = self.services.notifier.clone();
        match self.services.contacts.delete(id).await {
            Ok(true) => {
                self.contacts.retain(|c| c.id != id);
                notifier.success("Contact deleted successfully");
                Ok(true)
            }
            Ok(false) => {
                notifier.error("Failed to delete contact");
                Ok(false)
            }
            Err(e) => {
                notifier.error("Failed to delete contact");
                Err(e)
            }
        }
    }
}

// =============================================================================
// Detail
// =============================================================================

pub struct ContactDetail {
    services: Services,
    id: RecordId,
    contact: Option<Contact>,
    deals: Vec<Deal>,
    activities: Vec<Activity>,
    state: LoadState,
}

impl ContactDetail {
    pub fn new(services: Services, id: RecordId) -> Self {
        Self {
            services,
            id,
            contact: None,
            deals: Vec::new(),
            activities: Vec::new(),
            state: LoadState::Loading,
        }
    }

    /// Open a detail view from a route parameter.
    pub fn from_route(services: Services, raw_id: &str) -> Result<Self, CrmError> {
        let id = crate::util::parse_record_id(raw_id)?;
        Ok(Self::new(services, id))
    }

    /// Contact, deals and activities in parallel.
    pub async fn load(&mut self) -> Result<(), CrmError> {
        self.state = LoadState::Loading;
        let result = tokio::try_join!(
            self.services.contacts.fetch_by_id(self.id),
            self.services.deals.fetch_by_contact_id(self.id),
            self.services.activities.fetch_by_contact_id(self.id),
        );

        match result {
            Ok((Some(contact), deals, activities)) => {
                self.contact = Some(contact);
                self.deals = deals;
                self.activities = activities;
                self.state = LoadState::Ready;
                Ok(())
            }
            Ok((None, _, _)) => {
                self.clear();
                self.state = LoadState::Failed("Contact not found".to_string());
                Err(CrmError::NotFound {
                    entity: crate::entity::EntityType::Contact,
                    id: self.id,
                })
            }
            Err(e) => {
                log::error!("Failed to load contact {}: {}", self.id, e);
                self.clear();
                self.state = LoadState::Failed(format!("Failed to load contact details: {}", e));
                Err(CrmError::LoadFailed(e.to_string()))
            }
        }
    }

    fn clear(&mut self) {
        self.contact = None;
        self.deals.clear();
        self.activities.clear();
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn total_deal_value(&self) -> f64 {
        self.deals.iter().map(|d| d.value).sum()
    }

    pub fn won_deals(&self) -> Vec<&Deal> {
        self.deals.iter().filter(|d| d.stage == Stage::Won).collect()
    }

    /// Take the result of an edit form.
    pub fn apply_contact(&mut self, contact: Contact) {
        if contact.id == self.id {
            self.contact = Some(contact);
        }
    }

    /// Take a deal created from this page.
    pub fn add_deal(&mut self, deal: Deal) {
        if deal.contact_id == self.id {
            self.deals.insert(0, deal);
        }
    }

    /// Take an activity logged from this page.
    pub fn log_activity(&mut self, activity: Activity) {
        if activity.contact_id == self.id {
            self.activities.insert(0, activity);
        }
    }

    pub async fn delete_activity(&mut self, activity_id: RecordId) -> Result<bool, CrmError> {
        let notifier = self.services.notifier.clone();
        let deleted = self.services.activities.delete(activity_id).await.map_err(|e| {
            notifier.error("Failed to delete activity");
            e
        })?;
        if deleted {
            self.activities.retain(|a| a.id != activity_id);
            notifier.success("Activity deleted successfully");
        } else {
            notifier.error("Failed to delete activity");
        }
        Ok(deleted)
    }

    /// Delete the contact itself. Linked deals and activities stay in the store.
    pub async fn delete_contact(&mut self) -> Result<bool, CrmError> {
        let notifier = self.services.notifier.clone();
        let deleted = self.services.contacts.delete(self.id).await.map_err(|e| {
            notifier.error("Failed to delete contact");
            e
        })?;
        if deleted {
            self.clear();
            notifier.success("Contact deleted successfully");
        } else {
            notifier.error("Failed to delete contact");
        }
        Ok(deleted)
    }
}
