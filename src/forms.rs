//! Create/edit forms for contacts, deals and activities.
//!
//! Forms hold raw user input as strings. `validate` checks it client-side
//! and produces a typed input; `submit` never reaches the store while any
//! field error is outstanding.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::entity::EntityType;
use crate::error::{CrmError, FieldErrors};
use crate::notification::Notifier;
use crate::pipeline::Stage;
use crate::services::{ActivityService, ContactService, DealService};
use crate::types::{
    Activity, ActivityInput, ActivityType, Contact, ContactInput, Deal, DealInput, RecordId,
};
use crate::util;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

pub fn is_valid_email(email: &str) -> bool {
    email_re().is_match(email)
}

/// Whether a submit creates a new record or edits an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(RecordId),
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn finish<T>(errors: FieldErrors, input: impl FnOnce() -> Result<T, CrmError>) -> Result<T, CrmError> {
    if errors.is_empty() {
        input()
    } else {
        Err(CrmError::Validation(errors))
    }
}

/// Shared submit bookkeeping: success notice, error notice, field errors.
fn report<T>(
    result: Result<T, CrmError>,
    kind: EntityType,
    mode: FormMode,
    notifier: &dyn Notifier,
    errors: &mut FieldErrors,
) -> Result<T, CrmError> {
    match result {
        Ok(saved) => {
            let verb = match mode {
                FormMode::Create => "created",
                FormMode::Edit(_) => "updated",
            };
            notifier.success(&format!("{} {} successfully!", kind.label(), verb));
            Ok(saved)
        }
        Err(e) => {
            log::error!("Failed to save {}: {}", kind, e);
            errors.extend(e.field_errors());
            notifier.error(&e.to_string());
            Err(e)
        }
    }
}

// =============================================================================
// Contact
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    Name,
    Email,
    Phone,
    Company,
    Notes,
}

impl ContactField {
    pub fn key(&self) -> &'static str {
        match self {
            ContactField::Name => "name",
            ContactField::Email => "email",
            ContactField::Phone => "phone",
            ContactField::Company => "company",
            ContactField::Notes => "notes",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContactForm {
    pub mode: FormMode,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub notes: String,
    pub errors: FieldErrors,
    pub submitting: bool,
}

impl ContactForm {
    pub fn new() -> Self {
        Self {
            mode: FormMode::Create,
            name: String::new(),
            email: String::new(),
            phone: String::new(),
            company: String::new(),
            notes: String::new(),
            errors: FieldErrors::new(),
            submitting: false,
        }
    }

    pub fn edit(contact: &Contact) -> Self {
        Self {
            mode: FormMode::Edit(contact.id),
            name: contact.name.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            company: contact.company.clone(),
            notes: contact.notes.clone().unwrap_or_default(),
            errors: FieldErrors::new(),
            submitting: false,
        }
    }

    /// Update one field and clear its error.
    pub fn set_field(&mut self, field: ContactField, value: &str) {
        let slot = match field {
            ContactField::Name => &mut self.name,
            ContactField::Email => &mut self.email,
            ContactField::Phone => &mut self.phone,
            ContactField::Company => &mut self.company,
            ContactField::Notes => &mut self.notes,
        };
        *slot = value.to_string();
        self.errors.remove(field.key());
    }

    pub fn validate(&self) -> Result<ContactInput, CrmError> {
        let mut errors = FieldErrors::new();
        if blank(&self.name) {
            errors.insert("name".to_string(), "Name is required".to_string());
        }
        if blank(&self.email) {
            errors.insert("email".to_string(), "Email is required".to_string());
        } else if !is_valid_email(self.email.trim()) {
            errors.insert("email".to_string(), "Invalid email format".to_string());
        }
        if blank(&self.company) {
            errors.insert("company".to_string(), "Company is required".to_string());
        }

        finish(errors, || {
            Ok(ContactInput {
                name: self.name.trim().to_string(),
                email: self.email.trim().to_string(),
                company: self.company.trim().to_string(),
                phone: self.phone.trim().to_string(),
                notes: non_blank(&self.notes),
            })
        })
    }

    pub async fn submit(&mut self, service: &ContactService) -> Result<Contact, CrmError> {
        let input = match self.validate() {
            Ok(input) => input,
            Err(e) => {
                self.errors = e.field_errors();
                return Err(e);
            }
        };

        self.submitting = true;
        let result = match self.mode {
            FormMode::Create => service.create(&input).await,
            FormMode::Edit(id) => service.update(id, &input.into()).await,
        };
        self.submitting = false;

        report(
            result,
            EntityType::Contact,
            self.mode,
            service.notifier().as_ref(),
            &mut self.errors,
        )
    }
}

impl Default for ContactForm {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Deal
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealField {
    Title,
    ContactId,
    Value,
    Stage,
    Probability,
    ExpectedCloseDate,
    Notes,
}

impl DealField {
    pub fn key(&self) -> &'static str {
        match self {
            DealField::Title => "title",
            DealField::ContactId => "contactId",
            DealField::Value => "value",
            DealField::Stage => "stage",
            DealField::Probability => "probability",
            DealField::ExpectedCloseDate => "expectedCloseDate",
            DealField::Notes => "notes",
        }
    }
}

/// A contact choice in the deal form's picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactOption {
    pub id: RecordId,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct DealForm {
    pub mode: FormMode,
    pub title: String,
    pub contact_id: String,
    pub value: String,
    pub stage: Stage,
    pub probability: String,
    pub expected_close_date: String,
    pub notes: String,
    pub contact_options: Vec<ContactOption>,
    /// Set once `load_contacts` succeeds; from then on the contact must be
    /// one of `contact_options`.
    pub contacts_loaded: bool,
    pub errors: FieldErrors,
    pub submitting: bool,
}

impl DealForm {
    pub fn new() -> Self {
        Self {
            mode: FormMode::Create,
            title: String::new(),
            contact_id: String::new(),
            value: String::new(),
            stage: Stage::Lead,
            probability: Stage::Lead.default_probability().to_string(),
            expected_close_date: String::new(),
            notes: String::new(),
            contact_options: Vec::new(),
            contacts_loaded: false,
            errors: FieldErrors::new(),
            submitting: false,
        }
    }

    /// New deal preset to one contact (the "Add deal" button on a contact page).
    pub fn for_contact(contact_id: RecordId) -> Self {
        Self {
            contact_id: contact_id.to_string(),
            ..Self::new()
        }
    }

    pub fn edit(deal: &Deal) -> Self {
        Self {
            mode: FormMode::Edit(deal.id),
            title: deal.title.clone(),
            contact_id: deal.contact_id.to_string(),
            value: deal.value.to_string(),
            stage: deal.stage,
            probability: deal.probability.to_string(),
            expected_close_date: deal
                .expected_close_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            notes: deal.notes.clone().unwrap_or_default(),
            contact_options: Vec::new(),
            contacts_loaded: false,
            errors: FieldErrors::new(),
            submitting: false,
        }
    }

    /// Fill the contact picker. A failed load leaves it empty and notifies.
    pub async fn load_contacts(&mut self, contacts: &ContactService) {
        match contacts.fetch_all().await {
            Ok(all) => {
                self.contact_options = all
                    .into_iter()
                    .map(|c| ContactOption {
                        label: format!("{} - {}", c.name, c.company),
                        id: c.id,
                    })
                    .collect();
                self.contacts_loaded = true;
            }
            Err(e) => {
                log::error!("Failed to load contacts for deal form: {}", e);
                contacts.notifier().error("Failed to load contacts");
                self.contact_options.clear();
                self.contacts_loaded = false;
            }
        }
    }

    /// Update one field and clear its error. Choosing a stage resets the
    /// probability to that stage's default.
    pub fn set_field(&mut self, field: DealField, value: &str) {
        match field {
            DealField::Title => self.title = value.to_string(),
            DealField::ContactId => self.contact_id = value.to_string(),
            DealField::Value => self.value = value.to_string(),
            DealField::Probability => self.probability = value.to_string(),
            DealField::ExpectedCloseDate => self.expected_close_date = value.to_string(),
            DealField::Notes => self.notes = value.to_string(),
            DealField::Stage => match value.parse::<Stage>() {
                Ok(stage) => self.set_stage(stage),
                Err(e) => log::warn!("Ignoring stage selection: {}", e),
            },
        }
        self.errors.remove(field.key());
    }

    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
        self.probability = stage.default_probability().to_string();
        self.errors.remove(DealField::Stage.key());
        self.errors.remove(DealField::Probability.key());
    }

    pub fn validate(&self) -> Result<DealInput, CrmError> {
        let mut errors = FieldErrors::new();

        if blank(&self.title) {
            errors.insert("title".to_string(), "Deal title is required".to_string());
        }
        if blank(&self.contact_id) {
            errors.insert("contactId".to_string(), "Contact is required".to_string());
        } else if self.contacts_loaded {
            let known = util::parse_id_field("contactId", &self.contact_id)
                .map(|id| self.contact_options.iter().any(|o| o.id == id))
                .unwrap_or(true);
            if !known {
                errors.insert("contactId".to_string(), "Selected contact does not exist".to_string());
            }
        }

        let value = self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0);
        if value.is_none() {
            errors.insert("value".to_string(), "Valid deal value is required".to_string());
        }

        let close_date = NaiveDate::parse_from_str(self.expected_close_date.trim(), "%Y-%m-%d").ok();
        if close_date.is_none() {
            errors.insert(
                "expectedCloseDate".to_string(),
                "Expected close date is required".to_string(),
            );
        }

        let probability = self
            .probability
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| (0.0..=100.0).contains(p));
        if probability.is_none() {
            errors.insert(
                "probability".to_string(),
                "Probability must be between 0 and 100".to_string(),
            );
        }

        finish(errors, || {
            Ok(DealInput {
                title: self.title.trim().to_string(),
                value: value.unwrap_or_default(),
                stage: self.stage,
                probability: probability.unwrap_or_default().round() as u8,
                expected_close_date: close_date,
                notes: non_blank(&self.notes),
                contact_id: util::parse_id_field("contactId", &self.contact_id)?,
            })
        })
    }

    pub async fn submit(&mut self, service: &DealService) -> Result<Deal, CrmError> {
        let input = match self.validate() {
            Ok(input) => input,
            Err(e) => {
                self.errors = e.field_errors();
                return Err(e);
            }
        };

        self.submitting = true;
        let result = match self.mode {
            FormMode::Create => service.create(&input).await,
            FormMode::Edit(id) => service.update(id, &input.into()).await,
        };
        self.submitting = false;

        report(
            result,
            EntityType::Deal,
            self.mode,
            service.notifier().as_ref(),
            &mut self.errors,
        )
    }
}

impl Default for DealForm {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Activity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityField {
    Type,
    Description,
    ContactId,
}

impl ActivityField {
    pub fn key(&self) -> &'static str {
        match self {
            ActivityField::Type => "type",
            ActivityField::Description => "description",
            ActivityField::ContactId => "contactId",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityForm {
    pub activity_type: ActivityType,
    pub description: String,
    pub contact_id: String,
    pub errors: FieldErrors,
    pub submitting: bool,
}

impl ActivityForm {
    pub fn new() -> Self {
        Self {
            activity_type: ActivityType::Call,
            description: String::new(),
            contact_id: String::new(),
            errors: FieldErrors::new(),
            submitting: false,
        }
    }

    pub fn for_contact(contact_id: RecordId) -> Self {
        Self {
            contact_id: contact_id.to_string(),
            ..Self::new()
        }
    }

    pub fn set_field(&mut self, field: ActivityField, value: &str) {
        match field {
            ActivityField::Type => self.activity_type = ActivityType::from_str_lossy(value),
            ActivityField::Description => self.description = value.to_string(),
            ActivityField::ContactId => self.contact_id = value.to_string(),
        }
        self.errors.remove(field.key());
    }

    pub fn validate(&self) -> Result<ActivityInput, CrmError> {
        let mut errors = FieldErrors::new();
        if blank(&self.description) {
            errors.insert("description".to_string(), "Description is required".to_string());
        }
        if blank(&self.contact_id) {
            errors.insert("contactId".to_string(), "Contact is required".to_string());
        }

        finish(errors, || {
            Ok(ActivityInput {
                activity_type: self.activity_type,
                description: self.description.trim().to_string(),
                contact_id: util::parse_id_field("contactId", &self.contact_id)?,
            })
        })
    }

    pub async fn submit(&mut self, service: &ActivityService) -> Result<Activity, CrmError> {
        let input = match self.validate() {
            Ok(input) => input,
            Err(e) => {
                self.errors = e.field_errors();
                return Err(e);
            }
        };

        self.submitting = true;
        let result = service.create(&input).await;
        self.submitting = false;

        report(
            result,
            EntityType::Activity,
            FormMode::Create,
            service.notifier().as_ref(),
            &mut self.errors,
        )
    }
}

impl Default for ActivityForm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{NoticeLevel, QueuedNotifier};
    use crate::records::memory::MemoryRecordStore;
    use crate::services::Services;
    use crate::types::TableNames;
    use serde_json::json;
    use std::sync::Arc;

    fn services() -> (Services, Arc<MemoryRecordStore>, QueuedNotifier) {
        let store = Arc::new(MemoryRecordStore::new());
        store.seed(
            "contact_c",
            vec![json!({ "Id": 1, "Name": "Ana Ruiz", "email_c": "ana@acme.com", "company_c": "Acme" })],
        );
        let notifier = QueuedNotifier::new();
        let services = Services::new(store.clone(), Arc::new(notifier.clone()), &TableNames::default());
        (services, store, notifier)
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("ana@acme.com"));
        assert!(!is_valid_email("ana@acme"));
        assert!(!is_valid_email("ana acme@x.com"));
        assert!(!is_valid_email("@acme.com"));
    }

    #[test]
    fn test_contact_validation_messages() {
        let mut form = ContactForm::new();
        form.set_field(ContactField::Email, "not-an-email");
        let errors = form.validate().unwrap_err().field_errors();

        assert_eq!(errors["name"], "Name is required");
        assert_eq!(errors["email"], "Invalid email format");
        assert_eq!(errors["company"], "Company is required");
        assert!(!errors.contains_key("phone"));
    }

    #[tokio::test]
    async fn test_invalid_submit_makes_no_remote_call() {
        let (services, store, notifier) = services();
        let mut form = DealForm::new();
        form.set_field(DealField::Title, "Renewal");

        let err = form.submit(&services.deals).await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
        assert_eq!(form.errors["contactId"], "Contact is required");
        assert_eq!(form.errors["value"], "Valid deal value is required");
        assert_eq!(form.errors["expectedCloseDate"], "Expected close date is required");
        assert_eq!(store.write_calls(), 0);
        assert!(notifier.snapshot().is_empty());

        form.set_field(DealField::Value, "1200");
        assert!(!form.errors.contains_key("value"));
    }

    #[test]
    fn test_stage_change_overwrites_probability() {
        let mut form = DealForm::new();
        assert_eq!(form.probability, "30");

        form.set_field(DealField::Probability, "45");
        form.set_field(DealField::Stage, "Proposal");
        assert_eq!(form.stage, Stage::Proposal);
        assert_eq!(form.probability, "75");

        form.set_field(DealField::Stage, "Lost");
        assert_eq!(form.probability, "0");

        form.set_field(DealField::Stage, "Archived");
        assert_eq!(form.stage, Stage::Lost);
    }

    #[test]
    fn test_deal_value_and_probability_bounds() {
        let mut form = DealForm::for_contact(1);
        form.set_field(DealField::Title, "Renewal");
        form.set_field(DealField::Value, "0");
        form.set_field(DealField::Probability, "101");
        form.set_field(DealField::ExpectedCloseDate, "2024-09-30");

        let errors = form.validate().unwrap_err().field_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors["probability"], "Probability must be between 0 and 100");

        form.set_field(DealField::Value, "abc");
        assert!(form.validate().unwrap_err().field_errors().contains_key("value"));
    }

    #[test]
    fn test_non_numeric_contact_fails_fast() {
        let mut form = ActivityForm::new();
        form.set_field(ActivityField::Description, "Intro call");
        form.set_field(ActivityField::ContactId, "abc");
        assert!(matches!(
            form.validate(),
            Err(CrmError::TypeConversion { ref field, .. }) if field == "contactId"
        ));
    }

    #[tokio::test]
    async fn test_create_deal_notifies_success() {
        let (services, _, notifier) = services();
        let mut form = DealForm::for_contact(1);
        form.set_field(DealField::Title, "Renewal");
        form.set_field(DealField::Value, "12500");
        form.set_field(DealField::Stage, "Negotiation");
        form.set_field(DealField::ExpectedCloseDate, "2024-09-30");

        let deal = form.submit(&services.deals).await.unwrap();
        assert_eq!(deal.probability, 85);
        assert_eq!(deal.contact_id, 1);

        let notices = notifier.drain();
        assert_eq!(notices[0].level, NoticeLevel::Success);
        assert_eq!(notices[0].message, "Deal created successfully!");
    }

    #[tokio::test]
    async fn test_deal_contact_must_be_a_loaded_option() {
        let (services, store, _) = services();
        let mut form = DealForm::for_contact(999);
        form.load_contacts(&services.contacts).await;
        assert!(form.contacts_loaded);
        assert_eq!(
            form.contact_options,
            vec![ContactOption { id: 1, label: "Ana Ruiz - Acme".to_string() }]
        );

        form.set_field(DealField::Title, "Renewal");
        form.set_field(DealField::Value, "1200");
        form.set_field(DealField::ExpectedCloseDate, "2024-09-30");
        let err = form.submit(&services.deals).await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
        assert_eq!(form.errors["contactId"], "Selected contact does not exist");
        assert_eq!(store.write_calls(), 0);

        form.set_field(DealField::ContactId, "1");
        assert_eq!(form.submit(&services.deals).await.unwrap().contact_id, 1);
    }

    #[tokio::test]
    async fn test_failed_contact_load_notifies() {
        let (services, store, notifier) = services();
        store.set_offline(true);
        let mut form = DealForm::new();
        form.load_contacts(&services.contacts).await;

        assert!(!form.contacts_loaded);
        assert!(form.contact_options.is_empty());
        let notices = notifier.drain();
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].message, "Failed to load contacts");
    }

    #[tokio::test]
    async fn test_edit_contact_notifies_update() {
        let (services, _, notifier) = services();
        let contact = services.contacts.get_by_id(1).await.unwrap();
        let mut form = ContactForm::edit(&contact);
        form.set_field(ContactField::Company, "Acme Labs");

        let saved = form.submit(&services.contacts).await.unwrap();
        assert_eq!(saved.company, "Acme Labs");
        assert_eq!(notifier.drain()[0].message, "Contact updated successfully!");
    }

    #[tokio::test]
    async fn test_rejected_submit_surfaces_field_errors() {
        let (services, store, notifier) = services();
        store.require_fields("activity_c", &["description_c", "priority_c"]);
        let mut form = ActivityForm::for_contact(1);
        form.set_field(ActivityField::Description, "Sent deck");
        form.set_field(ActivityField::Type, "Email");

        let err = form.submit(&services.activities).await.unwrap_err();
        assert!(matches!(err, CrmError::Rejected { .. }));
        assert_eq!(form.errors["priority_c"], "priority_c is required");
        assert!(!form.submitting);

        let notices = notifier.drain();
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(notices[0].message.starts_with("Failed to create 1 record(s)"));
    }
}
