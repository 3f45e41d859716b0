//! Error types for entity services and controllers
//!
//! Errors are classified by how the caller should react:
//! - Transient: network failures, timeouts. Reads degrade, writes can be retried by the user
//! - Rejected: the store answered but refused the record(s)
//! - Caller: validation failures, bad identifiers, missing records

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::entity::EntityType;
use crate::records::RecordFailure;
use crate::types::RecordId;

/// Field name → message, as shown next to form inputs.
pub type FieldErrors = BTreeMap<String, String>;

/// The write operation a rejection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
            WriteOp::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// Error types for CRM operations
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityType, id: RecordId },

    #[error("Validation failed: {}", describe_fields(.0))]
    Validation(FieldErrors),

    #[error("Failed to {operation} {} record(s): {}", .failures.len(), describe_failures(.failures))]
    Rejected {
        operation: WriteOp,
        failures: Vec<RecordFailure>,
    },

    #[error("Record store error: {0}")]
    Remote(String),

    // Transient
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    // Caller errors
    #[error("Invalid {field}: {value:?} is not a valid number")]
    TypeConversion { field: String, value: String },

    #[error("Failed to decode record: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    LoadFailed(String),
}

fn describe_fields(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_failures(failures: &[RecordFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl CrmError {
    /// Returns true if the request never got an answer from the store
    pub fn is_transient(&self) -> bool {
        matches!(self, CrmError::Network(_) | CrmError::Timeout(_))
    }

    /// Returns true for errors the user can fix by editing their input
    pub fn is_user_fixable(&self) -> bool {
        matches!(
            self,
            CrmError::Validation(_) | CrmError::Rejected { .. } | CrmError::TypeConversion { .. }
        )
    }

    /// Field-level messages, merged from client validation or store rejections.
    pub fn field_errors(&self) -> FieldErrors {
        match self {
            CrmError::Validation(errors) => errors.clone(),
            CrmError::Rejected { failures, .. } => {
                let mut out = FieldErrors::new();
                for failure in failures {
                    for err in &failure.field_errors {
                        out.entry(err.field_label.clone())
                            .or_insert_with(|| err.message.clone());
                    }
                }
                out
            }
            _ => FieldErrors::new(),
        }
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            CrmError::NotFound { .. } => "The record may have been deleted. Refresh and try again.",
            CrmError::Validation(_) => "Fix the highlighted fields and submit again.",
            CrmError::Rejected { .. } => "The record store rejected the data. Check the fields and retry.",
            CrmError::Remote(_) => "The record store reported an error. Try again later.",
            CrmError::Network(_) => "Check your internet connection and try again.",
            CrmError::Timeout(_) => "The request took too long. Try again.",
            CrmError::TypeConversion { .. } => "Check the link or identifier you used.",
            CrmError::Decode(_) => "The record store returned unexpected data.",
            CrmError::Configuration(_) => "Check your configuration in ~/.pipelinecrm/config.json",
            CrmError::LoadFailed(_) => "Retry loading the page.",
        }
    }
}

/// Serializable error representation for the UI
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: FieldErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Transient,
    Rejected,
    Caller,
}

impl From<&CrmError> for ErrorPayload {
    fn from(err: &CrmError) -> Self {
        let error_type = if err.is_transient() {
            ErrorType::Transient
        } else if matches!(err, CrmError::Rejected { .. } | CrmError::Remote(_)) {
            ErrorType::Rejected
        } else {
            ErrorType::Caller
        };

        ErrorPayload {
            message: err.to_string(),
            error_type,
            can_retry: err.is_transient(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
            field_errors: err.field_errors(),
        }
    }
}
