//! View controllers: each owns its in-memory collections and talks to the
//! services. They take `&mut self`, so nothing is shared between views.

pub mod contacts;
pub mod deals;

use serde::Serialize;

pub use contacts::{ContactDetail, ContactList, ContactSortField};
pub use deals::{DealDetail, DealList, DealSortField};

/// Where a view is in its load cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

impl LoadState {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Column sort with table-header toggle semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort<F> {
    pub field: F,
    pub direction: SortDirection,
}

impl<F: PartialEq + Copy> Sort<F> {
    /// Same field flips direction; a new field starts ascending.
    pub fn toggle(&mut self, field: F) {
        if self.field == field {
            self.direction = match self.direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc => SortDirection::Asc,
            };
        } else {
            self.field = field;
            self.direction = SortDirection::Asc;
        }
    }

    pub fn apply(&self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Total order over floats for sorting; NaN sorts as equal.
pub(crate) fn cmp_f64(a: f64, b: f64) -> std::cmp::Ordering {
    a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
}

/// Case-insensitive text ordering.
pub(crate) fn cmp_text(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Col {
        Name,
        Email,
    }

    #[test]
    fn test_toggle_semantics() {
        let mut sort = Sort {
            field: Col::Name,
            direction: SortDirection::Desc,
        };
        sort.toggle(Col::Name);
        assert_eq!(sort.direction, SortDirection::Asc);
        sort.toggle(Col::Name);
        assert_eq!(sort.direction, SortDirection::Desc);

        sort.toggle(Col::Email);
        assert_eq!(sort.field, Col::Email);
        assert_eq!(sort.direction, SortDirection::Asc);
    }

    #[test]
    fn test_load_state_serializes_with_message() {
        let failed = LoadState::Failed("Failed to load pipeline data: offline".to_string());
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({ "status": "failed", "message": "Failed to load pipeline data: offline" })
        );
        assert_eq!(failed.error(), Some("Failed to load pipeline data: offline"));
        assert!(LoadState::Ready.is_ready());
    }
}
