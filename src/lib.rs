//! Pipeline CRM core: contacts, deals, activities and the sales pipeline
//! over a hosted record store.

pub mod controllers;
pub mod devtools;
pub mod entity;
pub mod error;
pub mod fields;
pub mod forms;
pub mod notification;
pub mod pipeline;
pub mod records;
pub mod services;
pub mod state;
pub mod types;
pub mod util;

pub use error::{CrmError, ErrorPayload};
pub use state::AppState;
