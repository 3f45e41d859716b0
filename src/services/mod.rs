// Service layer: typed CRUD per entity over a shared record store.

pub mod activities;
pub mod contacts;
pub mod dashboard;
pub mod deals;
pub mod entities;

use std::sync::Arc;

use crate::notification::Notifier;
use crate::pipeline::PipelineBoard;
use crate::records::RecordStore;
use crate::types::TableNames;

pub use activities::ActivityService;
pub use contacts::ContactService;
pub use dashboard::{Dashboard, DashboardMetrics, StageTotals};
pub use deals::DealService;
pub use entities::{BatchOutcome, EntityService};

/// One service per entity, all sharing the same store and notifier.
#[derive(Clone)]
pub struct Services {
    pub contacts: ContactService,
    pub deals: DealService,
    pub activities: ActivityService,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        tables: &TableNames,
    ) -> Self {
        Self {
            contacts: ContactService::new(store.clone(), notifier.clone(), &tables.contacts),
            deals: DealService::new(store.clone(), notifier.clone(), &tables.deals),
            activities: ActivityService::new(store, notifier.clone(), &tables.activities),
            notifier,
        }
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard::new(self.deals.clone(), self.contacts.clone())
    }

    pub fn pipeline_board(&self) -> PipelineBoard {
        PipelineBoard::new(self.deals.clone(), self.contacts.clone())
    }
}
