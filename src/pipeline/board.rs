//! Kanban board over the pipeline stages.
//!
//! The board owns its deal and contact snapshots plus a single drag slot.
//! A drop writes the new stage first and only then replaces the deal with
//! the store's copy; a failed write leaves the snapshot as it was.

use std::collections::HashMap;

use serde::Serialize;

use crate::controllers::LoadState;
use crate::error::CrmError;
use crate::services::{ContactService, DealService};
use crate::types::{Contact, Deal, RecordId};

use super::Stage;

/// At most one deal is in flight at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum DragState {
    Idle,
    Dragging { deal: Deal },
}

#[derive(Debug)]
pub enum DropOutcome {
    /// Nothing was being dragged.
    NoDrag,
    /// Dropped on the column it came from; nothing written.
    Unchanged,
    /// The store accepted the move; carries the confirmed deal.
    Moved(Deal),
    /// The store refused or could not be reached; the deal is untouched.
    Failed(CrmError),
}

/// One board column.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageColumn {
    pub stage: Stage,
    pub deals: Vec<Deal>,
    pub count: usize,
    pub value: f64,
    pub progress: f64,
}

pub struct PipelineBoard {
    deals_svc: DealService,
    contacts_svc: ContactService,
    deals: Vec<Deal>,
    contacts: HashMap<RecordId, Contact>,
    state: LoadState,
    drag: DragState,
}

impl PipelineBoard {
    pub fn new(deals_svc: DealService, contacts_svc: ContactService) -> Self {
        Self {
            deals_svc,
            contacts_svc,
            deals: Vec::new(),
            contacts: HashMap::new(),
            state: LoadState::Loading,
            drag: DragState::Idle,
        }
    }

    /// Fetch deals and contacts in parallel. Either failure clears both.
    pub async fn load(&mut self) -> Result<(), CrmError> {
        self.state = LoadState::Loading;
        self.drag = DragState::Idle;

        match tokio::try_join!(self.deals_svc.fetch_all(), self.contacts_svc.fetch_all()) {
            Ok((deals, contacts)) => {
                log::info!(
                    "Pipeline loaded {} deal(s), {} contact(s)",
                    deals.len(),
                    contacts.len()
                );
                self.deals = deals;
                self.contacts = contacts.into_iter().map(|c| (c.id, c)).collect();
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load pipeline data: {}", e);
                self.deals.clear();
                self.contacts.clear();
                self.state = LoadState::Failed(format!("Failed to load pipeline data: {}", e));
                Err(CrmError::LoadFailed(e.to_string()))
            }
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    pub fn is_empty(&self) -> bool {
        self.deals.is_empty()
    }

    pub fn contact_for(&self, deal: &Deal) -> Option<&Contact> {
        self.contacts.get(&deal.contact_id)
    }

    pub fn columns(&self) -> Vec<StageColumn> {
        Stage::ALL
            .iter()
            .map(|&stage| {
                let deals: Vec<Deal> = self
                    .deals
                    .iter()
                    .filter(|d| d.stage == stage)
                    .cloned()
                    .collect();
                StageColumn {
                    stage,
                    count: deals.len(),
                    value: deals.iter().map(|d| d.value).sum(),
                    progress: stage.progress(),
                    deals,
                }
            })
            .collect()
    }

    /// Pick up a deal. Any previous drag is abandoned.
    pub fn drag_start(&mut self, deal_id: RecordId) -> bool {
        match self.deals.iter().find(|d| d.id == deal_id) {
            Some(deal) => {
                if let DragState::Dragging { deal: previous } = &self.drag {
                    log::debug!("Abandoning drag of deal {}", previous.id);
                }
                self.drag = DragState::Dragging { deal: deal.clone() };
                true
            }
            None => {
                log::warn!("drag_start for unknown deal {}", deal_id);
                self.drag = DragState::Idle;
                false
            }
        }
    }

    /// Hovering a column accepts the drop when something is being dragged.
    pub fn drag_over(&self, _stage: Stage) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    pub fn drag_cancel(&mut self) {
        self.drag = DragState::Idle;
    }

    /// Drop the dragged deal on `stage`. Always leaves the board idle.
    pub async fn drop_on(&mut self, stage: Stage) -> DropOutcome {
        let deal = match std::mem::replace(&mut self.drag, DragState::Idle) {
            DragState::Idle => return DropOutcome::NoDrag,
            DragState::Dragging { deal } => deal,
        };

        if deal.stage == stage {
            return DropOutcome::Unchanged;
        }

        let notifier = self.deals_svc.notifier().clone();
        match self.deals_svc.update_stage(deal.id, stage).await {
            Ok(updated) => {
                if let Some(slot) = self.deals.iter_mut().find(|d| d.id == updated.id) {
                    *slot = updated.clone();
                }
                notifier.success(&format!("Deal moved to {}", stage));
                DropOutcome::Moved(updated)
            }
            Err(e) => {
                log::error!("Failed to move deal {} to {}: {}", deal.id, stage, e);
                notifier.error("Failed to update deal stage");
                DropOutcome::Failed(e)
            }
        }
    }
}
