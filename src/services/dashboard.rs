// Dashboard service — aggregate metrics over the current deal and contact snapshot.
// Metrics are pure functions of the collections; nothing aggregate is persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::controllers::LoadState;
use crate::error::CrmError;
use crate::pipeline::Stage;
use crate::types::{Contact, Deal};
use crate::util;

use super::{ContactService, DealService};

/// Count and summed value of the deals in one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTotals {
    pub count: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_deals: usize,
    pub total_value: f64,
    pub won_deals: usize,
    pub won_value: f64,
    /// Percent of deals that are Won. 0 with no deals.
    pub conversion_rate: f64,
    /// 0 with no deals.
    pub avg_deal_size: f64,
    /// Only stages that actually hold deals appear here.
    pub pipeline_by_stage: BTreeMap<Stage, StageTotals>,
    pub total_contacts: usize,
    /// Contacts created in the calendar month of `now`.
    pub recent_contacts: usize,
    /// Deals that are neither Won nor Lost.
    pub active_deals: usize,
}

impl DashboardMetrics {
    pub fn compute(deals: &[Deal], contacts: &[Contact], now: DateTime<Utc>) -> Self {
        let mut pipeline_by_stage: BTreeMap<Stage, StageTotals> = BTreeMap::new();
        let mut total_value = 0.0;
        for deal in deals {
            total_value += deal.value;
            let totals = pipeline_by_stage.entry(deal.stage).or_default();
            totals.count += 1;
            totals.value += deal.value;
        }

        let won = pipeline_by_stage.get(&Stage::Won).copied().unwrap_or_default();
        let lost = pipeline_by_stage.get(&Stage::Lost).copied().unwrap_or_default();
        let total_deals = deals.len();

        let (conversion_rate, avg_deal_size) = if total_deals > 0 {
            (
                won.count as f64 / total_deals as f64 * 100.0,
                total_value / total_deals as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let recent_contacts = contacts
            .iter()
            .filter(|c| c.created_at.year() == now.year() && c.created_at.month() == now.month())
            .count();

        DashboardMetrics {
            total_deals,
            total_value,
            won_deals: won.count,
            won_value: won.value,
            conversion_rate,
            avg_deal_size,
            pipeline_by_stage,
            total_contacts: contacts.len(),
            recent_contacts,
            active_deals: total_deals - won.count - lost.count,
        }
    }

    /// Headline cards as (title, formatted value) pairs.
    pub fn cards(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Total Pipeline Value", util::format_currency(self.total_value)),
            ("Won Deals", util::format_currency(self.won_value)),
            ("Conversion Rate", util::format_percentage(self.conversion_rate)),
            ("Avg Deal Size", util::format_currency(self.avg_deal_size)),
            ("Total Contacts", self.total_contacts.to_string()),
            ("Active Deals", self.active_deals.to_string()),
        ]
    }
}

/// Loads deals and contacts together and keeps metrics in step with them.
pub struct Dashboard {
    deals_svc: DealService,
    contacts_svc: ContactService,
    deals: Vec<Deal>,
    contacts: Vec<Contact>,
    metrics: DashboardMetrics,
    state: LoadState,
}

impl Dashboard {
    pub fn new(deals_svc: DealService, contacts_svc: ContactService) -> Self {
        Self {
            deals_svc,
            contacts_svc,
            deals: Vec::new(),
            contacts: Vec::new(),
            metrics: DashboardMetrics::default(),
            state: LoadState::Loading,
        }
    }

    /// Fetch both collections in parallel. Either failure discards both.
    pub async fn load(&mut self) -> Result<(), CrmError> {
        self.state = LoadState::Loading;
        let result = tokio::try_join!(self.deals_svc.fetch_all(), self.contacts_svc.fetch_all());

        match result {
            Ok((deals, contacts)) => {
                log::info!(
                    "Dashboard loaded {} deal(s), {} contact(s)",
                    deals.len(),
                    contacts.len()
                );
                self.deals = deals;
                self.contacts = contacts;
                self.recompute();
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load dashboard data: {}", e);
                self.deals.clear();
                self.contacts.clear();
                self.recompute();
                self.state = LoadState::Failed(format!("Failed to load dashboard data: {}", e));
                Err(CrmError::LoadFailed(e.to_string()))
            }
        }
    }

    fn recompute(&mut self) {
        self.metrics = DashboardMetrics::compute(&self.deals, &self.contacts, util::now());
    }

    pub fn metrics(&self) -> &DashboardMetrics {
        &self.metrics
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn deal(id: i64, stage: Stage, value: f64) -> Deal {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        Deal {
            id,
            title: format!("Deal {}", id),
            value,
            stage,
            probability: stage.default_probability(),
            expected_close_date: None,
            notes: None,
            contact_id: 1,
            created_at: at,
            updated_at: at,
        }
    }

    fn contact(id: i64, created_at: DateTime<Utc>) -> Contact {
        Contact {
            id,
            name: format!("Contact {}", id),
            company: "Acme".to_string(),
            email: format!("c{}@acme.com", id),
            phone: String::new(),
            notes: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_empty_collections_are_all_zero() {
        let metrics = DashboardMetrics::compute(&[], &[], Utc::now());
        assert_eq!(metrics.conversion_rate, 0.0);
        assert_eq!(metrics.avg_deal_size, 0.0);
        assert!(metrics.pipeline_by_stage.is_empty());
        assert_eq!(metrics, DashboardMetrics::default());
    }

    #[test]
    fn test_aggregates() {
        let deals = vec![
            deal(1, Stage::Lead, 1000.0),
            deal(2, Stage::Won, 4000.0),
            deal(3, Stage::Lead, 500.0),
            deal(4, Stage::Lost, 2500.0),
        ];
        let metrics = DashboardMetrics::compute(&deals, &[], Utc::now());

        assert_eq!(metrics.total_deals, 4);
        assert_eq!(metrics.total_value, 8000.0);
        assert_eq!(metrics.won_deals, 1);
        assert_eq!(metrics.won_value, 4000.0);
        assert_eq!(metrics.conversion_rate, 25.0);
        assert_eq!(metrics.avg_deal_size, 2000.0);
        assert_eq!(metrics.active_deals, 2);

        let stages: Vec<Stage> = metrics.pipeline_by_stage.keys().copied().collect();
        assert_eq!(stages, vec![Stage::Lead, Stage::Won, Stage::Lost]);
        assert_eq!(
            metrics.pipeline_by_stage[&Stage::Lead],
            StageTotals { count: 2, value: 1500.0 }
        );

        let summed: f64 = metrics.pipeline_by_stage.values().map(|t| t.value).sum();
        assert_eq!(summed, metrics.total_value);
    }

    #[test]
    fn test_stage_values_sum_to_total_for_many_collections() {
        for n in 0..40usize {
            let deals: Vec<Deal> = (0..n)
                .map(|i| {
                    let stage = Stage::ALL[(i * 7 + n) % Stage::ALL.len()];
                    let value = ((i * 37 + n * 13) % 1000) as f64 * 12.5;
                    deal(i as i64 + 1, stage, value)
                })
                .collect();
            let metrics = DashboardMetrics::compute(&deals, &[], Utc::now());

            let by_stage: f64 = metrics.pipeline_by_stage.values().map(|t| t.value).sum();
            let by_deal: f64 = deals.iter().map(|d| d.value).sum();
            assert_eq!(by_stage, by_deal, "collection of {}", n);
            assert_eq!(metrics.total_value, by_deal);

            let counted: usize = metrics.pipeline_by_stage.values().map(|t| t.count).sum();
            assert_eq!(counted, n);
            assert!(metrics.pipeline_by_stage.values().all(|t| t.count > 0));
        }
    }

    #[test]
    fn test_recent_contacts_uses_calendar_month() {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let contacts = vec![
            contact(1, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            contact(2, Utc.with_ymd_and_hms(2024, 4, 30, 23, 59, 59).unwrap()),
            contact(3, Utc.with_ymd_and_hms(2023, 5, 10, 0, 0, 0).unwrap()),
        ];
        let metrics = DashboardMetrics::compute(&[], &contacts, now);
        assert_eq!(metrics.total_contacts, 3);
        assert_eq!(metrics.recent_contacts, 1);
    }

    #[test]
    fn test_cards_format_values() {
        let metrics = DashboardMetrics::compute(&[deal(1, Stage::Won, 12500.0)], &[], Utc::now());
        let cards = metrics.cards();
        assert_eq!(cards[0], ("Total Pipeline Value", "$12,500".to_string()));
        assert_eq!(cards[2], ("Conversion Rate", "100%".to_string()));
    }
}
