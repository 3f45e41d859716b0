//! Demo data for running without a record-store account.
//!
//! Fixtures are JSON templates embedded at compile time. Date tokens are
//! resolved against the current clock so the dashboard always has a few
//! "this month" contacts and upcoming close dates.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::records::memory::MemoryRecordStore;
use crate::types::TableNames;
use crate::util::iso_timestamp;

// Fixture templates embedded at compile time
const CONTACTS_TMPL: &str = include_str!("fixtures/contacts.json.tmpl");
const DEALS_TMPL: &str = include_str!("fixtures/deals.json.tmpl");
const ACTIVITIES_TMPL: &str = include_str!("fixtures/activities.json.tmpl");

/// Replace date tokens in a template string.
pub(crate) fn patch_dates(template: &str, now: DateTime<Utc>) -> String {
    let stamp = |days: i64| iso_timestamp(&(now + chrono::Duration::days(days)));
    let date = |days: i64| {
        (now + chrono::Duration::days(days))
            .format("%Y-%m-%d")
            .to_string()
    };

    // LAST_MONTH is 35 days back, which always lands in the previous calendar month.
    template
        .replace("{{NOW}}", &stamp(0))
        .replace("{{YESTERDAY}}", &stamp(-1))
        .replace("{{LAST_WEEK}}", &stamp(-7))
        .replace("{{LAST_MONTH}}", &stamp(-35))
        .replace("{{LAST_WEEK_DATE}}", &date(-7))
        .replace("{{NEXT_WEEK_DATE}}", &date(7))
        .replace("{{NEXT_MONTH_DATE}}", &date(30))
}

fn parse_fixture(name: &str, template: &str, now: DateTime<Utc>) -> Result<Vec<Value>, String> {
    let content = patch_dates(template, now);
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {} fixture: {}", name, e))
}

/// Load every fixture into `store` under the configured table names.
pub fn seed_demo(store: &MemoryRecordStore, tables: &TableNames) -> Result<(), String> {
    let now = Utc::now();
    let fixtures = [
        (tables.contacts.as_str(), "contacts", CONTACTS_TMPL),
        (tables.deals.as_str(), "deals", DEALS_TMPL),
        (tables.activities.as_str(), "activities", ACTIVITIES_TMPL),
    ];

    for (table, name, template) in fixtures {
        let records = parse_fixture(name, template, now)?;
        log::debug!("Seeding {} demo {} into {}", records.len(), name, table);
        store.seed(table, records);
    }

    Ok(())
}

/// A fresh in-memory store holding the demo data.
pub fn demo_store(tables: &TableNames) -> Result<MemoryRecordStore, String> {
    let store = MemoryRecordStore::new();
    seed_demo(&store, tables)?;
    log::info!("Demo mode: using in-memory record store");
    Ok(store)
}
