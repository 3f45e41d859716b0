//! pipelinecrm: print a JSON snapshot of the CRM.
//!
//! Usage: `pipelinecrm [--demo] <dashboard | pipeline | contacts [query] | deals [query] | contact <id> | deal <id>>`
//!
//! Reads ~/.pipelinecrm/config.json unless `--demo` is given, in which case
//! an in-memory store seeded with sample data is used.

use std::process::ExitCode;

use serde_json::{json, Value};

use pipelinecrm_lib::controllers::{ContactDetail, ContactList, DealDetail, DealList};
use pipelinecrm_lib::error::{CrmError, ErrorPayload};
use pipelinecrm_lib::state::AppState;

const USAGE: &str = "usage: pipelinecrm [--demo] <dashboard | pipeline | contacts [query] | deals [query] | contact <id> | deal <id>>";

#[derive(Debug, PartialEq)]
enum Command {
    Dashboard,
    Pipeline,
    Contacts(Option<String>),
    Deals(Option<String>),
    Contact(String),
    Deal(String),
}

fn parse_args(args: &[String]) -> Result<(bool, Command), String> {
    let mut demo = false;
    let mut rest: Vec<&str> = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--demo" => demo = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => rest.push(other),
        }
    }

    let query = |i: usize| {
        let joined = rest[i..].join(" ");
        (!joined.trim().is_empty()).then_some(joined)
    };

    let command = match rest.first().copied() {
        Some("dashboard") => Command::Dashboard,
        Some("pipeline") => Command::Pipeline,
        Some("contacts") => Command::Contacts(query(1)),
        Some("deals") => Command::Deals(query(1)),
        Some("contact") => Command::Contact(rest.get(1).ok_or(USAGE)?.to_string()),
        Some("deal") => Command::Deal(rest.get(1).ok_or(USAGE)?.to_string()),
        Some(other) => return Err(format!("unknown command '{}'\n{}", other, USAGE)),
        None => return Err(USAGE.to_string()),
    };
    Ok((demo, command))
}

async fn run(state: &AppState, command: Command) -> Result<Value, CrmError> {
    let services = state.services.clone();
    match command {
        Command::Dashboard => {
            let mut dashboard = services.dashboard();
            dashboard.load().await?;
            let metrics = dashboard.metrics();
            let cards: Vec<Value> = metrics
                .cards()
                .into_iter()
                .map(|(label, value)| json!({ "label": label, "value": value }))
                .collect();
            Ok(json!({ "metrics": metrics, "cards": cards }))
        }
        Command::Pipeline => {
            let mut board = services.pipeline_board();
            board.load().await?;
            Ok(json!({ "columns": board.columns() }))
        }
        Command::Contacts(query) => {
            let mut list = ContactList::new(services);
            list.load().await?;
            if let Some(q) = query {
                list.set_search(&q);
            }
            Ok(json!({ "total": list.total(), "contacts": list.visible() }))
        }
        Command::Deals(query) => {
            let mut list = DealList::new(services);
            list.load().await?;
            if let Some(q) = query {
                list.set_search(&q);
            }
            Ok(json!({
                "total": list.total(),
                "visibleValue": list.visible_value(),
                "deals": list.visible(),
            }))
        }
        Command::Contact(raw_id) => {
            let mut detail = ContactDetail::from_route(services, &raw_id)?;
            detail.load().await?;
            Ok(json!({
                "contact": detail.contact(),
                "deals": detail.deals(),
                "activities": detail.activities(),
                "totalDealValue": detail.total_deal_value(),
            }))
        }
        Command::Deal(raw_id) => {
            let mut detail = DealDetail::from_route(services, &raw_id)?;
            detail.load().await?;
            Ok(json!({
                "deal": detail.deal(),
                "contact": detail.contact(),
            }))
        }
    }
}

fn print_error(err: &CrmError) {
    let payload = ErrorPayload::from(err);
    match serde_json::to_string_pretty(&payload) {
        Ok(body) => eprintln!("{}", body),
        Err(_) => eprintln!("{}", err),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (demo, command) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::from(2);
        }
    };

    let state = match AppState::new(demo) {
        Ok(state) => state,
        Err(e) => {
            print_error(&CrmError::Configuration(e));
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&state, command)) {
        Ok(snapshot) => match serde_json::to_string_pretty(&snapshot) {
            Ok(body) => {
                println!("{}", body);
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("Failed to serialize snapshot: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}
