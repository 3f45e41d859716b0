//! The six fixed pipeline stages.
//!
//! Order matters: it drives column order on the board, the progress bar
//! fraction, and the key order of per-stage aggregates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Lead,
    Qualified,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Lead,
        Stage::Qualified,
        Stage::Proposal,
        Stage::Negotiation,
        Stage::Won,
        Stage::Lost,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Lead => "Lead",
            Stage::Qualified => "Qualified",
            Stage::Proposal => "Proposal",
            Stage::Negotiation => "Negotiation",
            Stage::Won => "Won",
            Stage::Lost => "Lost",
        }
    }

    /// Win probability (percent) a deal gets when it is moved into this stage.
    pub fn default_probability(&self) -> u8 {
        match self {
            Stage::Lead => 30,
            Stage::Qualified => 60,
            Stage::Proposal => 75,
            Stage::Negotiation => 85,
            Stage::Won => 100,
            Stage::Lost => 0,
        }
    }

    pub fn ordinal(&self) -> usize {
        match self {
            Stage::Lead => 0,
            Stage::Qualified => 1,
            Stage::Proposal => 2,
            Stage::Negotiation => 3,
            Stage::Won => 4,
            Stage::Lost => 5,
        }
    }

    /// Fraction of the progress bar to fill: `(ordinal + 1) / 6`.
    pub fn progress(&self) -> f64 {
        (self.ordinal() + 1) as f64 / Self::ALL.len() as f64
    }

    /// Won and Lost close a deal in the UI. Nothing stops a later move out.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Won | Stage::Lost)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}
