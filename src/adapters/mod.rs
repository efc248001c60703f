mod json_feed;
mod replay;

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use json_feed::{JsonFeedAdapter, parse_projections};
pub use replay::{ReplayAdapter, parse_replay};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutcome {
    pub label: String,
    pub odds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProposition {
    pub league: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    pub market: String,
    #[serde(default)]
    pub period: Option<String>,
    pub line: f64,
    pub outcomes: Vec<RawOutcome>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub collected_at: Option<i64>,
}

pub fn over_under(odds: f64) -> Vec<RawOutcome> {
    ["Over", "Under"]
        .into_iter()
        .map(|label| RawOutcome {
            label: label.to_string(),
            odds,
        })
        .collect()
}

pub trait CollectionAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// An error drops this adapter from the batch.
    fn fetch(&self) -> Result<Vec<RawProposition>>;
}
