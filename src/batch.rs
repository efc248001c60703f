use std::collections::HashSet;

use crate::stream::LineObservation;

#[derive(Debug, Default)]
pub struct Batch {
    batch_timestamp: i64,
    observations: Vec<LineObservation>,
    seen: HashSet<String>,
    duplicates: usize,
    reporting_bookmakers: HashSet<String>,
}

impl Batch {
    pub fn new(batch_timestamp: i64) -> Self {
        Self {
            batch_timestamp,
            ..Self::default()
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.batch_timestamp
    }

    pub fn record(&mut self, obs: LineObservation) -> bool {
        if !self.seen.insert(obs.key.clone()) {
            self.duplicates += 1;
            return false;
        }
        self.observations.push(obs);
        true
    }

    pub fn mark_reporting(&mut self, bookmaker: &str) {
        self.reporting_bookmakers.insert(bookmaker.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn observations(&self) -> &[LineObservation] {
        &self.observations
    }

    pub fn reporting_bookmakers(&self) -> &HashSet<String> {
        &self.reporting_bookmakers
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
