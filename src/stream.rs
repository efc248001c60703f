use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub batch_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odds: Option<f64>,
}

impl StreamRecord {
    pub fn observed(batch_timestamp: i64, collection_timestamp: i64, line: f64, odds: f64) -> Self {
        Self {
            batch_timestamp,
            collection_timestamp: Some(collection_timestamp),
            line: Some(line),
            odds: Some(odds),
        }
    }

    /// Marks the batch in which the line was no longer offered.
    pub fn sentinel(batch_timestamp: i64) -> Self {
        Self {
            batch_timestamp,
            collection_timestamp: None,
            line: None,
            odds: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.line.is_none() && self.odds.is_none()
    }

    fn same_values(&self, line: f64, odds: f64) -> bool {
        self.line == Some(line) && self.odds == Some(odds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSubject {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRef {
    pub id: String,
    pub game_time: String,
    pub info: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketDomain {
    PlayerProps,
    TeamProps,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineObservation {
    pub key: String,
    pub bookmaker: String,
    pub league: String,
    pub market: MarketRef,
    pub market_domain: MarketDomain,
    pub subject: LineSubject,
    pub game: Option<GameRef>,
    pub label: String,
    pub line: f64,
    pub odds: f64,
    pub collection_timestamp: i64,
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDocument {
    #[serde(rename = "_id")]
    pub key: String,
    pub bookmaker: String,
    pub league: String,
    pub market: MarketRef,
    pub market_domain: MarketDomain,
    pub subject: LineSubject,
    #[serde(default)]
    pub game: Option<GameRef>,
    pub label: String,
    pub stream: Vec<StreamRecord>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_stat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_stat: Option<f64>,
    #[serde(default)]
    pub finalized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Absent,
    Active,
    Gapped,
    Finalized,
}

impl LineState {
    pub fn as_str(self) -> &'static str {
        match self {
            LineState::Absent => "absent",
            LineState::Active => "active",
            LineState::Gapped => "gapped",
            LineState::Finalized => "finalized",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Created,
    Appended,
    Refreshed,
    Unchanged,
    Gapped,
    AlreadyGapped,
    Frozen,
    /// Batch timestamp older than the stream head; ignored.
    Stale,
}

impl Transition {
    pub fn needs_write(self) -> bool {
        matches!(
            self,
            Transition::Created | Transition::Appended | Transition::Refreshed | Transition::Gapped
        )
    }
}

impl LineDocument {
    pub fn from_observation(obs: &LineObservation, batch_timestamp: i64) -> Self {
        Self {
            key: obs.key.clone(),
            bookmaker: obs.bookmaker.clone(),
            league: obs.league.clone(),
            market: obs.market.clone(),
            market_domain: obs.market_domain,
            subject: obs.subject.clone(),
            game: obs.game.clone(),
            label: obs.label.clone(),
            stream: vec![StreamRecord::observed(
                batch_timestamp,
                obs.collection_timestamp,
                obs.line,
                obs.odds,
            )],
            metrics: obs.metrics.clone(),
            live_stat: None,
            final_stat: None,
            finalized: false,
        }
    }

    /// State as recorded in the stream. A gapped line that came back with unchanged
    /// values keeps its sentinel as the head record, so it still reads as `Gapped`.
    pub fn state(&self) -> LineState {
        if self.finalized {
            return LineState::Finalized;
        }
        match self.stream.last() {
            None => LineState::Absent,
            Some(last) if last.is_sentinel() => LineState::Gapped,
            Some(_) => LineState::Active,
        }
    }

    pub fn last_record(&self) -> Option<&StreamRecord> {
        self.stream.iter().rev().find(|r| !r.is_sentinel())
    }

    pub fn current(&self) -> Option<(f64, f64)> {
        match self.stream.last() {
            Some(StreamRecord {
                line: Some(line),
                odds: Some(odds),
                ..
            }) => Some((*line, *odds)),
            _ => None,
        }
    }

    pub fn observe(&mut self, obs: &LineObservation, batch_timestamp: i64) -> Transition {
        if self.finalized {
            return Transition::Frozen;
        }
        if self
            .stream
            .last()
            .is_some_and(|head| batch_timestamp < head.batch_timestamp)
        {
            return Transition::Stale;
        }

        let unchanged = self
            .last_record()
            .is_some_and(|last| last.same_values(obs.line, obs.odds));
        let refreshed = self.refresh_metadata(obs);
        if unchanged {
            return if refreshed {
                Transition::Refreshed
            } else {
                Transition::Unchanged
            };
        }
        self.stream.push(StreamRecord::observed(
            batch_timestamp,
            obs.collection_timestamp,
            obs.line,
            obs.odds,
        ));
        Transition::Appended
    }

    pub fn mark_missing(&mut self, batch_timestamp: i64) -> Transition {
        if self.finalized {
            return Transition::Frozen;
        }
        match self.stream.last() {
            None => Transition::Unchanged,
            Some(head) if head.is_sentinel() => Transition::AlreadyGapped,
            Some(head) if batch_timestamp < head.batch_timestamp => Transition::Stale,
            Some(_) => {
                self.stream.push(StreamRecord::sentinel(batch_timestamp));
                Transition::Gapped
            }
        }
    }

    /// Freezes the document, moving any live statistic into `final_stat`.
    pub fn finalize(&mut self) -> bool {
        if self.finalized {
            return false;
        }
        if let Some(stat) = self.live_stat.take() {
            self.final_stat = Some(stat);
        }
        self.finalized = true;
        true
    }

    fn refresh_metadata(&mut self, obs: &LineObservation) -> bool {
        let mut changed = false;
        if obs.game.is_some() && self.game != obs.game {
            self.game = obs.game.clone();
            changed = true;
        }
        if !obs.metrics.is_empty() && self.metrics != obs.metrics {
            self.metrics = obs.metrics.clone();
            changed = true;
        }
        changed
    }
}

pub fn apply_observation(
    existing: Option<LineDocument>,
    obs: &LineObservation,
    batch_timestamp: i64,
) -> (LineDocument, Transition) {
    match existing {
        None => (
            LineDocument::from_observation(obs, batch_timestamp),
            Transition::Created,
        ),
        Some(mut doc) => {
            let transition = doc.observe(obs, batch_timestamp);
            (doc, transition)
        }
    }
}

pub fn apply_gap(doc: &mut LineDocument, batch_timestamp: i64) -> Transition {
    doc.mark_missing(batch_timestamp)
}
