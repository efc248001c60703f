use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use propline::adapters::{CollectionAdapter, RawOutcome, RawProposition, ReplayAdapter};
use propline::collector::{Collector, Standardizer};
use propline::entity_store::EntityStore;
use propline::line_db::{ChangeStreamStore, LineRepository, MemoryLineRepository};
use propline::model::{EntityKind, EntitySet};
use propline::report::Reporter;
use propline::stream::{LineState, MarketDomain};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn seed() -> EntitySet {
    let raw = fs::read_to_string(fixture("seed.json")).expect("seed fixture");
    serde_json::from_str(&raw).expect("seed json")
}

/// Hands out one scripted response per fetch; `None` is a failed fetch.
struct ScriptedAdapter {
    name: String,
    script: Mutex<VecDeque<Option<Vec<RawProposition>>>>,
}

impl ScriptedAdapter {
    fn new(name: &str, script: Vec<Option<Vec<RawProposition>>>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
        }
    }
}

impl CollectionAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Vec<RawProposition>> {
        let next = self
            .script
            .lock()
            .map_err(|_| anyhow!("script poisoned"))?
            .pop_front()
            .flatten();
        next.ok_or_else(|| anyhow!("{} unavailable", self.name))
    }
}

fn tatum(over: f64, under: f64) -> RawProposition {
    RawProposition {
        league: "NBA".to_string(),
        subject: Some("Jayson Tatum".to_string()),
        team: Some("BOS".to_string()),
        position: None,
        market: "Points".to_string(),
        period: None,
        line: 27.5,
        outcomes: vec![
            RawOutcome {
                label: "Over".to_string(),
                odds: over,
            },
            RawOutcome {
                label: "Under".to_string(),
                odds: under,
            },
        ],
        metrics: Default::default(),
        collected_at: None,
    }
}

fn collector(adapters: Vec<Box<dyn CollectionAdapter>>) -> (Collector, Arc<Reporter>) {
    let store = Arc::new(EntityStore::from_set(seed()));
    let reporter = Arc::new(Reporter::new(["schedule"]));
    let standardizer = Standardizer::new(store, Arc::clone(&reporter));
    (Collector::new(adapters, standardizer, 2), reporter)
}

#[test]
fn tatum_points_over_under_lands_on_two_keyed_lines() {
    let adapter = ScriptedAdapter::new("PrizePicks", vec![Some(vec![tatum(1.87, 1.95)])]);
    let (collector, _) = collector(vec![Box::new(adapter)]);
    let mut lines = ChangeStreamStore::new(MemoryLineRepository::new());

    let summary = collector.run_batch(&mut lines, 1_000);
    assert_eq!(summary.adapters_ok, 1);
    assert_eq!(summary.observations, 2);
    assert_eq!(summary.commit.created, 2);

    let over = lines
        .get("PrizePicks:NBA:s1:m1:Over:27.5")
        .expect("get")
        .expect("over line");
    let under = lines
        .get("PrizePicks:NBA:s1:m1:Under:27.5")
        .expect("get")
        .expect("under line");
    assert_eq!(over.game.as_ref().map(|g| g.id.as_str()), Some("g1"));
    assert_eq!(under.game.as_ref().map(|g| g.id.as_str()), Some("g1"));
    assert_eq!(over.current(), Some((27.5, 1.87)));
    assert_eq!(under.current(), Some((27.5, 1.95)));
    assert_eq!(over.stream[0].batch_timestamp, 1_000);
    assert_eq!(over.subject.name, "Jayson Tatum");
    assert_eq!(over.market_domain, MarketDomain::PlayerProps);
}

#[test]
fn repeated_and_moving_boards_across_batches() {
    let adapter = ScriptedAdapter::new(
        "PrizePicks",
        vec![
            Some(vec![tatum(1.87, 1.95)]),
            Some(vec![tatum(1.87, 1.95)]),
            Some(vec![tatum(1.80, 2.02)]),
            Some(Vec::new()),
        ],
    );
    let (collector, _) = collector(vec![Box::new(adapter)]);
    let mut lines = ChangeStreamStore::new(MemoryLineRepository::new());

    assert_eq!(collector.run_batch(&mut lines, 1).commit.created, 2);
    assert_eq!(collector.run_batch(&mut lines, 2).commit.unchanged, 2);
    assert_eq!(collector.run_batch(&mut lines, 3).commit.appended, 2);
    assert_eq!(collector.run_batch(&mut lines, 4).commit.gapped, 2);

    let over = lines
        .get("PrizePicks:NBA:s1:m1:Over:27.5")
        .expect("get")
        .expect("over line");
    let timestamps: Vec<i64> = over.stream.iter().map(|r| r.batch_timestamp).collect();
    assert_eq!(timestamps, vec![1, 3, 4]);
    assert_eq!(over.state(), LineState::Gapped);
}

#[test]
fn a_failing_adapter_only_costs_its_own_lines() {
    let good = ScriptedAdapter::new(
        "PrizePicks",
        vec![Some(vec![tatum(1.87, 1.95)]), Some(vec![tatum(1.87, 1.95)])],
    );
    let flaky = ScriptedAdapter::new("Underdog", vec![Some(vec![tatum(1.91, 1.91)]), None]);
    let (collector, _) = collector(vec![Box::new(good), Box::new(flaky)]);
    let mut lines = ChangeStreamStore::new(MemoryLineRepository::new());

    assert_eq!(collector.run_batch(&mut lines, 1).commit.created, 4);
    let second = collector.run_batch(&mut lines, 2);
    assert_eq!(second.adapters_ok, 1);
    assert_eq!(second.adapter_failures.len(), 1);
    assert_eq!(second.adapter_failures[0].adapter, "Underdog");
    assert_eq!(second.commit.unchanged, 2);
    assert_eq!(second.commit.gapped, 0);

    let underdog = lines
        .get("Underdog:NBA:s1:m1:Over:27.5")
        .expect("get")
        .expect("underdog line");
    assert_eq!(underdog.state(), LineState::Active);
    assert_eq!(underdog.stream.len(), 1);
}

#[test]
fn replayed_board_resolves_what_it_can_and_reports_the_rest() {
    let adapter = ReplayAdapter::new("PrizePicks", fixture("prizepicks.jsonl"));
    let (collector, reporter) = collector(vec![Box::new(adapter)]);
    let mut lines = ChangeStreamStore::new(MemoryLineRepository::new());

    let summary = collector.run_batch(&mut lines, 1_767_990_000);
    assert_eq!(summary.propositions, 5);
    assert_eq!(summary.unresolved, 1);
    assert_eq!(summary.observations, 7);
    assert_eq!(summary.commit.created, 7);
    assert_eq!(lines.repository().count().expect("count"), 7);

    let tatum = lines
        .get("PrizePicks:NBA:s1:m1:Over:27.5")
        .expect("get")
        .expect("tatum");
    assert_eq!(tatum.stream[0].collection_timestamp, Some(1_767_988_800));

    let lebron = lines
        .get("PrizePicks:NBA:s2:m2:Under:7.5")
        .expect("get")
        .expect("lebron rebounds");
    assert_eq!(lebron.label, "Under");
    assert_eq!(lebron.game.as_ref().map(|g| g.id.as_str()), Some("g2"));

    let curry = lines
        .get("PrizePicks:NBA:s5:m3:Over:8.5")
        .expect("get")
        .expect("curry first quarter");
    assert_eq!(curry.subject.team.as_deref(), Some("GSW"));

    let knicks = lines
        .get("PrizePicks:NBA:t-nyk:m1:Over:112.5")
        .expect("get")
        .expect("team total");
    assert_eq!(knicks.market_domain, MarketDomain::TeamProps);
    assert_eq!(knicks.game.as_ref().map(|g| g.id.as_str()), Some("g1"));

    let problems = reporter.problems();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].0.kind, EntityKind::Subject);
    assert_eq!(problems[0].0.source, "PrizePicks");
    assert_eq!(problems[0].0.name, "victor nobody");

    // Same file again: nothing moves.
    let again = collector.run_batch(&mut lines, 1_767_990_060);
    assert_eq!(again.commit.unchanged, 7);
    assert_eq!(again.commit.written, 0);
    assert_eq!(reporter.problems()[0].1.count, 2);
}
