use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::adapters::{CollectionAdapter, RawProposition};
use crate::batch::Batch;
use crate::entity_store::EntityStore;
use crate::game::GameResolver;
use crate::line_db::{ChangeStreamStore, CommitSummary, LineRepository};
use crate::line_key::{build_key, normalize_label};
use crate::report::Reporter;
use crate::resolver::{Resolver, SubjectAttrs};
use crate::stream::{GameRef, LineObservation, LineSubject, MarketDomain, MarketRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    MissingName,
    League,
    Subject,
    Team,
    Market,
    NoGame,
    Invalid,
}

pub struct Standardizer {
    resolver: Resolver,
    games: GameResolver,
}

impl Standardizer {
    pub fn new(store: Arc<EntityStore>, reporter: Arc<Reporter>) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&store), Arc::clone(&reporter)),
            games: GameResolver::new(store, reporter),
        }
    }

    pub fn standardize(
        &self,
        source: &str,
        prop: &RawProposition,
        collected_at: i64,
    ) -> Result<Vec<LineObservation>, Skip> {
        if !prop.line.is_finite() {
            return Err(Skip::Invalid);
        }
        let league = self
            .resolver
            .resolve_league(source, &prop.league)
            .ok_or(Skip::League)?;

        let subject_name = prop.subject.as_deref().filter(|s| !s.trim().is_empty());
        let (subject, domain) = match (subject_name, prop.team.as_deref()) {
            (Some(name), _) => {
                let attrs = SubjectAttrs {
                    team: prop.team.clone(),
                    position: prop.position.clone(),
                };
                let hit = self
                    .resolver
                    .resolve_subject(source, &league.code, name, &attrs)
                    .ok_or(Skip::Subject)?;
                let subject = LineSubject {
                    id: hit.id,
                    name: hit.name,
                    team: hit.team,
                };
                (subject, MarketDomain::PlayerProps)
            }
            (None, Some(team)) => {
                let hit = self
                    .resolver
                    .resolve_team(source, &league.code, team)
                    .ok_or(Skip::Team)?;
                let name = if hit.full_name.is_empty() {
                    hit.abbr_name.clone()
                } else {
                    hit.full_name
                };
                let subject = LineSubject {
                    id: hit.id,
                    name,
                    team: Some(hit.abbr_name),
                };
                (subject, MarketDomain::TeamProps)
            }
            (None, None) => return Err(Skip::MissingName),
        };

        let market = self
            .resolver
            .resolve_market(source, &league.code, &prop.market, prop.period.as_deref())
            .ok_or(Skip::Market)?;

        let team = subject.team.as_deref().ok_or(Skip::NoGame)?;
        let game = self
            .games
            .find_game(source, &league.code, team)
            .ok_or(Skip::NoGame)?;
        let game = GameRef {
            id: game.id,
            game_time: game.game_time,
            info: game.info,
        };

        let collection_timestamp = prop.collected_at.unwrap_or(collected_at);
        let observations: Vec<LineObservation> = prop
            .outcomes
            .iter()
            .filter(|o| o.odds.is_finite())
            .map(|outcome| {
                let label = normalize_label(&outcome.label);
                LineObservation {
                    key: build_key(source, &league.code, &subject.id, &market.id, &label, prop.line),
                    bookmaker: source.to_string(),
                    league: league.code.clone(),
                    market: MarketRef {
                        id: market.id.clone(),
                        name: market.name.clone(),
                    },
                    market_domain: domain,
                    subject: subject.clone(),
                    game: Some(game.clone()),
                    label,
                    line: prop.line,
                    odds: outcome.odds,
                    collection_timestamp,
                    metrics: prop.metrics.clone(),
                }
            })
            .collect();
        if observations.is_empty() {
            return Err(Skip::Invalid);
        }
        Ok(observations)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterFailure {
    pub adapter: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub batch_ts: i64,
    pub adapters_ok: usize,
    pub adapter_failures: Vec<AdapterFailure>,
    pub propositions: usize,
    pub observations: usize,
    pub duplicates: usize,
    pub unresolved: usize,
    pub no_game: usize,
    pub invalid: usize,
    pub commit: CommitSummary,
    pub commit_error: Option<String>,
}

impl BatchSummary {
    fn log(&self) {
        info!(
            batch_ts = self.batch_ts,
            adapters_ok = self.adapters_ok,
            adapters_failed = self.adapter_failures.len(),
            propositions = self.propositions,
            lines = self.observations,
            unresolved = self.unresolved,
            no_game = self.no_game,
            invalid = self.invalid,
            duplicates = self.duplicates,
            created = self.commit.created,
            appended = self.commit.appended,
            unchanged = self.commit.unchanged,
            gapped = self.commit.gapped,
            write_failures = self.commit.failures.len(),
            "batch complete"
        );
    }

    fn count_skip(&mut self, skip: Skip) {
        match skip {
            Skip::NoGame => self.no_game += 1,
            Skip::Invalid => self.invalid += 1,
            Skip::MissingName | Skip::League | Skip::Subject | Skip::Team | Skip::Market => {
                self.unresolved += 1
            }
        }
    }
}

struct AdapterRun {
    name: String,
    result: anyhow::Result<Vec<RawProposition>>,
    collected_at: i64,
}

pub struct Collector {
    adapters: Vec<Box<dyn CollectionAdapter>>,
    standardizer: Standardizer,
    pool: Option<rayon::ThreadPool>,
}

impl Collector {
    pub fn new(
        adapters: Vec<Box<dyn CollectionAdapter>>,
        standardizer: Standardizer,
        parallelism: usize,
    ) -> Self {
        Self {
            adapters,
            standardizer,
            pool: build_fetch_pool(parallelism),
        }
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// A failing adapter only removes its own lines from the batch.
    pub fn run_batch<R: LineRepository>(
        &self,
        lines: &mut ChangeStreamStore<R>,
        batch_ts: i64,
    ) -> BatchSummary {
        let runs: Vec<(AdapterRun, Vec<Result<Vec<LineObservation>, Skip>>)> =
            with_fetch_pool(&self.pool, || {
                self.adapters
                    .par_iter()
                    .map(|adapter| {
                        let run = AdapterRun {
                            name: adapter.name().to_string(),
                            result: adapter.fetch(),
                            collected_at: Utc::now().timestamp(),
                        };
                        let standardized = match run.result.as_ref() {
                            Ok(props) => props
                                .iter()
                                .map(|p| self.standardizer.standardize(&run.name, p, run.collected_at))
                                .collect(),
                            Err(_) => Vec::new(),
                        };
                        (run, standardized)
                    })
                    .collect()
            });

        let mut summary = BatchSummary {
            batch_ts,
            ..BatchSummary::default()
        };
        let mut batch = Batch::new(batch_ts);
        for (run, standardized) in runs {
            if let Err(err) = run.result {
                warn!(adapter = %run.name, error = %format!("{err:#}"), "adapter failed");
                summary.adapter_failures.push(AdapterFailure {
                    adapter: run.name,
                    error: format!("{err:#}"),
                });
                continue;
            }
            summary.adapters_ok += 1;
            batch.mark_reporting(&run.name);
            summary.propositions += standardized.len();
            for outcome in standardized {
                match outcome {
                    Ok(observations) => {
                        for obs in observations {
                            batch.record(obs);
                        }
                    }
                    Err(skip) => summary.count_skip(skip),
                }
            }
        }
        summary.observations = batch.len();
        summary.duplicates = batch.duplicates();

        match lines.commit_batch(&batch) {
            Ok(commit) => summary.commit = commit,
            Err(err) => {
                warn!(batch_ts, error = %err, "batch commit failed");
                summary.commit_error = Some(err.to_string());
            }
        }
        summary.log();
        summary
    }
}

fn build_fetch_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|idx| format!("propline-fetch-{idx}"))
        .build()
        .ok()
}

fn with_fetch_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}

#[cfg(test)]
mod tests {
    use super::{Skip, Standardizer};
    use crate::adapters::{RawProposition, over_under};
    use crate::entity_store::EntityStore;
    use crate::model::{EntitySet, Game, GameStatus, Market, Subject, Team};
    use crate::report::Reporter;
    use std::sync::Arc;

    fn standardizer() -> Standardizer {
        let set = EntitySet {
            teams: vec![Team {
                id: "t1".to_string(),
                league: "NBA".to_string(),
                abbr_name: "BOS".to_string(),
                full_name: "Boston Celtics".to_string(),
                aliases: Vec::new(),
            }],
            subjects: vec![
                Subject {
                    id: "s1".to_string(),
                    name: "Jayson Tatum".to_string(),
                    league: "NBA".to_string(),
                    team: Some("BOS".to_string()),
                    position: None,
                    jersey_number: Some(0),
                },
                Subject {
                    id: "s2".to_string(),
                    name: "Free Agent".to_string(),
                    league: "NBA".to_string(),
                    team: None,
                    position: None,
                    jersey_number: None,
                },
            ],
            markets: vec![Market {
                id: "m1".to_string(),
                name: "Points".to_string(),
                sport: "Basketball".to_string(),
                period: None,
            }],
            games: vec![Game {
                id: "g1".to_string(),
                league: "NBA".to_string(),
                home_team: "NYK".to_string(),
                away_team: "BOS".to_string(),
                game_time: "2026-01-10T00:30:00Z".to_string(),
                info: "BOS @ NYK".to_string(),
                status: GameStatus::Scheduled,
            }],
            ..EntitySet::default()
        };
        Standardizer::new(
            Arc::new(EntityStore::from_set(set)),
            Arc::new(Reporter::new(["schedule"])),
        )
    }

    fn prop(subject: Option<&str>, team: Option<&str>, market: &str) -> RawProposition {
        RawProposition {
            league: "NBA".to_string(),
            subject: subject.map(str::to_string),
            team: team.map(str::to_string),
            position: None,
            market: market.to_string(),
            period: None,
            line: 27.5,
            outcomes: over_under(1.9),
            metrics: Default::default(),
            collected_at: None,
        }
    }

    #[test]
    fn team_props_key_on_team_id() {
        let lines = standardizer()
            .standardize("Book", &prop(None, Some("Boston Celtics"), "Points"), 10)
            .expect("team prop");
        assert_eq!(lines[0].key, "Book:NBA:t1:m1:Over:27.5");
        assert_eq!(lines[0].subject.team.as_deref(), Some("BOS"));
    }

    #[test]
    fn each_miss_maps_to_its_skip_reason() {
        let s = standardizer();
        assert_eq!(s.standardize("Book", &prop(None, None, "Points"), 0), Err(Skip::MissingName));
        assert_eq!(s.standardize("Book", &prop(Some("Nobody Here"), None, "Points"), 0), Err(Skip::Subject));
        assert_eq!(s.standardize("Book", &prop(Some("Jayson Tatum"), None, "Dunks"), 0), Err(Skip::Market));
        assert_eq!(s.standardize("Book", &prop(Some("Free Agent"), None, "Points"), 0), Err(Skip::NoGame));
        let mut bad = prop(Some("Jayson Tatum"), None, "Points");
        bad.league = "ZZZ".to_string();
        assert_eq!(s.standardize("Book", &bad, 0), Err(Skip::League));
        bad = prop(Some("Jayson Tatum"), None, "Points");
        bad.line = f64::NAN;
        assert_eq!(s.standardize("Book", &bad, 0), Err(Skip::Invalid));
    }
}
