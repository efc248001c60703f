use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use propline::adapters::{RawProposition, over_under};
use propline::batch::Batch;
use propline::collector::Standardizer;
use propline::entity_store::EntityStore;
use propline::line_db::{ChangeStreamStore, MemoryLineRepository};
use propline::model::{EntitySet, Game, GameStatus, Market, Subject, Team};
use propline::report::Reporter;
use propline::resolver::{Resolver, SubjectAttrs};

const FIRST: &[&str] = &[
    "james", "michael", "chris", "anthony", "kevin", "jalen", "tyler", "marcus", "devin", "josh",
    "kyle", "jordan", "brandon", "cameron", "derrick", "isaiah", "malik", "zach", "luka", "nikola",
];
const LAST: &[&str] = &[
    "smith", "johnson", "williams", "brown", "jones", "miller", "davis", "garcia", "wilson",
    "anderson", "thomas", "taylor", "moore", "jackson", "martin", "lee", "thompson", "white",
    "harris", "clark", "lewis", "walker", "young", "allen", "king",
];

fn synthetic_set(subjects: usize) -> EntitySet {
    let teams: Vec<Team> = (0..30)
        .map(|i| Team {
            id: format!("t{i}"),
            league: "NBA".to_string(),
            abbr_name: format!("T{i:02}"),
            full_name: format!("Team {i}"),
            aliases: Vec::new(),
        })
        .collect();
    let subjects = (0..subjects)
        .map(|i| Subject {
            id: format!("s{i:05}"),
            name: format!(
                "{} {} {}",
                FIRST[i % FIRST.len()],
                LAST[(i / FIRST.len()) % LAST.len()],
                i / (FIRST.len() * LAST.len())
            ),
            league: "NBA".to_string(),
            team: Some(format!("T{:02}", i % 30)),
            position: None,
            jersey_number: None,
        })
        .collect();
    let games = (0..15)
        .map(|i| Game {
            id: format!("g{i}"),
            league: "NBA".to_string(),
            home_team: format!("T{:02}", i * 2),
            away_team: format!("T{:02}", i * 2 + 1),
            game_time: "2026-01-10T00:30:00Z".to_string(),
            info: String::new(),
            status: GameStatus::Scheduled,
        })
        .collect();
    EntitySet {
        teams,
        subjects,
        markets: vec![Market {
            id: "m1".to_string(),
            name: "Points".to_string(),
            sport: "Basketball".to_string(),
            period: None,
        }],
        games,
        ..EntitySet::default()
    }
}

fn bench_resolve(c: &mut Criterion) {
    let store = Arc::new(EntityStore::from_set(synthetic_set(5_000)));
    let resolver = Resolver::new(Arc::clone(&store), Arc::new(Reporter::default()));
    let attrs = SubjectAttrs::team("T07");

    c.bench_function("resolve_subject_scoped", |b| {
        b.iter(|| {
            let hit = resolver.resolve_subject("bench", "NBA", black_box("Jordan Smith 0"), &attrs);
            black_box(hit)
        })
    });

    c.bench_function("resolve_subject_fuzzy_miss", |b| {
        b.iter(|| {
            let hit = resolver.resolve_subject(
                "bench",
                "NBA",
                black_box("Jordna Smith 0"),
                &SubjectAttrs::default(),
            );
            black_box(hit)
        })
    });
}

fn bench_commit(c: &mut Criterion) {
    let store = Arc::new(EntityStore::from_set(synthetic_set(5_000)));
    let standardizer = Standardizer::new(store, Arc::new(Reporter::default()));
    let props: Vec<RawProposition> = (0..500)
        .map(|i| RawProposition {
            league: "NBA".to_string(),
            subject: Some(format!(
                "{} {} 0",
                FIRST[i % FIRST.len()],
                LAST[(i / FIRST.len()) % LAST.len()]
            )),
            team: None,
            position: None,
            market: "Points".to_string(),
            period: None,
            line: 10.5 + (i % 20) as f64,
            outcomes: over_under(1.9),
            metrics: Default::default(),
            collected_at: None,
        })
        .collect();

    c.bench_function("commit_unchanged_batch_1000_lines", |b| {
        let mut lines = ChangeStreamStore::new(MemoryLineRepository::new());
        let mut ts = 0;
        b.iter(|| {
            ts += 1;
            let mut batch = Batch::new(ts);
            batch.mark_reporting("bench");
            for prop in &props {
                if let Ok(observations) = standardizer.standardize("bench", prop, ts) {
                    for obs in observations {
                        batch.record(obs);
                    }
                }
            }
            black_box(lines.commit_batch(&batch).map(|s| s.written))
        })
    });
}

criterion_group!(benches, bench_resolve, bench_commit);
criterion_main!(benches);
