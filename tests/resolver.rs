use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use propline::entity_store::EntityStore;
use propline::game::GameResolver;
use propline::model::{EntityKind, EntitySet, Game, GameStatus};
use propline::report::Reporter;
use propline::resolver::{Resolver, SubjectAttrs};

fn seed() -> EntitySet {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/seed.json");
    let raw = fs::read_to_string(path).expect("seed fixture");
    serde_json::from_str(&raw).expect("seed json")
}

fn resolver() -> Resolver {
    Resolver::new(
        Arc::new(EntityStore::from_set(seed())),
        Arc::new(Reporter::new(["espn-schedule"])),
    )
}

#[test]
fn same_input_same_store_same_answer() {
    let r = resolver();
    let attrs = SubjectAttrs::team("LAL");
    let first = r
        .resolve_subject("cbssports-nba", "NBA", "LeBron James", &attrs)
        .expect("first");
    let second = r
        .resolve_subject("cbssports-nba", "NBA", "LeBron James", &attrs)
        .expect("second");
    assert_eq!(first, second);
    assert_eq!(first.id, "s2");
    assert_eq!(first.jersey_number, Some(23));
}

#[test]
fn shared_names_split_by_team() {
    let r = resolver();
    let suns = r
        .resolve_subject("draftkings", "NBA", "Marcus Morris", &SubjectAttrs::team("PHO"))
        .expect("suns");
    let knicks = r
        .resolve_subject("draftkings", "NBA", "Morris, Marcus", &SubjectAttrs::team("New York Knicks"))
        .expect("knicks");
    assert_eq!(suns.id, "s4");
    assert_eq!(knicks.id, "s3");

    // Without a team the lowest id wins, every time.
    let bare = r
        .resolve_subject("draftkings", "NBA", "Marcus Morris", &SubjectAttrs::default())
        .expect("bare");
    assert_eq!(bare.id, "s3");
}

#[test]
fn near_misses_stay_unresolved() {
    let r = resolver();
    let before = r.store().snapshot().counts();
    for raw in ["Jayson Tatom", "Jasyon Tatum", "LeBron Jame"] {
        assert!(
            r.resolve_subject("fanduel", "NBA", raw, &SubjectAttrs::default())
                .is_none(),
            "{raw} should not resolve"
        );
    }
    assert!(r
        .resolve_subject("fanduel", "NBA", "JAYSON  TATUM", &SubjectAttrs::default())
        .is_some());
    assert_eq!(r.reporter().problem_count(), 3);
    // Misses never mint entities.
    assert_eq!(r.store().snapshot().counts(), before);
}

#[test]
fn roster_and_schedule_written_with_team_aliases_still_join() {
    let mut set = seed();
    for subject in &mut set.subjects {
        if subject.id == "s4" {
            subject.team = Some("PHO".to_string());
        }
    }
    set.games.push(Game {
        id: "g3".to_string(),
        league: "NBA".to_string(),
        home_team: "PHO".to_string(),
        away_team: "Boston Celtics".to_string(),
        game_time: "2026-01-12T00:30:00Z".to_string(),
        info: "BOS @ PHX".to_string(),
        status: GameStatus::Scheduled,
    });
    let store = Arc::new(EntityStore::from_set(set));
    let reporter = Arc::new(Reporter::default());
    let r = Resolver::new(Arc::clone(&store), Arc::clone(&reporter));

    let suns = r
        .resolve_subject("book", "NBA", "Marcus Morris", &SubjectAttrs::team("PHX"))
        .expect("suns morris");
    assert_eq!(suns.id, "s4");
    assert_eq!(suns.team.as_deref(), Some("PHX"));

    let games = GameResolver::new(store, reporter);
    let game = games.find_game("book", "NBA", "PHX").expect("suns game");
    assert_eq!(game.id, "g3");
    assert_eq!((game.home_team.as_str(), game.away_team.as_str()), ("PHX", "BOS"));
}

#[test]
fn misses_are_tracked_per_source_and_counted() {
    let r = resolver();
    for _ in 0..3 {
        assert!(r
            .resolve_subject("fanduel", "NBA", "Victor Nobody", &SubjectAttrs::team("SAS"))
            .is_none());
    }
    assert!(r.resolve_team("fanduel", "NBA", "Seattle Supersonics").is_none());
    assert!(r.resolve_market("fanduel", "NBA", "Dunks", None).is_none());
    assert!(r.resolve_league("fanduel", "XBL").is_none());

    let problems = r.reporter().problems();
    assert_eq!(problems.len(), 4);
    let subject = problems
        .iter()
        .find(|(k, _)| k.kind == EntityKind::Subject)
        .expect("subject problem");
    assert_eq!(subject.0.source, "fanduel");
    assert_eq!(subject.1.count, 3);
    assert_eq!(subject.1.detail.as_deref(), Some("team=SAS"));
    assert!(problems.iter().any(|(k, _)| k.kind == EntityKind::Team));
    assert!(problems.iter().any(|(k, _)| k.kind == EntityKind::Market && k.name == "dunks"));
    assert!(problems.iter().any(|(k, _)| k.kind == EntityKind::League && k.name == "XBL"));
}

#[test]
fn reference_sources_do_not_show_up_as_relevant() {
    let r = resolver();
    r.resolve_subject("espn-schedule", "NBA", "Stephen Curry", &SubjectAttrs::default())
        .expect("curry");
    assert!(r.reporter().relevant().is_empty());

    r.resolve_subject("fanduel", "NBA", "Stephen Curry", &SubjectAttrs::default())
        .expect("curry");
    let relevant = r.reporter().relevant();
    assert_eq!(relevant.len(), 1);
    assert_eq!(relevant[0].1.entity_id.as_deref(), Some("s5"));
}

#[test]
fn reload_moves_scoped_lookups_with_the_roster() {
    let store = Arc::new(EntityStore::from_set(seed()));
    let r = Resolver::new(Arc::clone(&store), Arc::new(Reporter::default()));
    assert!(r
        .resolve_subject("book", "NBA", "Jalen Brunson", &SubjectAttrs::team("NYK"))
        .is_some_and(|s| s.team.as_deref() == Some("NYK")));

    let mut traded = seed();
    for subject in &mut traded.subjects {
        if subject.id == "s6" {
            subject.team = Some("BOS".to_string());
        }
    }
    store.load(traded);
    let hit = r
        .resolve_subject("book", "NBA", "Jalen Brunson", &SubjectAttrs::team("BOS"))
        .expect("after trade");
    assert_eq!(hit.id, "s6");
    assert_eq!(hit.team.as_deref(), Some("BOS"));
}

#[test]
fn period_markets_resolve_separately() {
    let r = resolver();
    let full = r.resolve_market("book", "NBA", "Points", None).expect("full game");
    let first_quarter = r
        .resolve_market("book", "NBA", "1Q Points", None)
        .expect("first quarter");
    let explicit = r
        .resolve_market("book", "NBA", "Points", Some("1st Quarter"))
        .expect("explicit period");
    assert_eq!(full.id, "m1");
    assert_eq!(first_quarter.id, "m3");
    assert_eq!(explicit.id, "m3");
    assert!(r.resolve_market("book", "NBA", "2H Points", None).is_none());
}
