use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use propline::entity_db::{self, SqliteEntitySource};
use propline::entity_store::EntityStore;
use propline::model::{EntitySet, GameStatus, Subject};
use propline::report::Reporter;
use propline::resolver::{Resolver, SubjectAttrs};

fn seed() -> EntitySet {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/seed.json");
    let raw = fs::read_to_string(path).expect("seed fixture");
    serde_json::from_str(&raw).expect("seed json")
}

fn temp_db(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "propline-{name}-{}.sqlite",
        std::process::id()
    ));
    for suffix in ["", "-wal", "-shm"] {
        let _ = fs::remove_file(format!("{}{suffix}", path.display()));
    }
    path
}

#[test]
fn seed_import_is_idempotent() {
    let mut conn = rusqlite::Connection::open_in_memory().expect("db");
    entity_db::init_schema(&conn).expect("schema");

    let first = entity_db::import_set(&mut conn, &seed()).expect("import");
    assert_eq!(first.teams, 5);
    assert_eq!(first.team_aliases, 2);
    assert_eq!(first.subjects, 6);
    assert_eq!(first.team_changes, 0);
    assert_eq!(first.games, 2);

    let second = entity_db::import_set(&mut conn, &seed()).expect("reimport");
    assert_eq!(second.team_aliases, 0);
    assert_eq!(second.team_changes, 0);

    let loaded = entity_db::load_set(&conn).expect("load");
    assert_eq!(loaded.subjects.len(), 6);
    assert_eq!(loaded.markets.len(), 3);
    let gsw = loaded.teams.iter().find(|t| t.id == "t-gsw").expect("gsw");
    assert_eq!(gsw.aliases.len(), 1);
}

#[test]
fn team_moves_are_logged_not_overwritten() {
    let conn = rusqlite::Connection::open_in_memory().expect("db");
    entity_db::init_schema(&conn).expect("schema");
    let mut brunson = Subject {
        id: "s6".to_string(),
        name: "Jalen Brunson".to_string(),
        league: "NBA".to_string(),
        team: Some("DAL".to_string()),
        position: Some("G".to_string()),
        jersey_number: Some(13),
    };
    assert!(entity_db::upsert_subject(&conn, &brunson).expect("insert").is_none());

    brunson.team = Some("nyk".to_string());
    brunson.jersey_number = Some(11);
    let change = entity_db::upsert_subject(&conn, &brunson)
        .expect("move")
        .expect("change event");
    assert_eq!(change.old_team.as_deref(), Some("DAL"));
    assert_eq!(change.new_team.as_deref(), Some("NYK"));

    let history = entity_db::team_changes(&conn, "s6").expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], change);
}

#[test]
fn games_with_one_team_twice_are_rejected() {
    let conn = rusqlite::Connection::open_in_memory().expect("db");
    entity_db::init_schema(&conn).expect("schema");
    let mut game = seed().games.remove(0);
    game.away_team = game.home_team.clone();
    assert!(entity_db::upsert_game(&conn, &game).is_err());
}

#[test]
fn completed_games_can_be_listed_and_dropped() {
    let mut conn = rusqlite::Connection::open_in_memory().expect("db");
    entity_db::init_schema(&conn).expect("schema");
    entity_db::import_set(&mut conn, &seed()).expect("import");

    assert!(entity_db::completed_game_ids(&conn).expect("completed").is_empty());
    assert!(entity_db::set_game_status(&conn, "g1", GameStatus::Completed).expect("status"));
    assert!(!entity_db::set_game_status(&conn, "g9", GameStatus::Completed).expect("status"));
    assert_eq!(
        entity_db::completed_game_ids(&conn).expect("completed"),
        vec!["g1".to_string()]
    );

    assert_eq!(entity_db::delete_games(&mut conn, &["g1".to_string()]).expect("delete"), 1);
    let loaded = entity_db::load_set(&conn).expect("load");
    assert_eq!(loaded.games.len(), 1);
    assert_eq!(loaded.games[0].id, "g2");
}

#[test]
fn store_refresh_picks_up_curation_writes() {
    let path = temp_db("refresh");
    {
        let mut conn = entity_db::open_db(&path).expect("open");
        entity_db::import_set(&mut conn, &seed()).expect("import");
    }
    let source = SqliteEntitySource::new(entity_db::open_db(&path).expect("reader"));
    let store = Arc::new(EntityStore::open(Box::new(source)).expect("initial load"));
    let resolver = Resolver::new(Arc::clone(&store), Arc::new(Reporter::default()));

    assert!(resolver.resolve_team("book", "NBA", "Suns").is_none());

    let writer = entity_db::open_db(&path).expect("writer");
    assert!(entity_db::add_team_alias(&writer, "NBA", "Suns", "t-phx").expect("alias"));
    let mut rookie = seed().subjects.remove(0);
    rookie.id = "s7".to_string();
    rookie.name = "Cooper Flagg".to_string();
    rookie.team = Some("PHX".to_string());
    entity_db::upsert_subject(&writer, &rookie).expect("rookie");

    // Subject-only refresh sees the rookie but not the alias.
    assert!(store.refresh_subjects());
    assert!(resolver
        .resolve_subject("book", "NBA", "Cooper Flagg", &SubjectAttrs::default())
        .is_some());
    assert!(resolver.resolve_team("book", "NBA", "Suns").is_none());

    assert!(store.refresh());
    let suns = resolver.resolve_team("book", "NBA", "Suns").expect("alias after refresh");
    assert_eq!(suns.id, "t-phx");

    drop(writer);
    let _ = fs::remove_file(&path);
}
