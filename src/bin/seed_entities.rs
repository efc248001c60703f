use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use propline::config::{self, Config};
use propline::entity_db;
use propline::logging;
use propline::model::{EntitySet, GameStatus};

/// Curation write path.
///
/// `seed_entities [--db PATH] [--alias LEAGUE:ALIAS:TEAM_ID]... [--game-status GAME_ID=STATUS]... [SEED.json]...`
fn main() -> Result<()> {
    config::load_dotenv();
    logging::init_tracing();
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    let db_path = match parse_db_path_arg(&args) {
        Some(path) => path,
        None => Config::from_env()?.db_path,
    };
    let mut conn = entity_db::open_db(&db_path)?;

    for path in seed_files(&args) {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read seed {}", path.display()))?;
        let set: EntitySet = serde_json::from_str(&raw)
            .with_context(|| format!("parse seed {}", path.display()))?;
        let summary = entity_db::import_set(&mut conn, &set)?;
        println!(
            "{}: leagues={} teams={} aliases={} subjects={} team_changes={} markets={} games={}",
            path.display(),
            summary.leagues,
            summary.teams,
            summary.team_aliases,
            summary.subjects,
            summary.team_changes,
            summary.markets,
            summary.games
        );
    }

    for raw in flag_values(&args, "--alias") {
        let parts = raw.splitn(3, ':').collect::<Vec<_>>();
        let [league, alias, team_id] = parts.as_slice() else {
            return Err(anyhow!("--alias expects LEAGUE:ALIAS:TEAM_ID, got {raw:?}"));
        };
        let added = entity_db::add_team_alias(&conn, league, alias, team_id)?;
        println!(
            "alias {alias} -> {team_id} ({league}): {}",
            if added { "added" } else { "already present" }
        );
    }

    for raw in flag_values(&args, "--game-status") {
        let (game_id, status) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("--game-status expects GAME_ID=STATUS, got {raw:?}"))?;
        let status = GameStatus::parse(status)
            .ok_or_else(|| anyhow!("unknown game status {status:?}"))?;
        let found = entity_db::set_game_status(&conn, game_id, status)?;
        println!(
            "game {game_id}: {}",
            if found { status.as_str() } else { "not found" }
        );
    }

    Ok(())
}

fn parse_db_path_arg(args: &[String]) -> Option<PathBuf> {
    flag_values(args, "--db")
        .into_iter()
        .next()
        .map(PathBuf::from)
}

/// Values of `--flag VALUE` and `--flag=VALUE`, in order.
fn flag_values(args: &[String], flag: &str) -> Vec<String> {
    let mut out = Vec::new();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            if !value.trim().is_empty() {
                out.push(value.trim().to_string());
            }
        } else if arg == flag {
            if let Some(next) = args.get(idx + 1) {
                if !next.trim().is_empty() {
                    out.push(next.trim().to_string());
                }
            }
        }
    }
    out
}

/// Positional arguments, i.e. anything that is neither a flag nor a flag's value.
fn seed_files(args: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with("--") {
            skip_next = !arg.contains('=');
            continue;
        }
        out.push(PathBuf::from(arg));
    }
    out
}
