use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;

use propline::config::{self, Config};
use propline::entity_db;
use propline::line_db::{ChangeStreamStore, LineRepository, LiveStat, SqliteLineRepository};
use propline::logging;

#[derive(Debug, Deserialize)]
struct StatRow {
    game_id: String,
    subject_id: String,
    market_id: String,
    value: f64,
}

/// Finalizes lines of completed games, exports them, then drops the games.
///
/// `archive_lines [--db PATH] [--out DIR] [--stats FILE.json]`
fn main() -> Result<()> {
    config::load_dotenv();
    logging::init_tracing();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = Config::from_env()?;

    let db_path = arg_value(&args, "--db").map(PathBuf::from).unwrap_or(cfg.db_path);
    let out_dir = arg_value(&args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.report_dir.join("archive"));

    let mut entity_conn = entity_db::open_db(&db_path)?;
    let lines_conn = entity_db::open_db(&db_path)?;
    let mut lines = ChangeStreamStore::new(SqliteLineRepository::new(lines_conn)?);

    if let Some(stats_path) = arg_value(&args, "--stats") {
        let raw = fs::read_to_string(&stats_path)
            .with_context(|| format!("read stats {stats_path}"))?;
        let rows: Vec<StatRow> = serde_json::from_str(&raw).context("parse stats file")?;
        let mut by_game: BTreeMap<String, Vec<LiveStat>> = BTreeMap::new();
        for row in rows {
            by_game.entry(row.game_id).or_default().push(LiveStat {
                subject_id: row.subject_id,
                market_id: row.market_id,
                value: row.value,
            });
        }
        for (game_id, stats) in by_game {
            let updated = lines.record_live_stats(&game_id, &stats)?;
            println!("game {game_id}: live stats on {updated} lines");
        }
    }

    let completed = entity_db::completed_game_ids(&entity_conn)?;
    let mut finalized = 0;
    for game_id in &completed {
        finalized += lines.finalize_game(game_id)?;
    }

    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let path = out_dir.join(format!("finalized-{stamp}.jsonl"));
    let archived = lines.archive_finalized(&path)?;

    let mut removable = Vec::new();
    for game_id in completed {
        if lines.repository().for_game(&game_id)?.is_empty() {
            removable.push(game_id);
        }
    }
    let removed = entity_db::delete_games(&mut entity_conn, &removable)?;

    println!("Archive complete");
    println!("Finalized lines: {finalized}");
    if archived > 0 {
        println!("Archived lines: {archived} -> {}", path.display());
    } else {
        println!("Archived lines: 0");
    }
    println!("Completed games removed: {removed}");
    Ok(())
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
