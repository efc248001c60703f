use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::info;

use crate::clean::{clean_league, clean_team};
use crate::entity_store::EntitySource;
use crate::error::StoreResult;
use crate::model::{EntitySet, Game, GameStatus, League, Market, Subject, Team};

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("enable wal")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS leagues (
            code TEXT PRIMARY KEY,
            sport TEXT NOT NULL,
            aliases_json TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS teams (
            id TEXT PRIMARY KEY,
            league TEXT NOT NULL,
            abbr_name TEXT NOT NULL,
            full_name TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_teams_league ON teams(league);

        CREATE TABLE IF NOT EXISTS team_aliases (
            league TEXT NOT NULL,
            alias TEXT NOT NULL,
            team_id TEXT NOT NULL,
            PRIMARY KEY (league, alias)
        );

        CREATE TABLE IF NOT EXISTS subjects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            league TEXT NOT NULL,
            team TEXT NULL,
            position TEXT NULL,
            jersey_number INTEGER NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subjects_league ON subjects(league);

        CREATE TABLE IF NOT EXISTS subject_team_changes (
            change_id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id TEXT NOT NULL,
            old_team TEXT NULL,
            new_team TEXT NULL,
            changed_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_team_changes_subject ON subject_team_changes(subject_id);

        CREATE TABLE IF NOT EXISTS markets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sport TEXT NOT NULL,
            period TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS games (
            id TEXT PRIMARY KEY,
            league TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            game_time TEXT NOT NULL,
            info TEXT NOT NULL,
            status TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_status ON games(status);
        "#,
    )
    .context("create entity schema")?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub leagues: usize,
    pub teams: usize,
    pub team_aliases: usize,
    pub subjects: usize,
    pub team_changes: usize,
    pub markets: usize,
    pub games: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamChange {
    pub subject_id: String,
    pub old_team: Option<String>,
    pub new_team: Option<String>,
    pub changed_at: String,
}

pub fn import_set(conn: &mut Connection, set: &EntitySet) -> Result<ImportSummary> {
    let tx = conn.transaction().context("begin import transaction")?;
    let mut summary = ImportSummary::default();

    for league in &set.leagues {
        upsert_league(&tx, league)?;
        summary.leagues += 1;
    }
    for team in &set.teams {
        upsert_team(&tx, team)?;
        summary.teams += 1;
        for alias in &team.aliases {
            if add_team_alias(&tx, &team.league, alias, &team.id)? {
                summary.team_aliases += 1;
            }
        }
    }
    for subject in &set.subjects {
        if upsert_subject(&tx, subject)?.is_some() {
            summary.team_changes += 1;
        }
        summary.subjects += 1;
    }
    for market in &set.markets {
        upsert_market(&tx, market)?;
        summary.markets += 1;
    }
    for game in &set.games {
        upsert_game(&tx, game)?;
        summary.games += 1;
    }

    tx.commit().context("commit import transaction")?;
    info!(
        leagues = summary.leagues,
        teams = summary.teams,
        subjects = summary.subjects,
        team_changes = summary.team_changes,
        markets = summary.markets,
        games = summary.games,
        "entity import finished"
    );
    Ok(summary)
}

pub fn upsert_league(conn: &Connection, league: &League) -> Result<()> {
    let aliases = serde_json::to_string(&league.aliases).context("serialize league aliases")?;
    conn.execute(
        r#"
        INSERT INTO leagues (code, sport, aliases_json) VALUES (?1, ?2, ?3)
        ON CONFLICT(code) DO UPDATE SET
            sport = excluded.sport,
            aliases_json = excluded.aliases_json
        "#,
        params![clean_league(&league.code), league.sport, aliases],
    )
    .context("upsert league")?;
    Ok(())
}

pub fn upsert_team(conn: &Connection, team: &Team) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO teams (id, league, abbr_name, full_name) VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET
            league = excluded.league,
            abbr_name = excluded.abbr_name,
            full_name = excluded.full_name
        "#,
        params![
            team.id,
            clean_league(&team.league),
            team.abbr_name.trim().to_ascii_uppercase(),
            team.full_name,
        ],
    )
    .context("upsert team")?;
    Ok(())
}

/// False when the alias already maps to this team; an error when it maps to another.
pub fn add_team_alias(conn: &Connection, league: &str, alias: &str, team_id: &str) -> Result<bool> {
    let league = clean_league(league);
    let key = clean_team(alias, &league);
    if key.is_empty() {
        return Err(anyhow!("team alias {alias:?} cleans to nothing"));
    }
    let existing: Option<String> = conn
        .query_row(
            "SELECT team_id FROM team_aliases WHERE league = ?1 AND alias = ?2",
            params![league, key],
            |row| row.get(0),
        )
        .optional()
        .context("query team alias")?;
    match existing {
        Some(current) if current == team_id => Ok(false),
        Some(current) => Err(anyhow!(
            "alias {key:?} in {league} already maps to team {current}"
        )),
        None => {
            conn.execute(
                "INSERT INTO team_aliases (league, alias, team_id) VALUES (?1, ?2, ?3)",
                params![league, key, team_id],
            )
            .context("insert team alias")?;
            Ok(true)
        }
    }
}

/// A team move is recorded in `subject_team_changes` and returned.
pub fn upsert_subject(conn: &Connection, subject: &Subject) -> Result<Option<TeamChange>> {
    let league = clean_league(&subject.league);
    let new_team = match subject.team.as_deref() {
        Some(raw) => Some(team_abbr(conn, &league, raw)?).filter(|t| !t.is_empty()),
        None => None,
    };
    let previous: Option<Option<String>> = conn
        .query_row(
            "SELECT team FROM subjects WHERE id = ?1",
            params![subject.id],
            |row| row.get(0),
        )
        .optional()
        .context("query subject team")?;

    let now = Utc::now().to_rfc3339();
    let change = match previous {
        Some(old_team) if old_team != new_team => Some(TeamChange {
            subject_id: subject.id.clone(),
            old_team,
            new_team: new_team.clone(),
            changed_at: now.clone(),
        }),
        _ => None,
    };
    if let Some(change) = change.as_ref() {
        conn.execute(
            r#"
            INSERT INTO subject_team_changes (subject_id, old_team, new_team, changed_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![change.subject_id, change.old_team, change.new_team, change.changed_at],
        )
        .context("record team change")?;
        info!(
            subject = %subject.id,
            from = change.old_team.as_deref().unwrap_or("-"),
            to = change.new_team.as_deref().unwrap_or("-"),
            "subject changed team"
        );
    }

    conn.execute(
        r#"
        INSERT INTO subjects (id, name, league, team, position, jersey_number, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            league = excluded.league,
            team = excluded.team,
            position = excluded.position,
            jersey_number = excluded.jersey_number,
            updated_at = excluded.updated_at
        "#,
        params![
            subject.id,
            subject.name,
            league,
            new_team,
            subject.position,
            subject.jersey_number,
            now,
        ],
    )
    .context("upsert subject")?;
    Ok(change)
}

pub fn team_changes(conn: &Connection, subject_id: &str) -> Result<Vec<TeamChange>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT subject_id, old_team, new_team, changed_at
            FROM subject_team_changes
            WHERE subject_id = ?1
            ORDER BY change_id ASC
            "#,
        )
        .context("prepare team change query")?;
    let rows = stmt
        .query_map(params![subject_id], |row| {
            Ok(TeamChange {
                subject_id: row.get(0)?,
                old_team: row.get(1)?,
                new_team: row.get(2)?,
                changed_at: row.get(3)?,
            })
        })
        .context("query team changes")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode team change row")?);
    }
    Ok(out)
}

pub fn upsert_market(conn: &Connection, market: &Market) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO markets (id, name, sport, period) VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            sport = excluded.sport,
            period = excluded.period
        "#,
        params![market.id, market.name, market.sport, market.period],
    )
    .context("upsert market")?;
    Ok(())
}

pub fn upsert_game(conn: &Connection, game: &Game) -> Result<()> {
    let league = clean_league(&game.league);
    let home = team_abbr(conn, &league, &game.home_team)?;
    let away = team_abbr(conn, &league, &game.away_team)?;
    if home == away {
        return Err(anyhow!("game {} lists {home} on both sides", game.id));
    }
    conn.execute(
        r#"
        INSERT INTO games (id, league, home_team, away_team, game_time, info, status)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            league = excluded.league,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            game_time = excluded.game_time,
            info = excluded.info,
            status = excluded.status
        "#,
        params![
            game.id,
            league,
            home,
            away,
            game.game_time,
            game.info,
            game.status.as_str(),
        ],
    )
    .context("upsert game")?;
    Ok(())
}

/// Abbreviation of the stored team `raw` names, or `raw` upper-cased when none does.
fn team_abbr(conn: &Connection, league: &str, raw: &str) -> Result<String> {
    let fallback = raw.trim().to_ascii_uppercase();
    let key = clean_team(raw, league);
    if key.is_empty() {
        return Ok(fallback);
    }
    let aliased: Option<String> = conn
        .query_row(
            r#"
            SELECT t.abbr_name FROM team_aliases a
            JOIN teams t ON t.id = a.team_id
            WHERE a.league = ?1 AND a.alias = ?2
            "#,
            params![league, key],
            |row| row.get(0),
        )
        .optional()
        .context("query team alias")?;
    if let Some(abbr) = aliased {
        return Ok(abbr);
    }

    let mut stmt = conn
        .prepare("SELECT abbr_name, full_name FROM teams WHERE league = ?1 ORDER BY id")
        .context("prepare team name query")?;
    let rows = stmt
        .query_map(params![league], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .context("query team names")?;
    for row in rows {
        let (abbr, full_name) = row.context("decode team name row")?;
        if clean_team(&abbr, league) == key || clean_team(&full_name, league) == key {
            return Ok(abbr);
        }
    }
    Ok(fallback)
}

pub fn set_game_status(conn: &Connection, game_id: &str, status: GameStatus) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE games SET status = ?2 WHERE id = ?1",
            params![game_id, status.as_str()],
        )
        .context("update game status")?;
    Ok(changed > 0)
}

pub fn completed_game_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM games WHERE status = ?1 ORDER BY id")
        .context("prepare completed games query")?;
    let rows = stmt
        .query_map(params![GameStatus::Completed.as_str()], |row| row.get(0))
        .context("query completed games")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode game id")?);
    }
    Ok(out)
}

pub fn delete_games(conn: &mut Connection, ids: &[String]) -> Result<usize> {
    let tx = conn.transaction().context("begin delete transaction")?;
    let mut removed = 0;
    for id in ids {
        removed += tx
            .execute("DELETE FROM games WHERE id = ?1", params![id])
            .context("delete game")?;
    }
    tx.commit().context("commit delete transaction")?;
    Ok(removed)
}

pub fn load_set(conn: &Connection) -> StoreResult<EntitySet> {
    Ok(EntitySet {
        leagues: load_leagues(conn)?,
        teams: load_teams(conn)?,
        subjects: load_subjects(conn)?,
        markets: load_markets(conn)?,
        games: load_games(conn)?,
    })
}

fn load_leagues(conn: &Connection) -> StoreResult<Vec<League>> {
    let mut stmt = conn.prepare("SELECT code, sport, aliases_json FROM leagues")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (code, sport, aliases) = row?;
        out.push(League {
            code,
            sport,
            aliases: serde_json::from_str(&aliases)?,
        });
    }
    Ok(out)
}

fn load_teams(conn: &Connection) -> StoreResult<Vec<Team>> {
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    {
        let mut stmt = conn.prepare("SELECT team_id, alias FROM team_aliases ORDER BY alias")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (team_id, alias) = row?;
            aliases.entry(team_id).or_default().push(alias);
        }
    }

    let mut stmt = conn.prepare("SELECT id, league, abbr_name, full_name FROM teams")?;
    let rows = stmt.query_map([], |row| {
        Ok(Team {
            id: row.get(0)?,
            league: row.get(1)?,
            abbr_name: row.get(2)?,
            full_name: row.get(3)?,
            aliases: Vec::new(),
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        let mut team = row?;
        team.aliases = aliases.remove(&team.id).unwrap_or_default();
        out.push(team);
    }
    Ok(out)
}

pub fn load_subjects(conn: &Connection) -> StoreResult<Vec<Subject>> {
    let mut stmt =
        conn.prepare("SELECT id, name, league, team, position, jersey_number FROM subjects")?;
    let rows = stmt.query_map([], |row| {
        Ok(Subject {
            id: row.get(0)?,
            name: row.get(1)?,
            league: row.get(2)?,
            team: row.get(3)?,
            position: row.get(4)?,
            jersey_number: row.get(5)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn load_markets(conn: &Connection) -> StoreResult<Vec<Market>> {
    let mut stmt = conn.prepare("SELECT id, name, sport, period FROM markets")?;
    let rows = stmt.query_map([], |row| {
        Ok(Market {
            id: row.get(0)?,
            name: row.get(1)?,
            sport: row.get(2)?,
            period: row.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn load_games(conn: &Connection) -> StoreResult<Vec<Game>> {
    let mut stmt =
        conn.prepare("SELECT id, league, home_team, away_team, game_time, info, status FROM games")?;
    let rows = stmt.query_map([], |row| {
        let status: String = row.get(6)?;
        Ok(Game {
            id: row.get(0)?,
            league: row.get(1)?,
            home_team: row.get(2)?,
            away_team: row.get(3)?,
            game_time: row.get(4)?,
            info: row.get(5)?,
            status: GameStatus::parse(&status).unwrap_or_default(),
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub struct SqliteEntitySource {
    conn: Mutex<Connection>,
}

impl SqliteEntitySource {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl EntitySource for SqliteEntitySource {
    fn load_all(&self) -> StoreResult<EntitySet> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        load_set(&conn)
    }

    fn load_subjects(&self) -> StoreResult<Vec<Subject>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        load_subjects(&conn)
    }
}
