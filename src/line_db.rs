use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use crate::batch::Batch;
use crate::error::{StoreError, StoreResult};
use crate::stream::{LineDocument, LineState, Transition, apply_gap, apply_observation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub key: String,
    pub reason: String,
}

/// One failing document write never fails the rest of the batch.
pub trait LineRepository: Send {
    fn get_many(&self, keys: &[&str]) -> StoreResult<HashMap<String, LineDocument>>;
    /// Keys of these bookmakers' active lines, sorted.
    fn active_keys(&self, bookmakers: &HashSet<String>) -> StoreResult<Vec<String>>;
    fn for_game(&self, game_id: &str) -> StoreResult<Vec<LineDocument>>;
    fn finalized(&self) -> StoreResult<Vec<LineDocument>>;
    fn write_batch(&mut self, docs: &[LineDocument]) -> Vec<WriteFailure>;
    fn delete(&mut self, keys: &[String]) -> StoreResult<usize>;
    fn count(&self) -> StoreResult<usize>;

    fn get(&self, key: &str) -> StoreResult<Option<LineDocument>> {
        Ok(self.get_many(&[key])?.remove(key))
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS betting_lines (
            key TEXT PRIMARY KEY,
            bookmaker TEXT NOT NULL,
            league TEXT NOT NULL,
            game_id TEXT NULL,
            state TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            doc_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_lines_bookmaker_state ON betting_lines(bookmaker, state);
        CREATE INDEX IF NOT EXISTS idx_lines_game ON betting_lines(game_id);
        "#,
    )
    .context("create betting line schema")?;
    Ok(())
}

pub struct SqliteLineRepository {
    conn: Connection,
}

impl SqliteLineRepository {
    pub fn new(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite")?;
        Self::new(conn)
    }

    fn query_docs(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> StoreResult<Vec<LineDocument>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(args, |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str::<LineDocument>(&row?)?);
        }
        Ok(out)
    }
}

impl LineRepository for SqliteLineRepository {
    fn get_many(&self, keys: &[&str]) -> StoreResult<HashMap<String, LineDocument>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT doc_json FROM betting_lines WHERE key = ?1")?;
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            let raw: Option<String> = stmt
                .query_row(params![key], |row| row.get(0))
                .optional()?;
            if let Some(raw) = raw {
                let doc: LineDocument = serde_json::from_str(&raw)?;
                out.insert(doc.key.clone(), doc);
            }
        }
        Ok(out)
    }

    fn active_keys(&self, bookmakers: &HashSet<String>) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key FROM betting_lines WHERE bookmaker = ?1 AND state = ?2")?;
        let mut out = Vec::new();
        for bookmaker in bookmakers {
            let rows = stmt.query_map(params![bookmaker, LineState::Active.as_str()], |row| {
                row.get::<_, String>(0)
            })?;
            for row in rows {
                out.push(row?);
            }
        }
        out.sort();
        Ok(out)
    }

    fn for_game(&self, game_id: &str) -> StoreResult<Vec<LineDocument>> {
        self.query_docs(
            "SELECT doc_json FROM betting_lines WHERE game_id = ?1 ORDER BY key",
            params![game_id],
        )
    }

    fn finalized(&self) -> StoreResult<Vec<LineDocument>> {
        self.query_docs(
            "SELECT doc_json FROM betting_lines WHERE state = ?1 ORDER BY key",
            params![LineState::Finalized.as_str()],
        )
    }

    fn write_batch(&mut self, docs: &[LineDocument]) -> Vec<WriteFailure> {
        if docs.is_empty() {
            return Vec::new();
        }
        let fail_all = |reason: String| {
            docs.iter()
                .map(|d| WriteFailure {
                    key: d.key.clone(),
                    reason: reason.clone(),
                })
                .collect::<Vec<_>>()
        };
        let tx = match self.conn.transaction() {
            Ok(tx) => tx,
            Err(err) => return fail_all(format!("begin transaction: {err}")),
        };

        let now = Utc::now().to_rfc3339();
        let mut failures = Vec::new();
        for doc in docs {
            if let Err(err) = upsert_line(&tx, doc, &now) {
                failures.push(WriteFailure {
                    key: doc.key.clone(),
                    reason: err.to_string(),
                });
            }
        }
        if let Err(err) = tx.commit() {
            return fail_all(format!("commit: {err}"));
        }
        failures
    }

    fn delete(&mut self, keys: &[String]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM betting_lines WHERE key = ?1")?;
            for key in keys {
                removed += stmt.execute(params![key])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn count(&self) -> StoreResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM betting_lines", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }
}

fn upsert_line(tx: &rusqlite::Transaction<'_>, doc: &LineDocument, now: &str) -> StoreResult<()> {
    let json = serde_json::to_string(doc)?;
    tx.execute(
        r#"
        INSERT INTO betting_lines (key, bookmaker, league, game_id, state, updated_at, doc_json)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(key) DO UPDATE SET
            bookmaker = excluded.bookmaker,
            league = excluded.league,
            game_id = excluded.game_id,
            state = excluded.state,
            updated_at = excluded.updated_at,
            doc_json = excluded.doc_json
        "#,
        params![
            doc.key,
            doc.bookmaker,
            doc.league,
            doc.game.as_ref().map(|g| g.id.as_str()),
            doc.state().as_str(),
            now,
            json,
        ],
    )?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryLineRepository {
    docs: HashMap<String, LineDocument>,
    rejected: HashSet<String>,
}

impl MemoryLineRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later write of `key` fail.
    pub fn reject_writes_for(&mut self, key: impl Into<String>) {
        self.rejected.insert(key.into());
    }

    fn sorted(&self, keep: impl Fn(&LineDocument) -> bool) -> Vec<LineDocument> {
        let mut out: Vec<LineDocument> = self.docs.values().filter(|d| keep(*d)).cloned().collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }
}

impl LineRepository for MemoryLineRepository {
    fn get_many(&self, keys: &[&str]) -> StoreResult<HashMap<String, LineDocument>> {
        Ok(keys
            .iter()
            .filter_map(|k| self.docs.get(*k).map(|d| (d.key.clone(), d.clone())))
            .collect())
    }

    fn active_keys(&self, bookmakers: &HashSet<String>) -> StoreResult<Vec<String>> {
        Ok(self
            .sorted(|d| bookmakers.contains(&d.bookmaker) && d.state() == LineState::Active)
            .into_iter()
            .map(|d| d.key)
            .collect())
    }

    fn for_game(&self, game_id: &str) -> StoreResult<Vec<LineDocument>> {
        Ok(self.sorted(|d| d.game.as_ref().is_some_and(|g| g.id == game_id)))
    }

    fn finalized(&self) -> StoreResult<Vec<LineDocument>> {
        Ok(self.sorted(|d| d.finalized))
    }

    fn write_batch(&mut self, docs: &[LineDocument]) -> Vec<WriteFailure> {
        let mut failures = Vec::new();
        for doc in docs {
            if self.rejected.contains(&doc.key) {
                failures.push(WriteFailure {
                    key: doc.key.clone(),
                    reason: StoreError::WriteFailed {
                        key: doc.key.clone(),
                        reason: "rejected".to_string(),
                    }
                    .to_string(),
                });
                continue;
            }
            self.docs.insert(doc.key.clone(), doc.clone());
        }
        failures
    }

    fn delete(&mut self, keys: &[String]) -> StoreResult<usize> {
        Ok(keys.iter().filter(|k| self.docs.remove(*k).is_some()).count())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.docs.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub created: usize,
    pub appended: usize,
    pub refreshed: usize,
    pub unchanged: usize,
    pub gapped: usize,
    pub already_gapped: usize,
    pub frozen: usize,
    pub stale: usize,
    pub written: usize,
    pub failures: Vec<WriteFailure>,
}

impl CommitSummary {
    fn tally(&mut self, transition: Transition) {
        let slot = match transition {
            Transition::Created => &mut self.created,
            Transition::Appended => &mut self.appended,
            Transition::Refreshed => &mut self.refreshed,
            Transition::Unchanged => &mut self.unchanged,
            Transition::Gapped => &mut self.gapped,
            Transition::AlreadyGapped => &mut self.already_gapped,
            Transition::Frozen => &mut self.frozen,
            Transition::Stale => &mut self.stale,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveStat {
    pub subject_id: String,
    pub market_id: String,
    pub value: f64,
}

pub struct ChangeStreamStore<R> {
    repo: R,
}

impl<R: LineRepository> ChangeStreamStore<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<LineDocument>> {
        self.repo.get(key)
    }

    /// Gaps active lines of reporting bookmakers that the batch did not see.
    pub fn commit_batch(&mut self, batch: &Batch) -> StoreResult<CommitSummary> {
        let batch_ts = batch.timestamp();
        let keys: Vec<&str> = batch.observations().iter().map(|o| o.key.as_str()).collect();
        let mut existing = self.repo.get_many(&keys)?;
        let mut summary = CommitSummary::default();
        let mut pending = Vec::new();

        for obs in batch.observations() {
            let (doc, transition) = apply_observation(existing.remove(&obs.key), obs, batch_ts);
            if transition == Transition::Stale {
                warn!(key = %obs.key, batch_ts, "observation older than stream head, ignored");
            }
            summary.tally(transition);
            if transition.needs_write() {
                pending.push(doc);
            }
        }

        if !batch.reporting_bookmakers().is_empty() {
            let active = self.repo.active_keys(batch.reporting_bookmakers())?;
            let missing: Vec<&str> = active
                .iter()
                .map(String::as_str)
                .filter(|key| !batch.contains(key))
                .collect();
            let mut gapped = self.repo.get_many(&missing)?;
            for key in missing {
                let Some(mut doc) = gapped.remove(key) else {
                    continue;
                };
                let transition = apply_gap(&mut doc, batch_ts);
                summary.tally(transition);
                if transition.needs_write() {
                    pending.push(doc);
                }
            }
        }

        summary.failures = self.write(&pending);
        summary.written = pending.len() - summary.failures.len();
        Ok(summary)
    }

    pub fn record_live_stats(&mut self, game_id: &str, stats: &[LiveStat]) -> StoreResult<usize> {
        let by_line: HashMap<(&str, &str), f64> = stats
            .iter()
            .map(|s| ((s.subject_id.as_str(), s.market_id.as_str()), s.value))
            .collect();
        let mut pending = Vec::new();
        for mut doc in self.repo.for_game(game_id)? {
            if doc.finalized {
                continue;
            }
            let Some(value) = by_line
                .get(&(doc.subject.id.as_str(), doc.market.id.as_str()))
                .copied()
            else {
                continue;
            };
            if doc.live_stat != Some(value) {
                doc.live_stat = Some(value);
                pending.push(doc);
            }
        }
        let failures = self.write(&pending);
        Ok(pending.len() - failures.len())
    }

    /// Freezes every line of a completed game. Returns how many were finalized.
    pub fn finalize_game(&mut self, game_id: &str) -> StoreResult<usize> {
        let mut pending = Vec::new();
        for mut doc in self.repo.for_game(game_id)? {
            if doc.finalize() {
                pending.push(doc);
            }
        }
        let failures = self.write(&pending);
        let finalized = pending.len() - failures.len();
        if finalized > 0 {
            info!(game_id, lines = finalized, "game finalized");
        }
        Ok(finalized)
    }

    /// Exports finalized lines to `path` as JSON lines, then deletes them.
    pub fn archive_finalized(&mut self, path: &Path) -> Result<usize> {
        let docs = self.repo.finalized().context("load finalized lines")?;
        if docs.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create archive dir {}", parent.display()))?;
        }
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut file =
                fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
            for doc in &docs {
                let line = serde_json::to_string(doc).context("serialize archived line")?;
                writeln!(file, "{line}").context("write archived line")?;
            }
            file.sync_all().context("flush archive")?;
        }
        fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;

        let keys: Vec<String> = docs.into_iter().map(|d| d.key).collect();
        let removed = self.repo.delete(&keys).context("purge archived lines")?;
        info!(archived = keys.len(), removed, path = %path.display(), "finalized lines archived");
        Ok(keys.len())
    }

    fn write(&mut self, docs: &[LineDocument]) -> Vec<WriteFailure> {
        let failures = self.repo.write_batch(docs);
        for failure in &failures {
            warn!(key = %failure.key, reason = %failure.reason, "line write failed");
        }
        failures
    }
}
