use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::model::EntityKind;

pub const PROBLEM_REPORT: &str = "problem_entities";
pub const RELEVANT_REPORT: &str = "relevant_entities";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReportKey {
    pub kind: EntityKind,
    pub source: String,
    pub league: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub kind: EntityKind,
    pub league: String,
    pub name: String,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub last_seen: i64,
}

#[derive(Debug, Serialize)]
struct ReportFile<'a> {
    generated_at: i64,
    sources: BTreeMap<&'a str, Vec<&'a ReportEntry>>,
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub problems: PathBuf,
    pub relevant: PathBuf,
    pub problem_entries: usize,
    pub relevant_entries: usize,
}

type Table = HashMap<ReportKey, ReportEntry>;

/// Unresolved names and the entities live feeds actually referenced.
#[derive(Debug, Default)]
pub struct Reporter {
    reference_sources: HashSet<String>,
    problems: Mutex<Table>,
    relevant: Mutex<Table>,
}

impl Reporter {
    pub fn new<I, S>(reference_sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            reference_sources: reference_sources
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            problems: Mutex::new(HashMap::new()),
            relevant: Mutex::new(HashMap::new()),
        }
    }

    /// Authoritative schedule/roster feeds; their lookups are not curation signal.
    pub fn is_reference(&self, source: &str) -> bool {
        self.reference_sources
            .contains(&source.trim().to_ascii_lowercase())
    }

    pub fn record_problem(
        &self,
        kind: EntityKind,
        source: &str,
        league: &str,
        name: &str,
        detail: Option<String>,
    ) {
        debug!(kind = kind.as_str(), source, league, name, "unresolved entity");
        bump(&self.problems, kind, source, league, name, None, detail);
    }

    pub fn record_relevant(
        &self,
        kind: EntityKind,
        source: &str,
        league: &str,
        name: &str,
        entity_id: &str,
    ) -> bool {
        if self.is_reference(source) {
            return false;
        }
        bump(
            &self.relevant,
            kind,
            source,
            league,
            name,
            Some(entity_id.to_string()),
            None,
        );
        true
    }

    pub fn problems(&self) -> Vec<(ReportKey, ReportEntry)> {
        sorted(&self.problems)
    }

    pub fn relevant(&self) -> Vec<(ReportKey, ReportEntry)> {
        sorted(&self.relevant)
    }

    pub fn problem_count(&self) -> usize {
        lock(&self.problems).len()
    }

    pub fn reset(&self) {
        lock(&self.problems).clear();
        lock(&self.relevant).clear();
    }

    pub fn flush(&self, dir: &Path) -> Result<ReportPaths> {
        self.flush_at(dir, Utc::now().timestamp())
    }

    /// Writes both reports under names stamped with `generated_at`, then clears the tables.
    pub fn flush_at(&self, dir: &Path, generated_at: i64) -> Result<ReportPaths> {
        fs::create_dir_all(dir).with_context(|| format!("create report dir {}", dir.display()))?;

        let problems = self.problems();
        let relevant = self.relevant();
        let problems_path = dir.join(report_file_name(PROBLEM_REPORT, generated_at));
        let relevant_path = dir.join(report_file_name(RELEVANT_REPORT, generated_at));
        write_report(&problems_path, generated_at, &problems)?;
        write_report(&relevant_path, generated_at, &relevant)?;

        info!(
            problems = problems.len(),
            relevant = relevant.len(),
            dir = %dir.display(),
            "curation reports written"
        );
        self.reset();
        Ok(ReportPaths {
            problems: problems_path,
            relevant: relevant_path,
            problem_entries: problems.len(),
            relevant_entries: relevant.len(),
        })
    }
}

fn bump(
    table: &Mutex<Table>,
    kind: EntityKind,
    source: &str,
    league: &str,
    name: &str,
    entity_id: Option<String>,
    detail: Option<String>,
) {
    let key = ReportKey {
        kind,
        source: source.to_string(),
        league: league.to_string(),
        name: name.to_string(),
    };
    let now = Utc::now().timestamp();
    let mut guard = lock(table);
    let entry = guard.entry(key).or_insert_with(|| ReportEntry {
        kind,
        league: league.to_string(),
        name: name.to_string(),
        count: 0,
        entity_id: None,
        detail: None,
        last_seen: now,
    });
    entry.count += 1;
    entry.last_seen = now;
    if entity_id.is_some() {
        entry.entity_id = entity_id;
    }
    if detail.is_some() {
        entry.detail = detail;
    }
}

fn sorted(table: &Mutex<Table>) -> Vec<(ReportKey, ReportEntry)> {
    let mut out: Vec<(ReportKey, ReportEntry)> = lock(table)
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

fn lock(table: &Mutex<Table>) -> std::sync::MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}

/// `problem_entities-20260110T003000Z.json`
pub fn report_file_name(report: &str, generated_at: i64) -> String {
    let stamp = DateTime::<Utc>::from_timestamp(generated_at, 0)
        .unwrap_or_default()
        .format("%Y%m%dT%H%M%SZ");
    format!("{report}-{stamp}.json")
}

fn write_report(path: &Path, generated_at: i64, rows: &[(ReportKey, ReportEntry)]) -> Result<()> {
    let mut sources: BTreeMap<&str, Vec<&ReportEntry>> = BTreeMap::new();
    for (key, entry) in rows {
        sources.entry(key.source.as_str()).or_default().push(entry);
    }
    let file = ReportFile {
        generated_at,
        sources,
    };
    let json = serde_json::to_string_pretty(&file).context("serialize report")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}
