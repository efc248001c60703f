use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::http_cache::app_cache_dir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub batch_interval: Duration,
    pub entity_refresh: Duration,
    pub subject_refresh: Duration,
    pub fetch_parallelism: usize,
    pub adapter_timeout: Duration,
    pub report_dir: PathBuf,
    pub report_interval: Duration,
    pub reference_sources: Vec<String>,
    pub feeds: Vec<SourceSpec>,
    pub replays: Vec<SourceSpec>,
}

/// Loads `.env.local` then `.env`; variables already set win.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let cache_dir = app_cache_dir();
        let db_path = match lookup("PROPLINE_DB").filter(|v| !v.trim().is_empty()) {
            Some(path) => PathBuf::from(path.trim()),
            None => cache_dir
                .as_ref()
                .map(|dir| dir.join("propline.sqlite"))
                .ok_or_else(|| anyhow!("PROPLINE_DB unset and no cache dir available"))?,
        };
        let report_dir = match lookup("REPORT_DIR").filter(|v| !v.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir.trim()),
            None => db_path
                .parent()
                .map(|dir| dir.join("reports"))
                .unwrap_or_else(|| PathBuf::from("reports")),
        };

        let secs = |key: &str, default: u64, min: u64, max: u64| {
            Duration::from_secs(
                lookup(key)
                    .and_then(|val| val.trim().parse::<u64>().ok())
                    .unwrap_or(default)
                    .clamp(min, max),
            )
        };

        Ok(Self {
            db_path,
            batch_interval: secs("BATCH_INTERVAL_SECS", 60, 5, 600),
            entity_refresh: secs("ENTITY_REFRESH_SECS", 900, 30, 86_400),
            subject_refresh: secs("SUBJECT_REFRESH_SECS", 120, 15, 86_400),
            fetch_parallelism: lookup("FETCH_PARALLELISM")
                .and_then(|val| val.trim().parse::<usize>().ok())
                .unwrap_or(6)
                .clamp(1, 32),
            adapter_timeout: secs("ADAPTER_TIMEOUT_SECS", 10, 1, 120),
            report_dir,
            report_interval: secs("REPORT_INTERVAL_SECS", 3_600, 60, 86_400),
            reference_sources: lookup("REFERENCE_SOURCES")
                .unwrap_or_else(|| "schedule,roster".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            feeds: parse_sources(&lookup("PROPLINE_FEEDS").unwrap_or_default())?,
            replays: parse_sources(&lookup("PROPLINE_REPLAY").unwrap_or_default())?,
        })
    }
}

pub fn parse_sources(raw: &str) -> Result<Vec<SourceSpec>> {
    let mut out = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, location) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("source entry {entry:?} is not name=location"))?;
        let (name, location) = (name.trim(), location.trim());
        if name.is_empty() || location.is_empty() {
            return Err(anyhow!("source entry {entry:?} has an empty side"));
        }
        out.push(SourceSpec {
            name: name.to_string(),
            location: location.to_string(),
        });
    }
    Ok(out)
}
