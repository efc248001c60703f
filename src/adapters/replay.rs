use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use super::{CollectionAdapter, RawProposition};

/// One JSON proposition per line, re-read on every fetch.
pub struct ReplayAdapter {
    name: String,
    path: PathBuf,
}

impl ReplayAdapter {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl CollectionAdapter for ReplayAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Vec<RawProposition>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read replay {}", self.path.display()))?;
        Ok(parse_replay(&self.name, &raw))
    }
}

pub fn parse_replay(source: &str, raw: &str) -> Vec<RawProposition> {
    let mut out = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<RawProposition>(line) {
            Ok(prop) => out.push(prop),
            Err(err) => warn!(source, line = idx + 1, error = %err, "replay row skipped"),
        }
    }
    out
}
