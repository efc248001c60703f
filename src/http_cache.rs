use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "propline";
const CACHE_FILE: &str = "http_cache.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HttpCacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: i64,
}

pub struct HttpCache {
    path: Option<PathBuf>,
    state: Mutex<HttpCacheFile>,
}

impl HttpCache {
    pub fn open_default() -> Self {
        Self::open(app_cache_dir().map(|dir| dir.join(CACHE_FILE)))
    }

    pub fn open(path: Option<PathBuf>) -> Self {
        let state = path.as_deref().map(load_cache_file).unwrap_or_default();
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn fetch_json_cached(
        &self,
        client: &Client,
        url: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<String> {
        let cached_entry = self.lock().entries.get(url).cloned();

        let mut req = client.get(url);
        for (name, value) in extra_headers {
            req = req.header(*name, *value);
        }
        if let Some(entry) = cached_entry.as_ref() {
            if let Some(etag) = entry.etag.as_ref() {
                req = req.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = entry.last_modified.as_ref() {
                req = req.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let resp = req.send().with_context(|| format!("request {url}"))?;
        let status = resp.status();
        let headers = resp.headers().clone();
        if status == StatusCode::NOT_MODIFIED {
            let Some(mut entry) = cached_entry else {
                return Err(anyhow!("received 304 without cache body"));
            };
            debug!(url, "not modified, serving cached body");
            entry.fetched_at = Utc::now().timestamp();
            let body = entry.body.clone();
            self.store(url, entry);
            return Ok(body);
        }

        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {status}: {}", truncate(&body, 200)));
        }

        let header = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let entry = CacheEntry {
            body: body.clone(),
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
            fetched_at: Utc::now().timestamp(),
        };
        if entry.etag.is_some() || entry.last_modified.is_some() {
            self.store(url, entry);
        }
        Ok(body)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, url: &str, entry: CacheEntry) {
        let mut cache = self.lock();
        cache.version = CACHE_VERSION;
        cache.entries.insert(url.to_string(), entry);
        if let Some(path) = self.path.as_ref() {
            if let Err(err) = save_cache_file(path, &cache) {
                warn!(error = %err, "http cache not saved");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HttpCacheFile> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn load_cache_file(path: &Path) -> HttpCacheFile {
    let Ok(raw) = fs::read_to_string(path) else {
        return HttpCacheFile::default();
    };
    let cache = serde_json::from_str::<HttpCacheFile>(&raw).unwrap_or_default();
    if cache.version != CACHE_VERSION {
        return HttpCacheFile::default();
    }
    cache
}

fn save_cache_file(path: &Path, cache: &HttpCacheFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(cache).context("serialize http cache")?;
    fs::write(&tmp, json).context("write http cache")?;
    fs::rename(&tmp, path).context("swap http cache")?;
    Ok(())
}

fn truncate(raw: &str, max: usize) -> &str {
    match raw.char_indices().nth(max) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}
