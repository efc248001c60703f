use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use propline::adapters::{CollectionAdapter, JsonFeedAdapter, ReplayAdapter};
use propline::collector::{Collector, Standardizer};
use propline::config::{self, Config};
use propline::entity_db::{self, SqliteEntitySource};
use propline::entity_store::EntityStore;
use propline::http_cache::HttpCache;
use propline::line_db::{ChangeStreamStore, SqliteLineRepository};
use propline::logging;
use propline::report::Reporter;

fn main() -> Result<()> {
    config::load_dotenv();
    logging::init_tracing();
    let cfg = Config::from_env()?;
    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    let entity_conn = entity_db::open_db(&cfg.db_path)?;
    let store = Arc::new(
        EntityStore::open(Box::new(SqliteEntitySource::new(entity_conn)))
            .context("initial entity load")?,
    );
    let reporter = Arc::new(Reporter::new(&cfg.reference_sources));
    let lines_conn = entity_db::open_db(&cfg.db_path)?;
    let mut lines = ChangeStreamStore::new(SqliteLineRepository::new(lines_conn)?);

    let adapters = build_adapters(&cfg)?;
    if adapters.is_empty() {
        warn!("no adapters configured, set PROPLINE_FEEDS or PROPLINE_REPLAY");
    }
    let collector = Collector::new(
        adapters,
        Standardizer::new(Arc::clone(&store), Arc::clone(&reporter)),
        cfg.fetch_parallelism,
    );
    info!(
        db = %cfg.db_path.display(),
        adapters = collector.adapter_count(),
        interval_secs = cfg.batch_interval.as_secs(),
        "collector started"
    );

    let mut last_entity_refresh = Instant::now();
    let mut last_subject_refresh = Instant::now();
    let mut last_report = Instant::now();
    let mut last_batch_ts = i64::MIN;
    loop {
        let started = Instant::now();
        if last_entity_refresh.elapsed() >= cfg.entity_refresh {
            store.refresh();
            last_entity_refresh = Instant::now();
            last_subject_refresh = last_entity_refresh;
        } else if last_subject_refresh.elapsed() >= cfg.subject_refresh {
            store.refresh_subjects();
            last_subject_refresh = Instant::now();
        }

        // Batches are strictly sequential; never let a clock step move a stream backwards.
        let batch_ts = Utc::now().timestamp().max(last_batch_ts);
        last_batch_ts = batch_ts;
        collector.run_batch(&mut lines, batch_ts);

        // Reports accumulate across batches until the next flush.
        if once || last_report.elapsed() >= cfg.report_interval {
            if let Err(err) = reporter.flush(&cfg.report_dir) {
                warn!(error = %format!("{err:#}"), "report flush failed");
            }
            last_report = Instant::now();
        }
        if once {
            break;
        }
        if let Some(wait) = cfg.batch_interval.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
    }
    Ok(())
}

fn build_adapters(cfg: &Config) -> Result<Vec<Box<dyn CollectionAdapter>>> {
    let mut adapters: Vec<Box<dyn CollectionAdapter>> = Vec::new();
    if !cfg.feeds.is_empty() {
        let cache = Arc::new(HttpCache::open_default());
        for feed in &cfg.feeds {
            let adapter = JsonFeedAdapter::new(
                feed.name.clone(),
                feed.location.clone(),
                cfg.adapter_timeout,
                Arc::clone(&cache),
            )
            .with_context(|| format!("build feed adapter {}", feed.name))?;
            adapters.push(Box::new(adapter));
        }
    }
    for replay in &cfg.replays {
        adapters.push(Box::new(ReplayAdapter::new(
            replay.name.clone(),
            replay.location.clone(),
        )));
    }
    Ok(adapters)
}
