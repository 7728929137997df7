//! # gridscope-cache: Analytics Store and Pre-Warm Runner
//!
//! An explicit cache object with a defined lifecycle, replacing the usual
//! module-level mutable globals: construct one [`AnalyticsStore`] at process
//! start, pass it as a dependency into whatever needs it, and call
//! [`AnalyticsStore::get_or_compute`] keyed by `(agent, episode)`.
//!
//! Lookup order is memory, then disk (the Parquet/JSON form written by
//! `gridscope-analytics`), then compute-and-persist. Entries are
//! `Arc`-shared so concurrent readers never copy a frame. There is no
//! eviction policy: an analytics object is built at most once per key per
//! process and stays resident.
//!
//! [`prewarm`] builds many keys up front on a rayon pool, mirroring how the
//! dashboard warms the best-agent-per-scenario cache before serving.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use gridscope_analytics::EpisodeAnalytics;
use gridscope_core::Episode;

/// Cache key: one analytics object per agent per episode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub agent: String,
    pub episode: String,
}

impl CacheKey {
    pub fn new(agent: impl Into<String>, episode: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            episode: episode.into(),
        }
    }

    /// Directory of this key under the store root.
    fn relative_dir(&self) -> PathBuf {
        PathBuf::from(sanitize(&self.agent)).join(sanitize(&self.episode))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.agent, self.episode)
    }
}

fn sanitize(value: &str) -> String {
    value.replace(std::path::MAIN_SEPARATOR, "_")
}

/// Disk-backed, memory-first analytics cache.
pub struct AnalyticsStore {
    root: PathBuf,
    entries: Mutex<HashMap<CacheKey, Arc<EpisodeAnalytics>>>,
}

impl AnalyticsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Memory-resident entry for `key`, if any. Never touches the disk.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<EpisodeAnalytics>> {
        self.entries
            .lock()
            .expect("analytics store lock poisoned")
            .get(key)
            .cloned()
    }

    /// Resolve `key`: memory first, then the on-disk form, and only then
    /// `compute` (whose result is persisted for the next process).
    ///
    /// Two threads racing on the same missing key may both compute; the
    /// build is deterministic, so whichever result lands in the map first
    /// wins and both callers read identical analytics.
    pub fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> Result<Arc<EpisodeAnalytics>>
    where
        F: FnOnce() -> Result<EpisodeAnalytics>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let dir = self.root.join(key.relative_dir());
        let analytics = if EpisodeAnalytics::is_persisted(&dir) {
            debug!(%key, "loading analytics from disk cache");
            EpisodeAnalytics::load_from(&dir)
                .with_context(|| format!("loading cached analytics for '{key}'"))?
        } else {
            debug!(%key, "computing analytics");
            let built = compute().with_context(|| format!("building analytics for '{key}'"))?;
            built
                .save(&dir)
                .with_context(|| format!("persisting analytics for '{key}'"))?;
            built
        };

        let mut entries = self.entries.lock().expect("analytics store lock poisoned");
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(analytics));
        Ok(entry.clone())
    }

    /// Drop the memory-resident entry for `key`; the on-disk form stays.
    pub fn evict(&self, key: &CacheKey) -> bool {
        self.entries
            .lock()
            .expect("analytics store lock poisoned")
            .remove(key)
            .is_some()
    }

    /// Number of memory-resident entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("analytics store lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One pre-warm unit: the key plus the raw episode to build it from.
pub struct PrewarmJob {
    pub key: CacheKey,
    pub episode: Episode,
}

/// Summary returned after a pre-warm run so clients can log counts.
#[derive(Debug)]
pub struct PrewarmSummary {
    pub success: usize,
    pub failure: usize,
    /// Keys that failed, with the error rendered for logging.
    pub failures: Vec<(CacheKey, String)>,
}

/// Build analytics for every job on a rayon pool.
///
/// `threads == 0` auto-detects the CPU count. Each build is independent and
/// shares no mutable state beyond the final insert into the store.
pub fn prewarm(
    store: &AnalyticsStore,
    jobs: Vec<PrewarmJob>,
    threads: usize,
) -> Result<PrewarmSummary> {
    let thread_count = if threads == 0 {
        num_cpus::get()
    } else {
        threads
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .context("building rayon thread pool for cache pre-warm")?;

    let outcomes: Vec<(CacheKey, Result<()>)> = pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                let outcome = store
                    .get_or_compute(&job.key, || EpisodeAnalytics::build(&job.episode))
                    .map(|_| ());
                (job.key.clone(), outcome)
            })
            .collect()
    });

    let mut failures = Vec::new();
    let mut success = 0;
    for (key, outcome) in outcomes {
        match outcome {
            Ok(()) => success += 1,
            Err(err) => failures.push((key, format!("{err:#}"))),
        }
    }
    let summary = PrewarmSummary {
        success,
        failure: failures.len(),
        failures,
    };
    info!(
        success = summary.success,
        failure = summary.failure,
        "analytics pre-warm finished"
    );
    Ok(summary)
}
