use std::sync::atomic::{AtomicU64, Ordering};

use super::classify::KindSource;
use super::types::{RenderResult, ResultOrigin, StatsSnapshot};

/// Lifetime counters for one render manager.
#[derive(Debug, Default)]
pub(crate) struct ServiceStats {
    successful: AtomicU64,
    failed: AtomicU64,
    classified: AtomicU64,
    from_metadata: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
    executed: AtomicU64,
    render_micros: AtomicU64,
}

impl ServiceStats {
    pub(crate) fn record(&self, result: &RenderResult) {
        let outcome = if result.used_fallback {
            &self.failed
        } else {
            &self.successful
        };
        outcome.fetch_add(1, Ordering::Relaxed);

        self.classified.fetch_add(1, Ordering::Relaxed);
        if result.kind_source == KindSource::Metadata {
            self.from_metadata.fetch_add(1, Ordering::Relaxed);
        }

        match result.origin {
            ResultOrigin::Cache => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
            }
            ResultOrigin::Coalesced => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
            }
            ResultOrigin::Executed => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                let micros = (result.duration_ms * 1000.0).max(0.0) as u64;
                self.render_micros.fetch_add(micros, Ordering::Relaxed);
            }
        }
    }

    /// Account for a verification retry without counting a node twice.
    pub(crate) fn record_retry(&self, earlier: Option<bool>, result: &RenderResult) {
        match earlier {
            None => self.record(result),
            Some(true) if !result.used_fallback => {
                self.failed.fetch_sub(1, Ordering::Relaxed);
                self.successful.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => {}
        }
    }

    pub(crate) fn snapshot(&self, cache_entries: usize) -> StatsSnapshot {
        let classified = self.classified.load(Ordering::Relaxed);
        let from_metadata = self.from_metadata.load(Ordering::Relaxed);
        let executed = self.executed.load(Ordering::Relaxed);
        let render_micros = self.render_micros.load(Ordering::Relaxed);

        StatsSnapshot {
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            metadata_efficiency: ratio(from_metadata, classified) * 100.0,
            avg_render_time_ms: ratio(render_micros, executed) / 1000.0,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            cache_entries,
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
