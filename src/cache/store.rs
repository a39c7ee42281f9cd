//! Cache storage.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use time::OffsetDateTime;
use tracing::info;

use super::config::CacheConfig;
use super::keys::RenderKey;
use crate::domain::ContentKind;

const METRIC_CACHE_HIT: &str = "typeset_cache_hit_total";
const METRIC_CACHE_MISS: &str = "typeset_cache_miss_total";
const METRIC_CACHE_TRIM: &str = "typeset_cache_trim_total";

/// What a completed render wrote into its node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedOutput {
    /// Typeset markup, written as inner markup.
    Markup(String),
    /// Prose assigned as plain text; the backend was never involved.
    Text(String),
    /// Raw content shown as plain text after the backend failed.
    Fallback(String),
}

/// Immutable record of a completed render.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: RenderKey,
    pub output: RenderedOutput,
    /// Kind actually applied; differs from `key.kind` only for fallbacks.
    pub kind_used: ContentKind,
    pub produced_at: OffsetDateTime,
    pub render_duration_ms: f64,
}

impl CacheEntry {
    pub fn new(key: RenderKey, output: RenderedOutput, render_duration_ms: f64) -> Self {
        let kind_used = match output {
            RenderedOutput::Markup(_) => key.kind,
            RenderedOutput::Text(_) | RenderedOutput::Fallback(_) => ContentKind::Text,
        };
        Self {
            key,
            output,
            kind_used,
            produced_at: OffsetDateTime::now_utc(),
            render_duration_ms,
        }
    }

    pub fn markup(
        key: RenderKey,
        markup: String,
        kind_used: ContentKind,
        render_duration_ms: f64,
    ) -> Self {
        Self {
            key,
            output: RenderedOutput::Markup(markup),
            kind_used,
            produced_at: OffsetDateTime::now_utc(),
            render_duration_ms,
        }
    }

    pub fn fallback(key: RenderKey, render_duration_ms: f64) -> Self {
        let text = key.content.clone();
        Self {
            key,
            output: RenderedOutput::Fallback(text),
            kind_used: ContentKind::Text,
            produced_at: OffsetDateTime::now_utc(),
            render_duration_ms,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.output, RenderedOutput::Fallback(_))
    }
}

/// Process-wide typeset cache.
///
/// Entries are append-by-key and only ever removed in bulk, either by an
/// explicit [`clear`](Self::clear) or by the capacity trim in
/// [`put`](Self::put).
#[derive(Debug)]
pub struct TypesetCache {
    entries: DashMap<RenderKey, Arc<CacheEntry>>,
    config: CacheConfig,
}

impl TypesetCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    pub fn get(&self, key: &RenderKey) -> Option<Arc<CacheEntry>> {
        match self.entries.get(key) {
            Some(entry) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Some(Arc::clone(entry.value()))
            }
            None => {
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    /// Lookup without touching the hit/miss counters, for rechecks of a key
    /// whose miss was already recorded.
    pub fn peek(&self, key: &RenderKey) -> Option<Arc<CacheEntry>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Store an entry, replacing any entry under the same key.
    pub fn put(&self, entry: CacheEntry) -> Arc<CacheEntry> {
        let limit = self.config.max_entries_non_zero().get();
        if !self.entries.contains_key(&entry.key) && self.entries.len() >= limit {
            info!(entries = self.entries.len(), limit, "Typeset cache full, clearing");
            counter!(METRIC_CACHE_TRIM).increment(1);
            self.entries.clear();
        }

        let entry = Arc::new(entry);
        self.entries.insert(entry.key.clone(), Arc::clone(&entry));
        entry
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TypesetCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentKind, DisplayMode};

    fn key(content: &str) -> RenderKey {
        RenderKey::new(content, DisplayMode::Inline, ContentKind::InlineMath)
    }

    #[test]
    fn get_after_put_returns_entry() {
        let cache = TypesetCache::default();
        assert!(cache.get(&key("$x$")).is_none());

        cache.put(CacheEntry::markup(
            key("$x$"),
            "<span>x</span>".to_string(),
            ContentKind::InlineMath,
            1.5,
        ));

        let entry = cache.get(&key("$x$")).expect("cached entry");
        assert_eq!(entry.output, RenderedOutput::Markup("<span>x</span>".to_string()));
        assert_eq!(entry.kind_used, ContentKind::InlineMath);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn second_put_overwrites_same_key() {
        let cache = TypesetCache::default();
        cache.put(CacheEntry::fallback(key("$\\bad$"), 0.0));
        cache.put(CacheEntry::markup(
            key("$\\bad$"),
            "ok".to_string(),
            ContentKind::InlineMath,
            0.0,
        ));

        assert_eq!(cache.len(), 1);
        assert!(!cache.get(&key("$\\bad$")).expect("entry").is_fallback());
    }

    #[test]
    fn fallback_keeps_raw_content_as_text() {
        let entry = CacheEntry::fallback(key("$\\frac{1$"), 2.0);
        assert!(entry.is_fallback());
        assert_eq!(entry.kind_used, ContentKind::Text);
        assert_eq!(entry.output, RenderedOutput::Fallback("$\\frac{1$".to_string()));
    }

    #[test]
    fn full_cache_is_cleared_in_bulk() {
        let cache = TypesetCache::new(CacheConfig { max_entries: 2 });
        cache.put(CacheEntry::fallback(key("a"), 0.0));
        cache.put(CacheEntry::fallback(key("b"), 0.0));
        // overwriting an existing key never trims
        cache.put(CacheEntry::fallback(key("b"), 0.0));
        assert_eq!(cache.len(), 2);

        cache.put(CacheEntry::fallback(key("c"), 0.0));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn text_output_is_recorded_as_text_kind() {
        let key = RenderKey::new("plain words", DisplayMode::Inline, ContentKind::Text);
        let entry = CacheEntry::new(key, RenderedOutput::Text("plain words".to_string()), 0.1);
        assert_eq!(entry.kind_used, ContentKind::Text);
        assert!(!entry.is_fallback());
    }

    #[test]
    fn only_counted_lookups_reach_the_metrics() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, || {
            let cache = TypesetCache::default();
            assert!(cache.peek(&key("$x$")).is_none());
            assert!(cache.get(&key("$x$")).is_none());
            cache.put(CacheEntry::fallback(key("$x$"), 0.0));
            assert!(cache.peek(&key("$x$")).is_some());
            assert!(cache.get(&key("$x$")).is_some());
        });

        let counters: Vec<(String, u64)> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(composite, _, _, value)| match value {
                DebugValue::Counter(count) => Some((composite.key().name().to_string(), count)),
                _ => None,
            })
            .collect();
        assert!(counters.contains(&(METRIC_CACHE_MISS.to_string(), 1)));
        assert!(counters.contains(&(METRIC_CACHE_HIT.to_string(), 1)));
    }

    #[test]
    fn clear_drops_everything() {
        let cache = TypesetCache::default();
        cache.put(CacheEntry::fallback(key("a"), 0.0));
        cache.clear();
        assert!(cache.is_empty());
    }
}
