use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use serde_json::Value;
use tokio::sync::{OnceCell, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheConfig, TypesetCache};
use crate::config::Settings;
use crate::dom::{Document, NodeId};
use crate::domain::{DisplayMode, FieldId, RenderMetadata};
use crate::util::lock::{rw_read, rw_write};

use super::backend::TypesetBackend;
use super::executor::Executor;
use super::markers::{DATA_FIELD, discover, is_rendered};
use super::orchestrator::{Orchestrator, force_timed_out};
use super::scheduler::Scheduler;
use super::stats::ServiceStats;
use super::types::{
    BatchEvent, BatchStats, ContainerOptions, RenderError, RenderTarget, StatsSnapshot,
};

const SOURCE: &str = "render::manager";
const DEFAULT_VERIFICATION_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_WATCHDOG: Duration = Duration::from_secs(15);

/// Tunables for a [`RenderManager`].
#[derive(Debug, Clone)]
pub struct RenderManagerConfig {
    pub cache: CacheConfig,
    /// Pause before unrendered markers get their one retry.
    pub verification_delay: Duration,
    /// Upper bound used by [`RenderManager::render_container_with_watchdog`].
    pub watchdog: Duration,
    /// Display mode for `smart-content` markers when the caller gives none.
    pub default_display_mode: DisplayMode,
}

impl Default for RenderManagerConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            verification_delay: DEFAULT_VERIFICATION_DELAY,
            watchdog: DEFAULT_WATCHDOG,
            default_display_mode: DisplayMode::Inline,
        }
    }
}

impl From<&Settings> for RenderManagerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            cache: CacheConfig::from(&settings.cache),
            verification_delay: settings.render.verification_delay,
            watchdog: settings.render.watchdog,
            default_display_mode: settings.render.default_display_mode,
        }
    }
}

struct Inner {
    document: Arc<Document>,
    backend: Arc<dyn TypesetBackend>,
    scheduler: Scheduler,
    metadata: RwLock<RenderMetadata>,
    stats: ServiceStats,
    ready: OnceCell<()>,
    config: RenderManagerConfig,
}

/// Entry point for rendering tutoring content into a [`Document`].
///
/// Cheap to clone; clones share the cache, the job queue and the stats.
#[derive(Clone)]
pub struct RenderManager {
    inner: Arc<Inner>,
}

impl RenderManager {
    /// Build a manager around a backend. The render worker is spawned on the
    /// current Tokio runtime; without one this fails with
    /// [`RenderError::NoRuntime`].
    pub fn create(
        document: Arc<Document>,
        backend: Arc<dyn TypesetBackend>,
        config: RenderManagerConfig,
    ) -> Result<Self, RenderError> {
        let cache = Arc::new(TypesetCache::new(config.cache.clone()));
        let executor = Arc::new(Executor::new(Arc::clone(&backend), Arc::clone(&document)));
        let scheduler = Scheduler::new(cache, executor)?;

        Ok(Self {
            inner: Arc::new(Inner {
                document,
                backend,
                scheduler,
                metadata: RwLock::new(RenderMetadata::default()),
                stats: ServiceStats::default(),
                ready: OnceCell::new(),
                config,
            }),
        })
    }

    /// Start the backend. Concurrent and repeated calls share one attempt;
    /// a failed attempt may be retried.
    pub async fn initialize(&self) -> Result<(), RenderError> {
        let backend = Arc::clone(&self.inner.backend);
        self.inner
            .ready
            .get_or_try_init(|| async move {
                backend.initialize().await?;
                info!("Typesetting backend ready");
                Ok::<(), RenderError>(())
            })
            .await?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.initialized()
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.inner.document
    }

    /// Render one fragment into `node`.
    ///
    /// Returns `Ok(true)` when typeset output was written, `Ok(false)` when
    /// the content was empty or the node fell back to plain text.
    #[instrument(skip(self, content, node), fields(node = %node))]
    pub async fn render_math(
        &self,
        content: &str,
        node: NodeId,
        display_mode: DisplayMode,
        field: Option<FieldId>,
    ) -> Result<bool, RenderError> {
        self.ensure_ready()?;
        if content.trim().is_empty() {
            return Ok(false);
        }
        let document = &self.inner.document;
        if !document.contains(node) {
            return Err(RenderError::UnknownNode { node });
        }

        let declared = field.and_then(|field| {
            if let Err(err) = document.set_attribute(node, DATA_FIELD, field.wire_name()) {
                debug!(node = %node, error = %err, "Could not tag node with its field");
            }
            self.metadata().declared_kind(field)
        });
        let target = RenderTarget::new(node, content, display_mode).with_declared_kind(declared);

        let result = self.inner.scheduler.schedule(target).await;
        self.inner.stats.record(&result);
        Ok(result.success())
    }

    /// Render every marker under `root` and wait for the verification pass.
    #[instrument(skip_all, fields(root = %root))]
    pub async fn render_container(
        &self,
        root: NodeId,
        options: ContainerOptions,
    ) -> Result<BatchStats, RenderError> {
        self.check_container(root)?;
        let orchestrator = Orchestrator {
            document: &self.inner.document,
            scheduler: &self.inner.scheduler,
            stats: &self.inner.stats,
            metadata: self.metadata(),
            default_mode: self.inner.config.default_display_mode,
            verification_delay: self.inner.config.verification_delay,
        };
        Ok(orchestrator.run(root, options).await)
    }

    /// [`render_container`](Self::render_container) as a stream of progress
    /// events, ending with exactly one `Finished` or `Failed`.
    pub fn render_container_events(
        &self,
        root: NodeId,
        options: ContainerOptions,
    ) -> impl Stream<Item = BatchEvent> + Send + 'static {
        let manager = self.clone();
        stream! {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let options = options.with_progress(tx);
            let batch = tokio::spawn(async move { manager.render_container(root, options).await });

            while let Some(progress) = rx.recv().await {
                yield BatchEvent::Progress(progress);
            }

            match batch.await {
                Ok(Ok(stats)) => yield BatchEvent::Finished(stats),
                Ok(Err(err)) => yield BatchEvent::Failed(err),
                Err(err) => yield BatchEvent::Failed(RenderError::Aborted {
                    message: err.to_string(),
                }),
            }
        }
    }

    /// Like [`render_container`](Self::render_container), but gives up after
    /// `timeout` (the configured watchdog when `None`). On timeout every
    /// unrendered marker is replaced by its plain text and flagged with
    /// `render-error`.
    pub async fn render_container_with_watchdog(
        &self,
        root: NodeId,
        options: ContainerOptions,
        timeout: Option<Duration>,
    ) -> Result<BatchStats, RenderError> {
        let limit = timeout.unwrap_or(self.inner.config.watchdog);
        let inline_mode = options
            .display_mode
            .unwrap_or(self.inner.config.default_display_mode);

        match tokio::time::timeout(limit, self.render_container(root, options)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let document = &self.inner.document;
                let markers = discover(document, root, inline_mode);
                let mut stats = BatchStats::new(markers.len());
                stats.timed_out = true;
                for marker in &markers {
                    if is_rendered(document, marker.node) {
                        stats.successful += 1;
                    } else {
                        force_timed_out(document, marker);
                        stats.failed += 1;
                        stats.forced_text += 1;
                    }
                }
                warn!(
                    root = %root,
                    timeout_ms = limit.as_millis() as u64,
                    forced = stats.forced_text,
                    "Container render timed out"
                );
                Ok(stats)
            }
        }
    }

    /// Replace the metadata with the `renderMetadata` block of a solution.
    /// On error the previous metadata stays in place.
    pub fn set_solution_metadata(&self, solution: &Value) -> Result<(), RenderError> {
        match RenderMetadata::from_solution(solution) {
            Ok(metadata) => {
                debug!(fields = metadata.len(), "Solution metadata loaded");
                self.set_render_metadata(metadata);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Ignoring invalid solution metadata");
                Err(err.into())
            }
        }
    }

    pub fn set_render_metadata(&self, metadata: RenderMetadata) {
        *rw_write(&self.inner.metadata, SOURCE, "set_render_metadata") = metadata;
    }

    pub fn metadata(&self) -> RenderMetadata {
        rw_read(&self.inner.metadata, SOURCE, "metadata").clone()
    }

    /// Drop cached output, pending jobs and solution metadata. Lifetime
    /// stats are kept.
    pub fn reset(&self) {
        self.inner.scheduler.reset();
        self.set_render_metadata(RenderMetadata::default());
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner
            .stats
            .snapshot(self.inner.scheduler.cache().len())
    }

    /// Jobs currently queued or running.
    pub fn in_flight(&self) -> usize {
        self.inner.scheduler.in_flight()
    }

    fn ensure_ready(&self) -> Result<(), RenderError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(RenderError::NotInitialized)
        }
    }

    fn check_container(&self, root: NodeId) -> Result<(), RenderError> {
        self.ensure_ready()?;
        let document = &self.inner.document;
        if !document.contains(root) {
            return Err(RenderError::UnknownNode { node: root });
        }
        if !document.is_connected(root) {
            return Err(RenderError::DetachedContainer { node: root });
        }
        Ok(())
    }
}
