//! Container rendering.
//!
//! Discovers markers under a root, submits them all through the scheduler in
//! priority order, reports progress as results arrive, then runs a single
//! verification pass over anything left unrendered.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::dom::{Document, DomError, NodeId};
use crate::domain::{ContentKind, DisplayMode, RenderMetadata};

use super::markers::{Marker, RENDER_ERROR_CLASS, discover, is_rendered};
use super::scheduler::Scheduler;
use super::stats::ServiceStats;
use super::types::{BatchProgress, BatchStats, ContainerOptions, RenderTarget};

const METRIC_FORCED: &str = "typeset_verification_forced_total";

pub(crate) struct Orchestrator<'a> {
    pub document: &'a Document,
    pub scheduler: &'a Scheduler,
    pub stats: &'a ServiceStats,
    /// Snapshot taken when the batch starts.
    pub metadata: RenderMetadata,
    pub default_mode: DisplayMode,
    pub verification_delay: Duration,
}

impl Orchestrator<'_> {
    pub(crate) async fn run(&self, root: NodeId, options: ContainerOptions) -> BatchStats {
        let inline_mode = options.display_mode.unwrap_or(self.default_mode);
        let markers = self.prioritized(root, inline_mode);
        let total = markers.len();
        let mut batch = BatchStats::new(total);
        if markers.is_empty() {
            debug!(root = %root, "No render markers in container");
            return batch;
        }
        info!(root = %root, total, "Rendering container");

        let mut pending: FuturesUnordered<_> = markers
            .iter()
            .map(|marker| self.scheduler.schedule(self.target(marker)))
            .collect();

        // Whether each node fell back on its first attempt.
        let mut first_pass = HashMap::with_capacity(total);
        while let Some(result) = pending.next().await {
            first_pass.insert(result.node, result.used_fallback);
            batch.record(&result);
            self.stats.record(&result);
            if let Some(progress) = &options.progress {
                // A dropped receiver only means nobody is watching.
                let _ = progress.send(BatchProgress {
                    completed: batch.completed(),
                    total,
                });
            }
        }

        self.verify(root, inline_mode, &first_pass, &mut batch).await;
        info!(
            root = %root,
            total,
            successful = batch.successful,
            failed = batch.failed,
            forced = batch.forced_text,
            "Container rendered"
        );
        batch
    }

    /// Markers under `root`, stable-sorted so fields listed in the metadata
    /// priority go first.
    fn prioritized(&self, root: NodeId, inline_mode: DisplayMode) -> Vec<Marker> {
        let mut markers = discover(self.document, root, inline_mode);
        markers.sort_by_key(|marker| {
            marker
                .field
                .and_then(|field| self.metadata.priority_rank(field))
                .unwrap_or(usize::MAX)
        });
        markers
    }

    fn target(&self, marker: &Marker) -> RenderTarget {
        let declared = marker
            .field
            .and_then(|field| self.metadata.declared_kind(field));
        RenderTarget::new(marker.node, marker.payload.clone(), marker.display_mode)
            .with_declared_kind(declared)
    }

    fn unrendered(&self, root: NodeId, inline_mode: DisplayMode) -> Vec<Marker> {
        discover(self.document, root, inline_mode)
            .into_iter()
            .filter(|marker| !is_rendered(self.document, marker.node))
            .collect()
    }

    /// Give unrendered markers one more pass, then force whatever is still
    /// unrendered to plain text.
    async fn verify(
        &self,
        root: NodeId,
        inline_mode: DisplayMode,
        first_pass: &HashMap<NodeId, bool>,
        batch: &mut BatchStats,
    ) {
        if self.unrendered(root, inline_mode).is_empty() {
            return;
        }

        tokio::time::sleep(self.verification_delay).await;
        let gaps = self.unrendered(root, inline_mode);
        if gaps.is_empty() {
            return;
        }
        debug!(root = %root, count = gaps.len(), "Retrying unrendered markers");
        batch.resubmitted = gaps.len();

        let mut retries: FuturesUnordered<_> = gaps
            .iter()
            .map(|marker| self.scheduler.schedule(self.target(marker)))
            .collect();
        while let Some(result) = retries.next().await {
            let earlier = first_pass.get(&result.node).copied();
            batch.record_retry(earlier, &result);
            self.stats.record_retry(earlier, &result);
        }

        for marker in self.unrendered(root, inline_mode) {
            warn!(node = %marker.node, "Marker still unrendered after retry, forcing plain text");
            force_text(self.document, marker.node, &marker.payload);
            counter!(METRIC_FORCED).increment(1);
            batch.forced_text += 1;
        }
    }
}

/// Put the trimmed payload in as plain text and mark the node rendered.
pub(crate) fn force_text(document: &Document, node: NodeId, payload: &str) {
    let written = document
        .set_text_content(node, payload.trim())
        .and_then(|()| document.add_class(node, ContentKind::Text.rendered_class()));
    log_write_failure(node, written);
}

/// Plain-text replacement for a batch that never finished.
pub(crate) fn force_timed_out(document: &Document, marker: &Marker) {
    force_text(document, marker.node, &marker.payload);
    log_write_failure(marker.node, document.add_class(marker.node, RENDER_ERROR_CLASS));
}

fn log_write_failure(node: NodeId, written: Result<(), DomError>) {
    if let Err(err) = written {
        warn!(node = %node, error = %err, "Could not write plain-text replacement");
    }
}
