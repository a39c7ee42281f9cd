use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::cache::CacheEntry;
use crate::dom::NodeId;
use crate::domain::{ContentKind, DisplayMode, MetadataError};

use super::backend::BackendError;
use super::classify::KindSource;

/// One unit of work handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub node: NodeId,
    pub raw_content: String,
    pub display_mode: DisplayMode,
    /// Kind declared by solution metadata; wins over structural detection.
    pub declared_kind: Option<ContentKind>,
}

impl RenderTarget {
    pub fn new(node: NodeId, raw_content: impl Into<String>, display_mode: DisplayMode) -> Self {
        Self {
            node,
            raw_content: raw_content.into(),
            display_mode,
            declared_kind: None,
        }
    }

    pub fn with_declared_kind(mut self, kind: Option<ContentKind>) -> Self {
        self.declared_kind = kind;
        self
    }
}

/// Lifecycle of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// How a request obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrigin {
    /// Answered synchronously from the typeset cache.
    Cache,
    /// Attached to an in-flight job for the same key.
    Coalesced,
    /// Owned the job that invoked the executor.
    Executed,
}

/// Outcome of one scheduled render, as seen by the requester.
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub node: NodeId,
    pub kind: ContentKind,
    pub kind_source: KindSource,
    pub origin: ResultOrigin,
    pub used_fallback: bool,
    pub duration_ms: f64,
    /// Shared entry; coalesced requesters receive the same allocation.
    pub entry: Arc<CacheEntry>,
}

impl RenderResult {
    pub fn success(&self) -> bool {
        !self.used_fallback
    }
}

/// Per-completion progress for a container batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

/// Summary of one container render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub cache_hits: usize,
    pub coalesced: usize,
    /// Nodes re-submitted by the verification pass.
    pub resubmitted: usize,
    /// Nodes the verification pass forced to plain text.
    pub forced_text: usize,
    pub timed_out: bool,
}

impl BatchStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn completed(&self) -> usize {
        self.successful + self.failed
    }

    pub(crate) fn record(&mut self, result: &RenderResult) {
        if result.used_fallback {
            self.failed += 1;
        } else {
            self.successful += 1;
        }
        match result.origin {
            ResultOrigin::Cache => self.cache_hits += 1,
            ResultOrigin::Coalesced => self.coalesced += 1,
            ResultOrigin::Executed => {}
        }
    }

    /// Fold in a verification retry. `earlier` is whether the node fell back
    /// on its first attempt, or `None` when the first pass never saw it.
    pub(crate) fn record_retry(&mut self, earlier: Option<bool>, result: &RenderResult) {
        match earlier {
            None => {
                self.total += 1;
                self.record(result);
            }
            Some(true) if !result.used_fallback => {
                self.failed -= 1;
                self.successful += 1;
            }
            Some(_) => {}
        }
    }
}

/// Item yielded by [`RenderManager::render_container_events`](super::RenderManager::render_container_events).
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Progress(BatchProgress),
    Finished(BatchStats),
    Failed(RenderError),
}

/// Per-call options for a container render.
#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    /// Display mode for `smart-content` markers; `latex-content` is always block.
    pub display_mode: Option<DisplayMode>,
    pub progress: Option<UnboundedSender<BatchProgress>>,
}

impl ContainerOptions {
    pub fn with_display_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = Some(mode);
        self
    }

    pub fn with_progress(mut self, sender: UnboundedSender<BatchProgress>) -> Self {
        self.progress = Some(sender);
        self
    }
}

/// Point-in-time service statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub successful: u64,
    pub failed: u64,
    /// Percentage of classifications answered by solution metadata.
    pub metadata_efficiency: f64,
    pub avg_render_time_ms: f64,
    pub cache_hits: u64,
    pub coalesced: u64,
    pub cache_entries: usize,
}

/// Errors surfaced to callers. Backend failures while typesetting never show
/// up here; they degrade to plain text on the node instead.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("typesetting backend has not been initialized")]
    NotInitialized,
    #[error("container {node} is not attached to the document")]
    DetachedContainer { node: NodeId },
    #[error("node {node} does not belong to this document")]
    UnknownNode { node: NodeId },
    #[error("typesetting backend failed to start: {0}")]
    Backend(#[from] BackendError),
    #[error("invalid solution metadata: {0}")]
    Metadata(#[from] MetadataError),
    #[error("no Tokio runtime to host the render worker: {message}")]
    NoRuntime { message: String },
    #[error("container render aborted: {message}")]
    Aborted { message: String },
}
