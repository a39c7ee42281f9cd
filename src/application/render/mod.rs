//! Render manager.
//!
//! Fragments found in a container are classified, looked up in the typeset
//! cache, and otherwise queued as jobs. A single worker drains the queue so
//! the backend is never entered concurrently; requests for a key that is
//! already queued or running share that job's result. Backend failures
//! degrade to the raw text with a `render-error` class and never reach the
//! caller.

mod backend;
mod classify;
mod executor;
mod manager;
mod markers;
mod orchestrator;
mod runtime;
mod scheduler;
mod stats;
mod types;

pub use backend::{BackendError, TypesetBackend};
pub use classify::{Classification, KindSource, classify, detect};
pub use executor::Executor;
pub use manager::{RenderManager, RenderManagerConfig};
pub use markers::{
    DATA_CONTENT, DATA_FIELD, DATA_LATEX, DATA_RENDER, LATEX_CONTENT_CLASS, MATH_RENDERED_CLASS,
    Marker, RENDER_ERROR_CLASS, RENDERED_CLASSES, SMART_CONTENT_CLASS, discover, infer_field,
    is_rendered,
};
pub use scheduler::Scheduler;
pub use types::{
    BatchEvent, BatchProgress, BatchStats, ContainerOptions, JobState, RenderError, RenderResult,
    RenderTarget, ResultOrigin, StatsSnapshot,
};
