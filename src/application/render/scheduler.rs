//! Job scheduling.
//!
//! Every cache miss becomes a job on one unbounded queue drained by a single
//! worker task, so backend invocations never overlap and run in the order
//! requests arrived. Requests for a key that already has a pending job attach
//! to it instead of queueing a duplicate.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheEntry, RenderKey, TypesetCache};
use crate::dom::NodeId;
use crate::util::lock::{rw_read, rw_write};

use super::classify::{Classification, classify};
use super::executor::Executor;
use super::runtime::{Admission, Epoch, InFlightJobs, JobOutcome, JobSlot};
use super::types::{JobState, RenderError, RenderResult, RenderTarget, ResultOrigin};

const SOURCE: &str = "render::scheduler";

pub struct Scheduler {
    cache: Arc<TypesetCache>,
    executor: Arc<Executor>,
    in_flight: InFlightJobs,
    epoch: Arc<RwLock<Epoch>>,
    queue: mpsc::UnboundedSender<Arc<JobSlot>>,
}

impl Scheduler {
    /// Create the scheduler and spawn its worker on the current Tokio runtime.
    pub fn new(cache: Arc<TypesetCache>, executor: Arc<Executor>) -> Result<Self, RenderError> {
        let runtime = Handle::try_current().map_err(|err| RenderError::NoRuntime {
            message: err.to_string(),
        })?;
        let (queue, rx) = mpsc::unbounded_channel();
        let in_flight = InFlightJobs::new();
        let epoch = Arc::new(RwLock::new(0));

        runtime.spawn(run_worker(
            rx,
            Arc::clone(&cache),
            Arc::clone(&executor),
            in_flight.clone(),
            Arc::clone(&epoch),
        ));

        Ok(Self {
            cache,
            executor,
            in_flight,
            epoch,
            queue,
        })
    }

    /// Admit a target.
    ///
    /// Cache hits are applied before this returns and yield a ready future.
    /// Otherwise the returned future resolves once the job that owns the key
    /// finishes; the target node is written by then.
    pub fn schedule(&self, target: RenderTarget) -> BoxFuture<'static, RenderResult> {
        let classification = classify(&target.raw_content, target.declared_kind);
        let key = RenderKey::new(
            target.raw_content,
            target.display_mode,
            classification.kind,
        );
        let node = target.node;

        if let Some(entry) = self.cache.get(&key) {
            self.executor.apply_entry(node, &entry);
            return ready(node, classification, entry, ResultOrigin::Cache);
        }

        let epoch = *rw_read(&self.epoch, SOURCE, "schedule");
        let (rx, origin) = match self.in_flight.admit(key.clone(), node, epoch, &self.cache) {
            Admission::Cached(entry) => {
                self.executor.apply_entry(node, &entry);
                return ready(node, classification, entry, ResultOrigin::Cache);
            }
            Admission::Follower(rx) => {
                debug!(key = %key, node = %node, "Joined in-flight job");
                (rx, ResultOrigin::Coalesced)
            }
            Admission::Leader(slot, rx) => {
                debug!(key = %key, job_id = %slot.id, node = %node, "Queued job");
                if let Err(mpsc::error::SendError(slot)) = self.queue.send(slot) {
                    warn!(key = %key, "Render worker is gone, job dropped");
                    // Dropping the slot closes every receiver attached to it.
                    self.in_flight.finish(&slot);
                }
                (rx, ResultOrigin::Executed)
            }
        };

        let executor = Arc::clone(&self.executor);
        async move {
            match rx.await {
                Ok(outcome) => {
                    if origin == ResultOrigin::Coalesced {
                        executor.apply_entry(node, &outcome.entry);
                    }
                    build_result(node, classification, outcome.entry, origin)
                }
                Err(_) => {
                    warn!(key = %key, node = %node, "Job abandoned, showing raw content");
                    let entry = Arc::new(CacheEntry::fallback(key, 0.0));
                    executor.apply_entry(node, &entry);
                    build_result(node, classification, entry, origin)
                }
            }
        }
        .boxed()
    }

    /// Forget cached output and pending jobs. Jobs already running finish,
    /// but their results are no longer stored.
    pub fn reset(&self) {
        let mut epoch = rw_write(&self.epoch, SOURCE, "reset");
        *epoch += 1;
        self.in_flight.clear();
        self.cache.clear();
        info!(epoch = *epoch, "Render scheduler reset");
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn cache(&self) -> &TypesetCache {
        &self.cache
    }
}

fn ready(
    node: NodeId,
    classification: Classification,
    entry: Arc<CacheEntry>,
    origin: ResultOrigin,
) -> BoxFuture<'static, RenderResult> {
    future::ready(build_result(node, classification, entry, origin)).boxed()
}

fn build_result(
    node: NodeId,
    classification: Classification,
    entry: Arc<CacheEntry>,
    origin: ResultOrigin,
) -> RenderResult {
    RenderResult {
        node,
        kind: classification.kind,
        kind_source: classification.source,
        origin,
        used_fallback: entry.is_fallback(),
        duration_ms: entry.render_duration_ms,
        entry,
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Arc<JobSlot>>,
    cache: Arc<TypesetCache>,
    executor: Arc<Executor>,
    in_flight: InFlightJobs,
    epoch: Arc<RwLock<Epoch>>,
) {
    while let Some(slot) = rx.recv().await {
        slot.set_state(JobState::Running);
        let entry = match AssertUnwindSafe(executor.execute(slot.node, &slot.key))
            .catch_unwind()
            .await
        {
            Ok(entry) => entry,
            Err(_) => {
                error!(job_id = %slot.id, key = %slot.key, "Render job panicked");
                let entry = CacheEntry::fallback(slot.key.clone(), 0.0);
                executor.apply_entry(slot.node, &entry);
                entry
            }
        };
        let state = if entry.is_fallback() {
            JobState::Failed
        } else {
            JobState::Succeeded
        };

        let entry = {
            let current = rw_read(&epoch, SOURCE, "store");
            if *current == slot.epoch {
                cache.put(entry)
            } else {
                debug!(job_id = %slot.id, "Discarding result from before reset");
                Arc::new(entry)
            }
        };
        in_flight.finish(&slot);
        slot.resolve(JobOutcome { entry, state });
        debug!(job_id = %slot.id, key = %slot.key, state = ?slot.state(), "Job finished");
    }
    debug!("Render worker stopped");
}
