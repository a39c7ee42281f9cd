use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use metrics::counter;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::cache::{CacheEntry, RenderKey, TypesetCache};
use crate::dom::NodeId;
use crate::util::lock::mutex_lock;

use super::types::JobState;

const SOURCE: &str = "render::runtime";
const METRIC_COALESCED: &str = "typeset_jobs_coalesced_total";

/// Generation counter bumped by every reset.
pub(crate) type Epoch = u64;

/// Result delivered to everyone waiting on a job.
#[derive(Debug, Clone)]
pub(crate) struct JobOutcome {
    pub entry: Arc<CacheEntry>,
    pub state: JobState,
}

/// A queued or running job plus everyone waiting on it.
#[derive(Debug)]
pub(crate) struct JobSlot {
    pub id: Uuid,
    pub key: RenderKey,
    /// Node written by the executor; followers write their own nodes.
    pub node: NodeId,
    pub epoch: Epoch,
    state: Mutex<JobState>,
    waiters: Mutex<Vec<oneshot::Sender<JobOutcome>>>,
}

impl JobSlot {
    fn new(key: RenderKey, node: NodeId, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            node,
            epoch,
            state: Mutex::new(JobState::Queued),
            waiters: Mutex::new(Vec::new()),
        }
    }

    fn attach(&self) -> oneshot::Receiver<JobOutcome> {
        let (tx, rx) = oneshot::channel();
        mutex_lock(&self.waiters, SOURCE, "attach").push(tx);
        rx
    }

    pub(crate) fn state(&self) -> JobState {
        *mutex_lock(&self.state, SOURCE, "state")
    }

    pub(crate) fn set_state(&self, state: JobState) {
        *mutex_lock(&self.state, SOURCE, "set_state") = state;
    }

    /// Deliver the outcome to every waiter. Receivers that went away are
    /// ignored.
    pub(crate) fn resolve(&self, outcome: JobOutcome) {
        self.set_state(outcome.state);
        let waiters = std::mem::take(&mut *mutex_lock(&self.waiters, SOURCE, "resolve"));
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// How a request was admitted by [`InFlightJobs::admit`].
pub(crate) enum Admission {
    /// The key landed in the cache while we were looking.
    Cached(Arc<CacheEntry>),
    /// Another job for the key is pending; wait for its outcome.
    Follower(oneshot::Receiver<JobOutcome>),
    /// A new job was registered and must be queued by the caller.
    Leader(Arc<JobSlot>, oneshot::Receiver<JobOutcome>),
}

/// Keys that currently have a queued or running job.
///
/// The worker writes the cache before calling [`finish`](Self::finish), and
/// `admit` re-reads the cache while holding the map entry, so a key is never
/// both absent from the map and missing from the cache once its job is done.
#[derive(Default, Clone)]
pub(crate) struct InFlightJobs {
    jobs: Arc<DashMap<RenderKey, Arc<JobSlot>>>,
}

impl InFlightJobs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn admit(
        &self,
        key: RenderKey,
        node: NodeId,
        epoch: Epoch,
        cache: &TypesetCache,
    ) -> Admission {
        use dashmap::mapref::entry::Entry;

        match self.jobs.entry(key) {
            Entry::Occupied(occupied) => {
                counter!(METRIC_COALESCED).increment(1);
                Admission::Follower(occupied.get().attach())
            }
            Entry::Vacant(vacant) => {
                if let Some(entry) = cache.peek(vacant.key()) {
                    return Admission::Cached(entry);
                }
                let slot = Arc::new(JobSlot::new(vacant.key().clone(), node, epoch));
                let rx = slot.attach();
                vacant.insert(Arc::clone(&slot));
                Admission::Leader(slot, rx)
            }
        }
    }

    /// Drop the registration for `slot`, unless a reset already replaced it.
    pub(crate) fn finish(&self, slot: &Arc<JobSlot>) {
        self.jobs
            .remove_if(&slot.key, |_, current| Arc::ptr_eq(current, slot));
    }

    pub(crate) fn clear(&self) {
        self.jobs.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }
}
