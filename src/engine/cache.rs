use std::collections::HashMap;

use uuid::Uuid;

use crate::store::{Job, JobState, JobStore, WorkerId};

/// One locked job plus the state last written to the store, so the cache can
/// tell which records need a write-back.
#[derive(Debug)]
pub struct CachedJob {
    pub job: Job,
    last_written: JobState,
}

impl CachedJob {
    fn new(job: Job) -> Self {
        let last_written = job.state;
        Self { job, last_written }
    }

    pub fn is_dirty(&self) -> bool {
        self.job.state != self.last_written
    }
}

/// Worker-local ordered collection of jobs this worker has locked.
///
/// Never shared between workers; all cross-worker coordination goes through
/// the store's acquire/release protocol.
#[derive(Debug, Default)]
pub struct WorkerJobCache {
    entries: Vec<CachedJob>,
}

impl WorkerJobCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extend(&mut self, jobs: Vec<Job>) {
        self.entries.extend(jobs.into_iter().map(CachedJob::new));
    }

    pub fn iter(&self) -> impl Iterator<Item = &CachedJob> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CachedJob> {
        self.entries.iter_mut()
    }

    /// Bulk write-back: group jobs whose in-memory state changed since the
    /// last write by new state and apply one atomic batch update per state.
    /// FAILED jobs also persist their failure message.
    pub fn flush(&mut self, store: &dyn JobStore) {
        let mut by_state: HashMap<JobState, Vec<Uuid>> = HashMap::new();
        for entry in self.entries.iter_mut().filter(|e| e.is_dirty()) {
            by_state.entry(entry.job.state).or_default().push(entry.job.id);
            if entry.job.state == JobState::Failed {
                if let Some(message) = &entry.job.last_error {
                    store.record_error(entry.job.id, message);
                }
            }
            entry.last_written = entry.job.state;
        }
        for (state, ids) in by_state {
            tracing::debug!(state = %state, count = ids.len(), "batch state update");
            store.batch_update_state(&ids, state);
        }
    }

    /// Unlock and drop every job no longer in a processable state. Writes no
    /// new state; callers flush first.
    pub fn release_unprocessable(&mut self, store: &dyn JobStore, owner: WorkerId) {
        let released: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|e| !e.job.state.is_processable())
            .map(|e| e.job.id)
            .collect();
        if released.is_empty() {
            return;
        }
        store.release(owner, &released);
        self.entries.retain(|e| e.job.state.is_processable());
        tracing::debug!(worker_id = owner, count = released.len(), "released jobs");
    }
}
