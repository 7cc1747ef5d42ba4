use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use uuid::Uuid;

use crate::store::job::{Job, JobState};
use crate::store::{JobStore, WorkerId};

#[derive(Debug)]
struct Slot {
    job: Job,
    locked_by: Option<WorkerId>,
    /// Insertion order, so acquire is deterministic.
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<Uuid, Slot>,
    next_seq: u64,
}

/// In-memory [`JobStore`] used by the binary and the test suite.
///
/// All operations take one mutex, which makes acquire trivially atomic:
/// concurrent callers serialize and a job can never be handed to two workers.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
    ticks: Mutex<HashMap<WorkerId, Instant>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.slots.insert(
            job.id,
            Slot {
                job,
                locked_by: None,
                seq,
            },
        );
    }

    /// Snapshot of every job, in insertion order.
    pub fn all_jobs(&self) -> Vec<Job> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut slots: Vec<&Slot> = inner.slots.values().collect();
        slots.sort_by_key(|s| s.seq);
        slots.iter().map(|s| s.job.clone()).collect()
    }

    /// Which worker currently owns the given job, if any.
    pub fn lock_owner(&self, id: Uuid) -> Option<WorkerId> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.slots.get(&id).and_then(|s| s.locked_by)
    }

    /// Overwrite a stored job in place, keeping its lock. This is the side
    /// channel a postprocess handler uses to fix up state out-of-band.
    pub fn update(&self, job: Job) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if let Some(slot) = inner.slots.get_mut(&job.id) {
            slot.job = job;
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn count_by_state(&self, states: &[JobState]) -> usize {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .slots
            .values()
            .filter(|s| states.contains(&s.job.state))
            .count()
    }

    fn acquire(&self, owner: WorkerId, workflow: Option<&str>, n: usize) -> Vec<Job> {
        if n == 0 {
            return Vec::new();
        }
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let mut candidates: Vec<(u64, Uuid)> = inner
            .slots
            .values()
            .filter(|s| {
                s.locked_by.is_none()
                    && s.job.state.is_processable()
                    && workflow.map_or(true, |wf| s.job.workflow == wf)
            })
            .map(|s| (s.seq, s.job.id))
            .collect();
        candidates.sort_unstable();

        let mut acquired = Vec::new();
        for (_, id) in candidates.into_iter().take(n) {
            let slot = inner.slots.get_mut(&id).expect("candidate vanished");
            slot.locked_by = Some(owner);
            acquired.push(slot.job.clone());
        }
        acquired
    }

    fn release(&self, owner: WorkerId, ids: &[Uuid]) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for id in ids {
            if let Some(slot) = inner.slots.get_mut(id) {
                if slot.locked_by == Some(owner) {
                    slot.locked_by = None;
                }
            }
        }
    }

    fn release_all_owned_by(&self, owner: WorkerId) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for slot in inner.slots.values_mut() {
            if slot.locked_by == Some(owner) {
                slot.locked_by = None;
            }
        }
    }

    fn batch_update_state(&self, ids: &[Uuid], new_state: JobState) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for id in ids {
            if let Some(slot) = inner.slots.get_mut(id) {
                slot.job.state = new_state;
            }
        }
    }

    fn record_error(&self, id: Uuid, message: &str) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if let Some(slot) = inner.slots.get_mut(&id) {
            slot.job.last_error = Some(message.to_string());
        }
    }

    fn get(&self, id: Uuid) -> Option<Job> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.slots.get(&id).map(|s| s.job.clone())
    }

    fn start_tick(&self, owner: WorkerId) {
        self.ticks
            .lock()
            .expect("tick mutex poisoned")
            .insert(owner, Instant::now());
    }

    fn tick(&self, owner: WorkerId) {
        self.ticks
            .lock()
            .expect("tick mutex poisoned")
            .insert(owner, Instant::now());
    }

    fn clear_stale_locks(&self) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for slot in inner.slots.values_mut() {
            slot.locked_by = None;
        }
    }
}
