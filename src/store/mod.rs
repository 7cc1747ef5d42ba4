//! Job persistence and the locking protocol between workers.
//!
//! The engine only depends on the [`JobStore`] trait; the backing store is a
//! collaborator with a narrow contract. Acquire/release is the sole mutual
//! exclusion mechanism between workers: a job is owned by at most one worker
//! at a time.

pub mod job;
pub mod memory;

use uuid::Uuid;

pub use job::{Job, JobState, PROCESSABLE_STATES};
pub use memory::InMemoryJobStore;

/// Identifies one worker for lock ownership and lease ticks.
pub type WorkerId = u64;

/// Contract the transition engine needs from a job store.
///
/// `acquire` must be atomic: a job returned to one worker is locked and will
/// not be returned to another until released. `batch_update_state` is atomic
/// for the given group of ids.
pub trait JobStore: Send + Sync {
    /// Number of jobs currently in any of the given states.
    fn count_by_state(&self, states: &[JobState]) -> usize;

    /// Lock up to `n` processable, unlocked jobs (restricted to `workflow`
    /// when set) and return those actually acquired. May return fewer.
    fn acquire(&self, owner: WorkerId, workflow: Option<&str>, n: usize) -> Vec<Job>;

    /// Unlock the given jobs without altering state. Ids not owned by
    /// `owner` are ignored.
    fn release(&self, owner: WorkerId, ids: &[Uuid]);

    /// Unlock every job owned by `owner`.
    fn release_all_owned_by(&self, owner: WorkerId);

    /// Atomically set `new_state` on all the given jobs.
    fn batch_update_state(&self, ids: &[Uuid], new_state: JobState);

    /// Persist a failure message alongside a FAILED update.
    fn record_error(&self, id: Uuid, message: &str);

    /// Authoritative re-read of one job (parent lookups, and validating the
    /// postprocess side channel).
    fn get(&self, id: Uuid) -> Option<Job>;

    /// Begin a heartbeat/lease for `owner`.
    fn start_tick(&self, owner: WorkerId);

    /// Refresh `owner`'s lease.
    fn tick(&self, owner: WorkerId);

    /// Startup/recovery hook: drop locks left behind by dead workers.
    fn clear_stale_locks(&self);
}
