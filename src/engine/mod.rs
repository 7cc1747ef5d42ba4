//! The transition engine: worker-pool coordination, fast-forward
//! short-circuits and the per-state transition functions.
//!
//! # Execution flow
//!
//! 1. [`WorkerPool`] spawns N workers bound to a shared [`crate::store::JobStore`]
//! 2. Each worker acquires its fair share of transitionable jobs
//! 3. [`fast_forward`](fast_forward::fast_forward) advances trivial no-op
//!    transitions without subprocesses
//! 4. [`run_transition`](transitions::run_transition) performs one real
//!    lifecycle step per job (stage-in, hooks, stage-out)
//! 5. State changes are flushed in bulk and finished jobs released

pub mod cache;
pub mod fast_forward;
pub mod pool;
pub mod transitions;
pub mod worker;

pub use cache::WorkerJobCache;
pub use pool::WorkerPool;
pub use transitions::TransitionContext;
