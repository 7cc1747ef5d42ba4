//! One worker: acquire a fair share of transitionable jobs, fast-forward,
//! transition, flush, release, repeat until shutdown.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::engine::cache::WorkerJobCache;
use crate::engine::fast_forward::fast_forward;
use crate::engine::transitions::{has_transition, run_transition, TransitionContext};
use crate::store::{JobState, JobStore, WorkerId, PROCESSABLE_STATES};
use crate::transfer::TransferClient;

/// Everything one worker needs; cloned into its spawned task.
#[derive(Clone)]
pub struct WorkerContext {
    pub id: WorkerId,
    pub store: Arc<dyn JobStore>,
    pub transfer: Arc<dyn TransferClient>,
    pub config: EngineConfig,
    pub shutdown: CancellationToken,
}

/// Worker entry point.
///
/// The loop body runs in an inner task so a panic (a programming error such
/// as conflicting postprocess handler flags) is isolated at the join
/// boundary; in every case the worker releases all jobs it still owns before
/// exiting, so no lock is leaked.
pub async fn run_worker(ctx: WorkerContext) {
    ctx.store.start_tick(ctx.id);

    let inner_ctx = ctx.clone();
    let result = tokio::spawn(worker_loop(inner_ctx)).await;
    match result {
        Ok(()) => tracing::info!(worker_id = ctx.id, "worker loop exited"),
        Err(e) => tracing::error!(worker_id = ctx.id, error = %e, "worker loop aborted"),
    }

    ctx.store.release_all_owned_by(ctx.id);
    tracing::debug!(worker_id = ctx.id, "worker finished: released all jobs");
}

async fn worker_loop(ctx: WorkerContext) {
    let transition_ctx = TransitionContext {
        store: ctx.store.clone(),
        transfer: ctx.transfer.clone(),
        config: ctx.config.clone(),
    };
    let mut cache = WorkerJobCache::new();
    let mut last_refresh: Option<Instant> = None;

    while !ctx.shutdown.is_cancelled() {
        // Re-sync the in-memory cache of locked jobs at most every
        // refresh_period, enforcing the minimum loop cadence by sleeping the
        // residual so the store isn't hammered.
        let elapsed = last_refresh.map(|t| t.elapsed());
        if cache.is_empty() || elapsed.map_or(true, |e| e > ctx.config.refresh_period) {
            refresh_cache(&ctx, &mut cache);
            last_refresh = Some(Instant::now());
            if let Some(elapsed) = elapsed {
                if elapsed < ctx.config.min_cycle {
                    tokio::select! {
                        _ = tokio::time::sleep(ctx.config.min_cycle - elapsed) => {}
                        _ = ctx.shutdown.cancelled() => break,
                    }
                }
            }
        }

        fast_forward(&mut cache, ctx.store.as_ref());
        cache.release_unprocessable(ctx.store.as_ref(), ctx.id);

        // One transition per cached job. A TransitionError fails that job
        // only; the pass continues. Shutdown is observed between jobs so an
        // in-flight subprocess-bound transition always completes.
        let mut transitions_run = 0usize;
        for entry in cache.iter_mut() {
            if ctx.shutdown.is_cancelled() {
                break;
            }
            if !has_transition(entry.job.state) {
                continue;
            }
            transitions_run += 1;
            match run_transition(&transition_ctx, &mut entry.job).await {
                Ok(()) => {}
                Err(e) => {
                    tracing::error!(
                        job_id = %entry.job.id,
                        state = %entry.job.state,
                        error = %e,
                        "transition failed: marking FAILED"
                    );
                    entry.job.last_error = Some(e.to_string());
                    entry.job.state = JobState::Failed;
                }
            }
        }

        cache.flush(ctx.store.as_ref());
        cache.release_unprocessable(ctx.store.as_ref(), ctx.id);

        // Nothing ran this pass (empty cache, or only jobs parked awaiting
        // parents): idle briefly instead of spinning until the next refresh.
        if transitions_run == 0 {
            tokio::select! {
                _ = tokio::time::sleep(ctx.config.min_cycle) => {}
                _ = ctx.shutdown.cancelled() => break,
            }
        }
    }
    tracing::info!(worker_id = ctx.id, "shutdown requested: exiting main loop");
}

/// Acquire this worker's fair share of currently-transitionable jobs:
/// ceil(total / worker_count), minus what is already cached.
fn refresh_cache(ctx: &WorkerContext, cache: &mut WorkerJobCache) {
    ctx.store.tick(ctx.id);
    let num_transitionable = ctx.store.count_by_state(&PROCESSABLE_STATES);
    let target = num_transitionable.div_ceil(ctx.config.worker_count.max(1));
    let num_to_acquire = target.saturating_sub(cache.len());
    if num_to_acquire == 0 {
        return;
    }
    let acquired = ctx.store.acquire(
        ctx.id,
        ctx.config.workflow_filter.as_deref(),
        num_to_acquire,
    );
    if !acquired.is_empty() {
        tracing::debug!(
            worker_id = ctx.id,
            count = acquired.len(),
            "acquired new jobs"
        );
        cache.extend(acquired);
    }
}
