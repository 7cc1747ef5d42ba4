//! Batch short-circuit pass over a worker's cache.
//!
//! Advances jobs through transitions that have no real work to do without
//! spending a subprocess invocation. Sub-passes run in a fixed order:
//! dependency resolution must happen before stage-in eligibility is judged
//! within the same pass.

use std::fs;

use crate::engine::cache::WorkerJobCache;
use crate::store::{Job, JobState, JobStore};

/// Run every short-circuit sub-pass over the cache, then bulk write-back.
///
/// Idempotent: a second call with no external state change writes nothing.
pub fn fast_forward(cache: &mut WorkerJobCache, store: &dyn JobStore) {
    check_parents_pass(cache, store);
    skip_stage_in_pass(cache);
    skip_preprocess_pass(cache);
    skip_postprocess_pass(cache);
    timeout_retry_pass(cache);
    timeout_fail_pass(cache);
    error_fail_pass(cache);
    skip_stage_out_pass(cache);
    cache.flush(store);
}

/// Dependency readiness for one job: no parents (or not waiting on them), or
/// every parent finished.
fn parents_satisfied(job: &Job, store: &dyn JobStore) -> bool {
    if job.parents.is_empty() || !job.wait_for_parents {
        return true;
    }
    job.parents.iter().all(|pid| {
        store
            .get(*pid)
            .map(|p| p.state == JobState::JobFinished)
            .unwrap_or(false)
    })
}

fn check_parents_pass(cache: &mut WorkerJobCache, store: &dyn JobStore) {
    for entry in cache.iter_mut().filter(|e| {
        matches!(e.job.state, JobState::Created | JobState::AwaitingParents)
    }) {
        if parents_satisfied(&entry.job, store) {
            entry.job.state = JobState::Ready;
            tracing::debug!(job_id = %entry.job.id, "job ready");
        } else if entry.job.state != JobState::AwaitingParents {
            entry.job.state = JobState::AwaitingParents;
            tracing::debug!(
                job_id = %entry.job.id,
                parents = entry.job.parents.len(),
                "waiting for parents"
            );
        }
    }
}

fn skip_stage_in_pass(cache: &mut WorkerJobCache) {
    for entry in cache.iter_mut().filter(|e| e.job.state == JobState::Ready) {
        let job = &mut entry.job;
        if !job.working_directory.exists() {
            if let Err(e) = fs::create_dir_all(&job.working_directory) {
                tracing::error!(
                    job_id = %job.id,
                    workdir = %job.working_directory.display(),
                    error = %e,
                    "could not create working directory"
                );
                job.last_error = Some(format!("could not create working directory: {e}"));
                job.state = JobState::Failed;
                continue;
            }
            tracing::debug!(
                job_id = %job.id,
                workdir = %job.working_directory.display(),
                "created working directory"
            );
        }
        let has_parents = !job.parents.is_empty();
        let has_input = !job.input_files.is_empty();
        let has_remote = job.stage_in_url.is_some();
        if !has_remote && !(has_parents && has_input) {
            job.state = JobState::StagedIn;
        }
    }
}

fn skip_preprocess_pass(cache: &mut WorkerJobCache) {
    for entry in cache
        .iter_mut()
        .filter(|e| e.job.state == JobState::StagedIn && e.job.preprocess.is_none())
    {
        entry.job.state = JobState::Preprocessed;
    }
}

fn skip_postprocess_pass(cache: &mut WorkerJobCache) {
    for entry in cache
        .iter_mut()
        .filter(|e| e.job.state == JobState::RunDone && e.job.postprocess.is_none())
    {
        entry.job.state = JobState::Postprocessed;
    }
}

fn timeout_retry_pass(cache: &mut WorkerJobCache) {
    for entry in cache.iter_mut().filter(|e| {
        e.job.state == JobState::RunTimeout
            && e.job.auto_timeout_retry
            && !e.job.post_timeout_handler
    }) {
        entry.job.state = JobState::RestartReady;
        tracing::debug!(job_id = %entry.job.id, "timeout auto-retry");
    }
}

fn timeout_fail_pass(cache: &mut WorkerJobCache) {
    for entry in cache.iter_mut().filter(|e| {
        e.job.state == JobState::RunTimeout
            && !e.job.auto_timeout_retry
            && !(e.job.postprocess.is_some() && e.job.post_timeout_handler)
    }) {
        entry.job.state = JobState::Failed;
        entry.job.last_error = Some("run timed out with no handler or auto-retry".to_string());
    }
}

fn error_fail_pass(cache: &mut WorkerJobCache) {
    for entry in cache.iter_mut().filter(|e| {
        e.job.state == JobState::RunError
            && !(e.job.post_error_handler && e.job.postprocess.is_some())
    }) {
        entry.job.state = JobState::Failed;
        entry.job.last_error = Some("run failed with no error handler".to_string());
    }
}

fn skip_stage_out_pass(cache: &mut WorkerJobCache) {
    for entry in cache.iter_mut().filter(|e| {
        e.job.state == JobState::Postprocessed
            && !(e.job.stage_out_url.is_some() && !e.job.stage_out_files.is_empty())
    }) {
        entry.job.state = JobState::JobFinished;
    }
}
