//! Transition functions: one lifecycle step per job.
//!
//! Each function mutates `job.state` to the correct successor on success or
//! returns a [`TransitionError`] the worker converts to FAILED. Subprocess
//! hooks run in the job's working directory with stdout+stderr captured to
//! `preprocess.log` / `postprocess.log`, bounded by the configured timeout.

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::TransitionError;
use crate::store::{Job, JobState, JobStore};
use crate::transfer::TransferClient;
use crate::util::log_tail;

const LOG_TAIL_LINES: usize = 30;

/// Shared services a transition needs besides the job itself.
#[derive(Clone)]
pub struct TransitionContext {
    pub store: Arc<dyn JobStore>,
    pub transfer: Arc<dyn TransferClient>,
    pub config: EngineConfig,
}

/// Whether a transition function is defined for this state. Jobs in other
/// processable states (CREATED, AWAITING_PARENTS) are settled by fast-forward
/// and just stay cached.
pub fn has_transition(state: JobState) -> bool {
    matches!(
        state,
        JobState::Ready
            | JobState::StagedIn
            | JobState::RunDone
            | JobState::RunTimeout
            | JobState::RunError
            | JobState::Postprocessed
    )
}

/// Dispatch on the job's current state. States with no transition defined
/// here belong to the launcher or are terminal.
pub async fn run_transition(
    ctx: &TransitionContext,
    job: &mut Job,
) -> Result<(), TransitionError> {
    match job.state {
        JobState::Ready => stage_in(ctx, job).await,
        JobState::StagedIn => preprocess(ctx, job).await,
        JobState::RunDone => postprocess(ctx, job, false, false).await,
        JobState::RunTimeout => handle_timeout(ctx, job).await,
        JobState::RunError => handle_run_error(ctx, job).await,
        JobState::Postprocessed => stage_out(ctx, job).await,
        other => Err(TransitionError::NotProcessable(other)),
    }
}

/// Stage remote inputs and link parent outputs into the working directory.
pub async fn stage_in(ctx: &TransitionContext, job: &mut Job) -> Result<(), TransitionError> {
    tracing::debug!(job_id = %job.id, "in stage_in");

    let work_dir = job.working_directory.clone();
    if !work_dir.exists() {
        std::fs::create_dir_all(&work_dir)?;
        tracing::debug!(job_id = %job.id, workdir = %work_dir.display(), "created working directory");
    }

    if let Some(url_in) = &job.stage_in_url {
        tracing::info!(job_id = %job.id, url = %url_in, "transfer in");
        ctx.transfer.stage_in(url_in, &work_dir)?;
    }

    // Link every input-file pattern match from each parent's working
    // directory into ours, disambiguating name collisions with a short
    // parent-id suffix.
    let mut matches: Vec<(Uuid, PathBuf)> = Vec::new();
    for parent_id in &job.parents {
        let Some(parent) = ctx.store.get(*parent_id) else {
            tracing::warn!(job_id = %job.id, parent_id = %parent_id, "parent not found in store");
            continue;
        };
        for pattern in &job.input_files {
            let full = parent.working_directory.join(pattern);
            let full = full.to_string_lossy();
            let paths = glob::glob(&full)
                .map_err(|e| TransitionError::BadPattern(pattern.clone(), e))?;
            matches.extend(paths.flatten().map(|p| (*parent_id, p)));
        }
    }

    for (parent_id, input_file) in matches {
        let base = input_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut link_path = work_dir.join(&base);
        if link_path.exists() {
            let suffix = parent_id.simple().to_string()[..8].to_string();
            link_path = work_dir.join(format!("{base}_{suffix}"));
        }
        tracing::info!(
            job_id = %job.id,
            link = %link_path.display(),
            target = %input_file.display(),
            "linking parent output"
        );
        symlink(&input_file, &link_path).map_err(|e| TransitionError::Symlink {
            src: input_file,
            dest: link_path,
            source: e,
        })?;
    }

    job.state = JobState::StagedIn;
    tracing::info!(job_id = %job.id, "stage_in done");
    Ok(())
}

/// Run the preprocess hook, if any.
pub async fn preprocess(ctx: &TransitionContext, job: &mut Job) -> Result<(), TransitionError> {
    tracing::debug!(job_id = %job.id, "in preprocess");

    let Some(command) = job.preprocess.clone() else {
        // Fast-forward normally bypasses this case.
        job.state = JobState::Preprocessed;
        return Ok(());
    };

    let header = format!("# stagehand preprocessor: {command}\n");
    run_hook(job, "preprocess", &command, &header, false, false, ctx.config.hook_timeout).await?;

    job.state = JobState::Preprocessed;
    tracing::info!(job_id = %job.id, "preprocess done");
    Ok(())
}

/// Run the postprocess hook, optionally in error- or timeout-handling mode.
///
/// Both handling flags at once is a programming error and panics; the worker
/// catches the panic at its task boundary and releases all owned locks.
///
/// A handler subprocess is trusted to fix the job state out-of-band through
/// the store; after it exits the authoritative state is re-read and the
/// expected post-condition validated.
pub async fn postprocess(
    ctx: &TransitionContext,
    job: &mut Job,
    error_handling: bool,
    timeout_handling: bool,
) -> Result<(), TransitionError> {
    assert!(
        !(error_handling && timeout_handling),
        "postprocess invoked with both error-handling and timeout-handling"
    );
    tracing::debug!(job_id = %job.id, error_handling, timeout_handling, "in postprocess");

    let Some(command) = job.postprocess.clone() else {
        if error_handling {
            return Err(TransitionError::NoHandler("error"));
        }
        if timeout_handling {
            job.state = JobState::RestartReady;
            tracing::warn!(job_id = %job.id, "unhandled timeout: marked RESTART_READY");
            return Ok(());
        }
        job.state = JobState::Postprocessed;
        tracing::info!(job_id = %job.id, "no postprocess: skipped");
        return Ok(());
    };

    let mut header = format!("# stagehand postprocessor: {command}\n");
    if timeout_handling {
        header.push_str("# Invoked to handle RUN_TIMEOUT\n");
    }
    if error_handling {
        header.push_str("# Invoked to handle RUN_ERROR\n");
    }
    run_hook(
        job,
        "postprocess",
        &command,
        &header,
        error_handling,
        timeout_handling,
        ctx.config.hook_timeout,
    )
    .await?;

    // The handler may have fixed the state via the store; re-read the
    // authoritative record.
    if let Some(fresh) = ctx.store.get(job.id) {
        job.state = fresh.state;
    }

    if error_handling && job.state == JobState::RunError {
        return Err(TransitionError::HandlerIgnored(JobState::RunError));
    }
    if timeout_handling && job.state == JobState::RunTimeout {
        return Err(TransitionError::HandlerIgnored(JobState::RunTimeout));
    }
    if !(error_handling || timeout_handling) {
        job.state = JobState::Postprocessed;
    }
    tracing::info!(job_id = %job.id, state = %job.state, "postprocess done");
    Ok(())
}

/// Safety net for RUN_TIMEOUT jobs fast-forward did not settle.
pub async fn handle_timeout(ctx: &TransitionContext, job: &mut Job) -> Result<(), TransitionError> {
    if job.post_timeout_handler {
        tracing::debug!(job_id = %job.id, "invoking postprocess with timeout handling");
        postprocess(ctx, job, false, true).await
    } else {
        Err(TransitionError::NoHandler("timeout"))
    }
}

/// Safety net for RUN_ERROR jobs fast-forward did not settle.
pub async fn handle_run_error(
    ctx: &TransitionContext,
    job: &mut Job,
) -> Result<(), TransitionError> {
    if job.post_error_handler {
        tracing::debug!(job_id = %job.id, "invoking postprocess with error handling");
        postprocess(ctx, job, true, false).await
    } else {
        Err(TransitionError::NoHandler("error"))
    }
}

/// Copy stage-out matches into a scoped staging directory and push it to the
/// remote URL. The staging directory is removed on all exit paths.
pub async fn stage_out(ctx: &TransitionContext, job: &mut Job) -> Result<(), TransitionError> {
    tracing::debug!(job_id = %job.id, "in stage_out");

    let Some(url_out) = job.stage_out_url.clone() else {
        job.state = JobState::JobFinished;
        tracing::info!(job_id = %job.id, "no stage_out_url: done");
        return Ok(());
    };

    let work_dir = &job.working_directory;
    let mut matches: Vec<PathBuf> = Vec::new();
    for pattern in &job.stage_out_files {
        let full = work_dir.join(pattern);
        let full = full.to_string_lossy();
        let paths =
            glob::glob(&full).map_err(|e| TransitionError::BadPattern(pattern.clone(), e))?;
        matches.extend(paths.flatten());
    }

    if !matches.is_empty() {
        tracing::info!(job_id = %job.id, count = matches.len(), url = %url_out, "staging files out");
        // Dropped (and deleted) on every path out of this scope.
        let staging = tempfile::tempdir()?;
        for file in &matches {
            let base = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            std::fs::copy(file, staging.path().join(base))?;
        }
        ctx.transfer.stage_out(staging.path(), &url_out)?;
    }

    job.state = JobState::JobFinished;
    tracing::info!(job_id = %job.id, "stage_out done");
    Ok(())
}

/// Spawn one hook subprocess in the job's working directory with stdout and
/// stderr redirected to `<hook>.log` (overwritten each run), kill it if it
/// outlives `timeout`, and fail on non-zero exit with the log tail attached.
async fn run_hook(
    job: &Job,
    hook: &'static str,
    command: &str,
    log_header: &str,
    error_handling: bool,
    timeout_handling: bool,
    timeout: Duration,
) -> Result<(), TransitionError> {
    let mut args = command.split_whitespace();
    let Some(exe) = args.next() else {
        return Err(TransitionError::MissingExecutable {
            hook,
            path: command.to_string(),
        });
    };
    if !Path::new(exe).exists() {
        return Err(TransitionError::MissingExecutable {
            hook,
            path: exe.to_string(),
        });
    }

    let log_path = job.working_directory.join(format!("{hook}.log"));
    let mut log_file = File::create(&log_path)?;
    log_file.write_all(log_header.as_bytes())?;
    log_file.flush()?;
    let stderr_file = log_file.try_clone()?;

    tracing::info!(job_id = %job.id, hook, command, "spawning hook");
    let mut child = Command::new(exe)
        .args(args)
        .current_dir(&job.working_directory)
        .envs(job.env_vars(error_handling, timeout_handling))
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(stderr_file))
        .spawn()?;

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(wait_result) => wait_result?,
        Err(_) => {
            tracing::warn!(job_id = %job.id, hook, "hook timed out, killing");
            child.kill().await.ok();
            return Err(TransitionError::HookTimeout {
                hook,
                seconds: timeout.as_secs(),
            });
        }
    };

    if !status.success() {
        return Err(TransitionError::HookFailed {
            hook,
            code: status.code(),
            tail: log_tail(&log_path, LOG_TAIL_LINES),
        });
    }
    Ok(())
}
