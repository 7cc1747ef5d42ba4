use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stagehand::engine::transitions::{run_transition, TransitionContext};
use stagehand::store::{InMemoryJobStore, Job, JobState, JobStore};
use stagehand::transfer::LocalTransferClient;
use stagehand::{EngineConfig, TransitionError};
use tempfile::TempDir;

fn test_context(store: Arc<InMemoryJobStore>) -> TransitionContext {
    TransitionContext {
        store,
        transfer: Arc::new(LocalTransferClient::new()),
        config: EngineConfig::new(1).with_hook_timeout(Duration::from_secs(2)),
    }
}

/// Job inserted into the store with its workdir already created.
fn stored_job(store: &InMemoryJobStore, dir: &TempDir, name: &str, state: JobState) -> Job {
    let workdir = dir.path().join(name);
    fs::create_dir_all(&workdir).unwrap();
    let job = Job::new(name, "wf", workdir).with_state(state);
    store.insert(job.clone());
    job
}

#[tokio::test]
async fn preprocess_success_writes_log_and_advances() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::StagedIn);
    job.preprocess = Some("/bin/echo prepared inputs".to_string());
    let ctx = test_context(store);

    run_transition(&ctx, &mut job).await.unwrap();

    assert_eq!(job.state, JobState::Preprocessed);
    let log = fs::read_to_string(job.working_directory.join("preprocess.log")).unwrap();
    assert!(log.contains("prepared inputs"));
}

#[tokio::test]
async fn preprocess_missing_executable_is_transition_error() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::StagedIn);
    job.preprocess = Some("/no/such/binary --flag".to_string());
    let ctx = test_context(store);

    let err = run_transition(&ctx, &mut job).await.unwrap_err();
    assert!(matches!(err, TransitionError::MissingExecutable { .. }));
    assert_eq!(job.state, JobState::StagedIn);
}

#[tokio::test]
async fn postprocess_nonzero_exit_fails_with_code() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::RunDone);
    job.postprocess = Some("/bin/false".to_string());
    let ctx = test_context(store);

    let err = run_transition(&ctx, &mut job).await.unwrap_err();
    match &err {
        TransitionError::HookFailed { hook, code, .. } => {
            assert_eq!(*hook, "postprocess");
            assert_eq!(*code, Some(1));
        }
        other => panic!("expected HookFailed, got {other}"),
    }
    // The worker records this message on the FAILED job
    assert!(err.to_string().contains("postprocess returned"));
}

#[tokio::test]
async fn hook_timeout_kills_subprocess() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::StagedIn);
    job.preprocess = Some("/bin/sleep 30".to_string());
    let mut ctx = test_context(store);
    ctx.config.hook_timeout = Duration::from_millis(300);

    let started = Instant::now();
    let err = run_transition(&ctx, &mut job).await.unwrap_err();
    assert!(matches!(err, TransitionError::HookTimeout { .. }));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "timed-out hook should be killed promptly"
    );
}

#[tokio::test]
async fn stage_in_links_parent_outputs() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());

    let parent = stored_job(&store, &dir, "parent", JobState::JobFinished);
    fs::write(parent.working_directory.join("alpha.result"), b"a").unwrap();
    fs::write(parent.working_directory.join("beta.result"), b"b").unwrap();
    fs::write(parent.working_directory.join("notes.txt"), b"n").unwrap();

    let mut child = stored_job(&store, &dir, "child", JobState::Ready);
    child.parents = vec![parent.id];
    child.input_files = vec!["*.result".to_string()];
    let ctx = test_context(store);

    run_transition(&ctx, &mut child).await.unwrap();

    assert_eq!(child.state, JobState::StagedIn);
    assert!(child.working_directory.join("alpha.result").exists());
    assert!(child.working_directory.join("beta.result").exists());
    assert!(!child.working_directory.join("notes.txt").exists());
}

#[tokio::test]
async fn stage_in_disambiguates_name_collisions() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());

    let parent_a = stored_job(&store, &dir, "pa", JobState::JobFinished);
    let parent_b = stored_job(&store, &dir, "pb", JobState::JobFinished);
    fs::write(parent_a.working_directory.join("out.dat"), b"a").unwrap();
    fs::write(parent_b.working_directory.join("out.dat"), b"b").unwrap();

    let mut child = stored_job(&store, &dir, "child", JobState::Ready);
    child.parents = vec![parent_a.id, parent_b.id];
    child.input_files = vec!["out.dat".to_string()];
    let ctx = test_context(store);

    run_transition(&ctx, &mut child).await.unwrap();

    let links: Vec<String> = fs::read_dir(&child.working_directory)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(links.len(), 2);
    assert!(links.iter().any(|n| n == "out.dat"));
    assert!(links.iter().any(|n| n.starts_with("out.dat_")));
}

#[tokio::test]
async fn stage_in_pulls_remote_url() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());

    let remote = dir.path().join("remote");
    fs::create_dir_all(&remote).unwrap();
    fs::write(remote.join("input.cfg"), b"settings").unwrap();

    let mut job = stored_job(&store, &dir, "a", JobState::Ready);
    job.stage_in_url = Some(remote.display().to_string());
    let ctx = test_context(store);

    run_transition(&ctx, &mut job).await.unwrap();
    assert_eq!(job.state, JobState::StagedIn);
    assert!(job.working_directory.join("input.cfg").exists());
}

#[tokio::test]
async fn stage_out_pushes_matches_and_finishes() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());

    let mut job = stored_job(&store, &dir, "a", JobState::Postprocessed);
    fs::write(job.working_directory.join("one.result"), b"1").unwrap();
    fs::write(job.working_directory.join("two.result"), b"2").unwrap();
    fs::write(job.working_directory.join("scratch.tmp"), b"x").unwrap();

    let remote = dir.path().join("results");
    job.stage_out_url = Some(remote.display().to_string());
    job.stage_out_files = vec!["*.result".to_string()];
    let ctx = test_context(store);

    run_transition(&ctx, &mut job).await.unwrap();

    assert_eq!(job.state, JobState::JobFinished);
    assert!(remote.join("one.result").exists());
    assert!(remote.join("two.result").exists());
    assert!(!remote.join("scratch.tmp").exists());
}

#[tokio::test]
async fn stage_out_without_url_just_finishes() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::Postprocessed);
    let ctx = test_context(store);

    run_transition(&ctx, &mut job).await.unwrap();
    assert_eq!(job.state, JobState::JobFinished);
}

#[tokio::test]
async fn stage_out_with_no_matches_still_finishes() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::Postprocessed);
    let remote = dir.path().join("results");
    job.stage_out_url = Some(remote.display().to_string());
    job.stage_out_files = vec!["*.result".to_string()];
    let ctx = test_context(store);

    run_transition(&ctx, &mut job).await.unwrap();
    assert_eq!(job.state, JobState::JobFinished);
    assert!(!remote.exists(), "no transfer should happen with no matches");
}

#[tokio::test]
async fn unhandled_timeout_with_handler_flag_but_no_command_restarts() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::RunTimeout);
    job.post_timeout_handler = true;
    let ctx = test_context(store);

    run_transition(&ctx, &mut job).await.unwrap();
    assert_eq!(job.state, JobState::RestartReady);
}

#[tokio::test]
async fn timeout_without_handler_flag_is_transition_error() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::RunTimeout);
    let ctx = test_context(store);

    let err = run_transition(&ctx, &mut job).await.unwrap_err();
    assert!(matches!(err, TransitionError::NoHandler("timeout")));
}

/// The handler subprocess is trusted to fix the state through the store; the
/// engine re-reads the authoritative record after it exits.
#[tokio::test]
async fn error_handler_side_channel_is_respected() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::RunError);
    job.post_error_handler = true;
    job.postprocess = Some("/bin/true".to_string());
    store.update(job.clone());

    // Simulate the handler having updated the store out-of-band
    store.batch_update_state(&[job.id], JobState::RestartReady);

    let ctx = test_context(store);
    run_transition(&ctx, &mut job).await.unwrap();
    assert_eq!(job.state, JobState::RestartReady);
}

#[tokio::test]
async fn error_handler_that_fixes_nothing_is_an_error() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::RunError);
    job.post_error_handler = true;
    job.postprocess = Some("/bin/true".to_string());
    store.update(job.clone());

    let ctx = test_context(store);
    let err = run_transition(&ctx, &mut job).await.unwrap_err();
    assert!(matches!(
        err,
        TransitionError::HandlerIgnored(JobState::RunError)
    ));
}

#[tokio::test]
async fn postprocess_log_records_handling_mode() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::RunTimeout);
    job.post_timeout_handler = true;
    job.postprocess = Some("/bin/true".to_string());
    store.update(job.clone());
    store.batch_update_state(&[job.id], JobState::RestartReady);

    let ctx = test_context(store);
    run_transition(&ctx, &mut job).await.unwrap();

    let log = fs::read_to_string(job.working_directory.join("postprocess.log")).unwrap();
    assert!(log.contains("RUN_TIMEOUT"));
}

#[tokio::test]
async fn run_transition_rejects_non_transition_states() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let mut job = stored_job(&store, &dir, "a", JobState::Running);
    let ctx = test_context(store);

    let err = run_transition(&ctx, &mut job).await.unwrap_err();
    assert!(matches!(err, TransitionError::NotProcessable(_)));
}
