use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle states a job moves through.
///
/// `Preprocessed`, `RestartReady` and `Running` are owned by the external
/// launcher; `JobFinished` and `Failed` are terminal. Everything else is
/// processable by the transition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    AwaitingParents,
    Ready,
    StagedIn,
    Preprocessed,
    RestartReady,
    Running,
    RunDone,
    RunTimeout,
    RunError,
    Postprocessed,
    JobFinished,
    Failed,
}

/// States a worker may acquire and transition.
pub const PROCESSABLE_STATES: [JobState; 8] = [
    JobState::Created,
    JobState::AwaitingParents,
    JobState::Ready,
    JobState::StagedIn,
    JobState::RunDone,
    JobState::RunTimeout,
    JobState::RunError,
    JobState::Postprocessed,
];

impl JobState {
    pub fn is_processable(&self) -> bool {
        PROCESSABLE_STATES.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::JobFinished | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(f, "CREATED"),
            JobState::AwaitingParents => write!(f, "AWAITING_PARENTS"),
            JobState::Ready => write!(f, "READY"),
            JobState::StagedIn => write!(f, "STAGED_IN"),
            JobState::Preprocessed => write!(f, "PREPROCESSED"),
            JobState::RestartReady => write!(f, "RESTART_READY"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::RunDone => write!(f, "RUN_DONE"),
            JobState::RunTimeout => write!(f, "RUN_TIMEOUT"),
            JobState::RunError => write!(f, "RUN_ERROR"),
            JobState::Postprocessed => write!(f, "POSTPROCESSED"),
            JobState::JobFinished => write!(f, "JOB_FINISHED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

/// A workflow job and everything a transition needs to advance it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub workflow: String,
    pub state: JobState,
    /// Created lazily on first need.
    pub working_directory: PathBuf,
    /// Glob patterns matched against parent working directories at stage-in.
    #[serde(default)]
    pub input_files: Vec<String>,
    #[serde(default)]
    pub stage_in_url: Option<String>,
    #[serde(default)]
    pub stage_out_url: Option<String>,
    /// Glob patterns selecting files to push at stage-out.
    #[serde(default)]
    pub stage_out_files: Vec<String>,
    #[serde(default)]
    pub preprocess: Option<String>,
    #[serde(default)]
    pub postprocess: Option<String>,
    /// The postprocess command also handles RUN_ERROR.
    #[serde(default)]
    pub post_error_handler: bool,
    /// The postprocess command also handles RUN_TIMEOUT.
    #[serde(default)]
    pub post_timeout_handler: bool,
    /// On timeout with no handler, retry automatically.
    #[serde(default)]
    pub auto_timeout_retry: bool,
    #[serde(default)]
    pub wait_for_parents: bool,
    #[serde(default)]
    pub parents: Vec<Uuid>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(name: impl Into<String>, workflow: impl Into<String>, workdir: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            workflow: workflow.into(),
            state: JobState::Created,
            working_directory: workdir,
            input_files: Vec::new(),
            stage_in_url: None,
            stage_out_url: None,
            stage_out_files: Vec::new(),
            preprocess: None,
            postprocess: None,
            post_error_handler: false,
            post_timeout_handler: false,
            auto_timeout_retry: false,
            wait_for_parents: false,
            parents: Vec::new(),
            last_error: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = state;
        self
    }

    pub fn with_parent(mut self, parent: Uuid) -> Self {
        self.parents.push(parent);
        self.wait_for_parents = true;
        self
    }

    pub fn with_preprocess(mut self, command: impl Into<String>) -> Self {
        self.preprocess = Some(command.into());
        self
    }

    pub fn with_postprocess(mut self, command: impl Into<String>) -> Self {
        self.postprocess = Some(command.into());
        self
    }

    /// Environment handed to preprocess/postprocess subprocesses.
    ///
    /// Handler subprocesses learn which condition they were invoked for from
    /// the `STAGEHAND_HANDLING_*` markers.
    pub fn env_vars(
        &self,
        error_handling: bool,
        timeout_handling: bool,
    ) -> Vec<(String, String)> {
        let mut envs = vec![
            ("STAGEHAND_JOB_ID".to_string(), self.id.to_string()),
            ("STAGEHAND_JOB_NAME".to_string(), self.name.clone()),
            (
                "STAGEHAND_WORKDIR".to_string(),
                self.working_directory.display().to_string(),
            ),
            ("STAGEHAND_WORKFLOW".to_string(), self.workflow.clone()),
        ];
        if error_handling {
            envs.push(("STAGEHAND_HANDLING_ERROR".to_string(), "1".to_string()));
        }
        if timeout_handling {
            envs.push(("STAGEHAND_HANDLING_TIMEOUT".to_string(), "1".to_string()));
        }
        envs
    }
}
