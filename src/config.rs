use std::time::Duration;

/// Configuration for the worker pool and transition engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent workers the pool spawns.
    pub worker_count: usize,
    /// How often a worker re-syncs its fair share of jobs from the store.
    pub refresh_period: Duration,
    /// Minimum loop cadence; a refresh cycle faster than this sleeps the rest.
    pub min_cycle: Duration,
    /// Wall-clock bound on one preprocess/postprocess subprocess.
    pub hook_timeout: Duration,
    /// Restrict workers to jobs tagged with this workflow.
    pub workflow_filter: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            refresh_period: Duration::from_secs(5),
            min_cycle: Duration::from_secs(1),
            hook_timeout: Duration::from_secs(300),
            workflow_filter: None,
        }
    }
}

impl EngineConfig {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow_filter = Some(workflow.into());
        self
    }

    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }
}
