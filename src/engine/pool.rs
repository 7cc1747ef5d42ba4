//! Pool lifecycle: spawn a configurable number of workers, terminate them
//! gracefully.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::engine::worker::{run_worker, WorkerContext};
use crate::store::JobStore;
use crate::transfer::TransferClient;

/// Owns the worker tasks and the cooperative shutdown token.
///
/// Workers never handle interrupt signals themselves; the token is the only
/// stop mechanism, so an in-flight transition always completes before a
/// worker exits.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `config.worker_count` independent workers against the shared
    /// store. Each worker establishes its own view of the store through the
    /// shared handle; no other state is shared between them.
    pub fn start(
        store: Arc<dyn JobStore>,
        transfer: Arc<dyn TransferClient>,
        config: EngineConfig,
    ) -> Self {
        Self::start_with_token(store, transfer, config, CancellationToken::new())
    }

    /// Like [`start`](Self::start), but driven by an externally owned token
    /// (e.g. one cancelled by the signal handler).
    pub fn start_with_token(
        store: Arc<dyn JobStore>,
        transfer: Arc<dyn TransferClient>,
        config: EngineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        tracing::debug!(worker_count = config.worker_count, "starting workers");
        let handles = (0..config.worker_count as u64)
            .map(|id| {
                let ctx = WorkerContext {
                    id: id + 1,
                    store: store.clone(),
                    transfer: transfer.clone(),
                    config: config.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(run_worker(ctx))
            })
            .collect();
        Self { handles, shutdown }
    }

    /// Token workers are watching; cancel it to request a graceful stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal a graceful stop and block until every worker has exited.
    pub async fn terminate(self) {
        tracing::debug!("signalling shutdown and waiting on workers");
        self.shutdown.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task join failed");
            }
        }
        tracing::debug!("all workers joined: done");
    }
}
