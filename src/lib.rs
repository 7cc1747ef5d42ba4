pub mod config;
pub mod engine;
pub mod error;
pub mod platform;
pub mod shutdown;
pub mod store;
pub mod transfer;
pub mod util;

pub use config::EngineConfig;
pub use engine::WorkerPool;
pub use error::{EngineError, TransferError, TransitionError};
pub use store::{InMemoryJobStore, Job, JobState, JobStore};
pub use transfer::{LocalTransferClient, TransferClient};
