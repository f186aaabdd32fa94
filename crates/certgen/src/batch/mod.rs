//! Batch certificate generation: admission, the priority queue, the worker
//! pool and per-job orchestration.

pub mod admission;
pub mod orchestrator;
pub mod pool;
pub mod queue;

pub use admission::{BatchAcceptance, BatchRequest, StudentInput};
pub use orchestrator::{BatchOutcome, BatchSettings, Orchestrator, DEFAULT_LIST_LIMIT};
pub use pool::BatchWorkerPool;
pub use queue::{work_queue, QueueReceiver, QueueSender, WorkUnit};

// Re-export crossbeam_channel for callers driving the pool directly
pub use crossbeam_channel;
