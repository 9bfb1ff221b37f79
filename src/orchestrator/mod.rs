//! Bookkeeping loop and worker pools.
//!
//! The [`Orchestrator`] is the only code that mutates the graph and the closure engine. Workers
//! hold an [`OrchestratorHandle`] and talk to it exclusively through the stage channels.

pub mod channels;
pub mod manager;
pub mod workers;

pub use channels::{AnalysisChannels, QueueDepths};
pub use manager::{Orchestrator, OrchestratorHandle, OrchestratorStats};
pub use workers::WorkerPool;
