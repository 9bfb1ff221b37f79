// Infrastructure shared by every part of the pipeline

pub mod config;
pub mod errors;
pub mod logging;

// Re-export commonly used types
pub use config::{AnalysisConfig, AnalysisConfigBuilder, WorkerCounts};
pub use errors::{DepwallError, Result};
