//! Transitive classification of package repository artifacts by their use of forbidden internal
//! APIs.
//!
//! Projects are resolved to versions, every version is downloaded, analyzed and has its direct
//! dependencies resolved, and the dependees found that way are fed back into the same pipeline.
//! An artifact is finalized into a [`ClosureRecord`] once it and all of its dependees are
//! finalized.

// Core infrastructure modules
pub mod core;

// Data model
pub mod artifact;
pub mod coordinates;
pub mod task;

// Pipeline
pub mod channel;
pub mod closure;
pub mod collaborators;
pub mod graph;
pub mod orchestrator;
pub mod persistence;

// Re-exports for convenience
pub use crate::core::config::{AnalysisConfig, AnalysisConfigBuilder, WorkerCounts};
pub use crate::core::errors::{DepwallError, Result};

pub use artifact::{
    AnalyzedArtifact, DownloadedArtifact, FailedArtifact, FailedProject, ResolvedArtifact,
    ResolvedProject, StageFailure, Violation,
};
pub use closure::{ClosureEngine, ClosureRecord, InternalDependencies};
pub use collaborators::{
    Analyzer, Collaborators, DependencyResolver, Downloader, JsonLinesSink, LoggingSink,
    OutputSink, ProjectListFile, ProjectSource, StaticProjects, VersionResolver,
};
pub use coordinates::{ArtifactCoordinates, ProjectCoordinates};
pub use graph::AnalysisGraph;
pub use orchestrator::{AnalysisChannels, Orchestrator, OrchestratorHandle, WorkerPool};
pub use persistence::{AnalysisPersistence, InMemoryPersistence, YamlPersistence};
pub use task::{Task, TaskState, TaskStateKind};
