//! Durable record of an analysis so an interrupted run can resume.
//!
//! The store sees every result and error produced by the stage workers (through spying
//! channels) and every finalized closure record. On start-up its contents seed the replay
//! buffers of the stage channels and the closure engine.

pub mod channels;
pub mod memory;
pub mod model;
pub mod yaml;

pub use channels::{PersistenceChannels, PersistenceRecorder};
pub use memory::InMemoryPersistence;
pub use model::{PersistedAnalysis, PersistedClosure};
pub use yaml::YamlPersistence;

use crate::artifact::{
    AnalyzedArtifact, DownloadedArtifact, FailedArtifact, FailedProject, ResolvedArtifact,
    ResolvedProject,
};
use crate::closure::ClosureRecord;
use crate::coordinates::ProjectCoordinates;
use crate::core::errors::Result;
use async_trait::async_trait;

/// Where analysis progress is kept.
///
/// Each artifact or project keeps its latest outcome per stage: adding a result removes an
/// earlier error for the same key and the other way round.
#[async_trait]
pub trait AnalysisPersistence: Send + Sync {
    /// Everything stored so far, sorted by coordinates
    fn snapshot(&self) -> PersistedAnalysis;

    fn add_project(&self, project: ProjectCoordinates);

    fn add_resolved_project(&self, project: ResolvedProject);

    fn add_project_resolution_error(&self, project: FailedProject);

    fn add_downloaded_artifact(&self, artifact: DownloadedArtifact);

    fn add_download_error(&self, artifact: FailedArtifact);

    fn add_analyzed_artifact(&self, artifact: AnalyzedArtifact);

    fn add_analysis_error(&self, artifact: FailedArtifact);

    fn add_resolved_artifact(&self, artifact: ResolvedArtifact);

    fn add_dependency_resolution_error(&self, artifact: FailedArtifact);

    fn add_completed(&self, record: &ClosureRecord);

    /// Makes everything added so far durable
    async fn flush(&self) -> Result<()>;
}
