use crate::artifact::{
    AnalyzedArtifact, DownloadedArtifact, FailedArtifact, FailedProject, ResolvedArtifact,
    ResolvedProject, StageFailure,
};
use crate::channel::{SharedChannel, SimpleTaskChannel};
use crate::closure::ClosureRecord;
use crate::coordinates::{ArtifactCoordinates, ProjectCoordinates};
use crate::core::config::AnalysisConfig;
use std::fmt;
use std::sync::Arc;

pub type ProjectDiscoveryChannel = SharedChannel<(), ProjectCoordinates, StageFailure>;
pub type VersionResolutionChannel = SharedChannel<ProjectCoordinates, ResolvedProject, FailedProject>;
pub type DownloadChannel = SharedChannel<ArtifactCoordinates, DownloadedArtifact, FailedArtifact>;
/// Analysis tasks carry the download result, i.e. where the binary is
pub type AnalysisChannel = SharedChannel<DownloadedArtifact, AnalyzedArtifact, FailedArtifact>;
pub type DependencyResolutionChannel =
    SharedChannel<ArtifactCoordinates, ResolvedArtifact, FailedArtifact>;
/// Results acknowledge a record the sink accepted, errors report a record it rejected
pub type OutputChannel = SharedChannel<Arc<ClosureRecord>, ArtifactCoordinates, FailedArtifact>;

/// One channel per pipeline stage plus project discovery and output
#[derive(Clone)]
pub struct AnalysisChannels {
    pub add_projects: ProjectDiscoveryChannel,
    pub resolve_versions: VersionResolutionChannel,
    pub download: DownloadChannel,
    pub analysis: AnalysisChannel,
    pub resolve_dependencies: DependencyResolutionChannel,
    pub output: OutputChannel,
}

/// Tasks waiting in each stage's queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepths {
    pub resolve_versions: usize,
    pub download: usize,
    pub analysis: usize,
    pub resolve_dependencies: usize,
    pub output: usize,
}

impl QueueDepths {
    pub fn total(&self) -> usize {
        self.resolve_versions + self.download + self.analysis + self.resolve_dependencies + self.output
    }
}

impl fmt::Display for QueueDepths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "versions={} download={} analysis={} dependencies={} output={}",
            self.resolve_versions, self.download, self.analysis, self.resolve_dependencies, self.output
        )
    }
}

/// Channel names used in logs
pub(crate) mod names {
    pub const ADD_PROJECTS: &str = "add project";
    pub const RESOLVE_VERSIONS: &str = "version resolution";
    pub const DOWNLOAD: &str = "download";
    pub const ANALYSIS: &str = "analysis";
    pub const RESOLVE_DEPENDENCIES: &str = "dependency resolution";
    pub const OUTPUT: &str = "output";
}

impl AnalysisChannels {
    /// Plain channels with unbounded result and error queues
    pub fn unbounded() -> Self {
        Self::with_capacities(0, 0)
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::with_capacities(config.result_capacity, config.error_capacity)
    }

    pub fn with_capacities(results: usize, errors: usize) -> Self {
        Self {
            add_projects: Arc::new(SimpleTaskChannel::bounded(names::ADD_PROJECTS, results, errors)),
            resolve_versions: Arc::new(SimpleTaskChannel::bounded(
                names::RESOLVE_VERSIONS,
                results,
                errors,
            )),
            download: Arc::new(SimpleTaskChannel::bounded(names::DOWNLOAD, results, errors)),
            analysis: Arc::new(SimpleTaskChannel::bounded(names::ANALYSIS, results, errors)),
            resolve_dependencies: Arc::new(SimpleTaskChannel::bounded(
                names::RESOLVE_DEPENDENCIES,
                results,
                errors,
            )),
            output: Arc::new(SimpleTaskChannel::bounded(names::OUTPUT, results, errors)),
        }
    }

    pub fn queue_depths(&self) -> QueueDepths {
        QueueDepths {
            resolve_versions: self.resolve_versions.waiting_tasks(),
            download: self.download.waiting_tasks(),
            analysis: self.analysis.waiting_tasks(),
            resolve_dependencies: self.resolve_dependencies.waiting_tasks(),
            output: self.output.waiting_tasks(),
        }
    }

    /// Drops stage tasks no worker has taken yet; their nodes stay QUEUED and a resumed run
    /// queues them again. Output tasks are kept so finalized records still reach the sink.
    pub fn discard_stage_tasks(&self) -> usize {
        self.resolve_versions.drain_tasks().len()
            + self.download.drain_tasks().len()
            + self.analysis.drain_tasks().len()
            + self.resolve_dependencies.drain_tasks().len()
    }

    /// Wakes every worker blocked on a task queue so it can shut down
    pub fn close(&self) {
        self.add_projects.close();
        self.resolve_versions.close();
        self.download.close();
        self.analysis.close();
        self.resolve_dependencies.close();
        self.output.close();
    }
}
