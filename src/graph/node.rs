use crate::artifact::{DownloadedArtifact, AnalyzedArtifact, ResolvedArtifact, ResolvedProject};
use crate::closure::ClosureRecord;
use crate::coordinates::{ArtifactCoordinates, ProjectCoordinates};
use crate::task::{Task, TaskStateKind};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// The pipeline stages an artifact goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactStage {
    Download,
    Analysis,
    DependencyResolution,
}

impl ArtifactStage {
    pub const ALL: [ArtifactStage; 3] = [
        ArtifactStage::Download,
        ArtifactStage::Analysis,
        ArtifactStage::DependencyResolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStage::Download => "download",
            ArtifactStage::Analysis => "analysis",
            ArtifactStage::DependencyResolution => "dependency resolution",
        }
    }
}

impl fmt::Display for ArtifactStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ProjectNode {
    coordinates: ProjectCoordinates,
    versions: BTreeSet<ArtifactCoordinates>,
    pub version_resolution: Task<ResolvedProject>,
}

impl ProjectNode {
    pub fn new(coordinates: ProjectCoordinates) -> Self {
        Self {
            coordinates,
            versions: BTreeSet::new(),
            version_resolution: Task::new(),
        }
    }

    pub fn coordinates(&self) -> &ProjectCoordinates {
        &self.coordinates
    }

    /// Artifacts discovered as versions of this project
    pub fn versions(&self) -> &BTreeSet<ArtifactCoordinates> {
        &self.versions
    }

    pub(super) fn add_version(&mut self, version: ArtifactCoordinates) -> bool {
        self.versions.insert(version)
    }
}

/// One artifact with a task per stage.
///
/// Dependents are not stored here; [`super::AnalysisGraph`] keeps them in a separate index.
#[derive(Debug, Clone)]
pub struct ArtifactNode {
    coordinates: ArtifactCoordinates,
    pub download: Task<DownloadedArtifact>,
    pub analysis: Task<AnalyzedArtifact>,
    pub dependency_resolution: Task<ResolvedArtifact>,
    closure: Option<Arc<ClosureRecord>>,
}

impl ArtifactNode {
    pub fn new(coordinates: ArtifactCoordinates) -> Self {
        Self {
            coordinates,
            download: Task::new(),
            analysis: Task::new(),
            dependency_resolution: Task::new(),
            closure: None,
        }
    }

    pub fn coordinates(&self) -> &ArtifactCoordinates {
        &self.coordinates
    }

    pub fn stage_state(&self, stage: ArtifactStage) -> TaskStateKind {
        match stage {
            ArtifactStage::Download => self.download.current_state(),
            ArtifactStage::Analysis => self.analysis.current_state(),
            ArtifactStage::DependencyResolution => self.dependency_resolution.current_state(),
        }
    }

    /// Analysis needs the downloaded content, so it waits for a successful download
    pub fn is_analysis_eligible(&self) -> bool {
        self.analysis.is(TaskStateKind::NotComputed) && self.download.is(TaskStateKind::Succeeded)
    }

    /// Both stages feeding the closure engine are finished
    pub fn is_ready_for_closure(&self) -> bool {
        self.analysis.is_finished() && self.dependency_resolution.is_finished()
    }

    pub fn closure(&self) -> Option<&Arc<ClosureRecord>> {
        self.closure.as_ref()
    }

    pub fn set_closure(&mut self, record: Arc<ClosureRecord>) {
        self.closure = Some(record);
    }
}
