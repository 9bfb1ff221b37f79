use super::model::{record_outcome, PersistedAnalysis, PersistedClosure, Store};
use super::AnalysisPersistence;
use crate::artifact::{
    AnalyzedArtifact, DownloadedArtifact, FailedArtifact, FailedProject, ResolvedArtifact,
    ResolvedProject,
};
use crate::closure::ClosureRecord;
use crate::coordinates::ProjectCoordinates;
use crate::core::errors::Result;
use async_trait::async_trait;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Keeps everything in memory; the base of every other store
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    store: RwLock<Store>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_analysis(analysis: PersistedAnalysis) -> Self {
        Self {
            store: RwLock::new(analysis.into()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AnalysisPersistence for InMemoryPersistence {
    fn snapshot(&self) -> PersistedAnalysis {
        PersistedAnalysis::from(&*self.read())
    }

    fn add_project(&self, project: ProjectCoordinates) {
        self.write().projects.insert(project);
    }

    fn add_resolved_project(&self, project: ResolvedProject) {
        let mut guard = self.write();
        let store = &mut *guard;
        let key = project.project.clone();
        record_outcome(&key, project, &mut store.resolved_projects, &mut store.failed_projects);
    }

    fn add_project_resolution_error(&self, project: FailedProject) {
        let mut guard = self.write();
        let store = &mut *guard;
        let key = project.project.clone();
        record_outcome(&key, project, &mut store.failed_projects, &mut store.resolved_projects);
    }

    fn add_downloaded_artifact(&self, artifact: DownloadedArtifact) {
        let mut guard = self.write();
        let store = &mut *guard;
        let key = artifact.artifact.clone();
        record_outcome(&key, artifact, &mut store.downloaded, &mut store.download_failed);
    }

    fn add_download_error(&self, artifact: FailedArtifact) {
        let mut guard = self.write();
        let store = &mut *guard;
        let key = artifact.artifact.clone();
        record_outcome(&key, artifact, &mut store.download_failed, &mut store.downloaded);
    }

    fn add_analyzed_artifact(&self, artifact: AnalyzedArtifact) {
        let mut guard = self.write();
        let store = &mut *guard;
        let key = artifact.artifact.clone();
        record_outcome(&key, artifact, &mut store.analyzed, &mut store.analysis_failed);
    }

    fn add_analysis_error(&self, artifact: FailedArtifact) {
        let mut guard = self.write();
        let store = &mut *guard;
        let key = artifact.artifact.clone();
        record_outcome(&key, artifact, &mut store.analysis_failed, &mut store.analyzed);
    }

    fn add_resolved_artifact(&self, artifact: ResolvedArtifact) {
        let mut guard = self.write();
        let store = &mut *guard;
        let key = artifact.artifact.clone();
        record_outcome(&key, artifact, &mut store.resolved, &mut store.resolution_failed);
    }

    fn add_dependency_resolution_error(&self, artifact: FailedArtifact) {
        let mut guard = self.write();
        let store = &mut *guard;
        let key = artifact.artifact.clone();
        record_outcome(&key, artifact, &mut store.resolution_failed, &mut store.resolved);
    }

    fn add_completed(&self, record: &ClosureRecord) {
        let closure = PersistedClosure::from_record(record);
        self.write().completed.insert(closure.artifact.clone(), closure);
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::StageFailure;
    use crate::coordinates::ArtifactCoordinates;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn coords(artifact: &str) -> ArtifactCoordinates {
        ArtifactCoordinates::new("org.example", artifact, "1.0")
    }

    #[test]
    fn test_latest_outcome_wins() {
        let persistence = InMemoryPersistence::new();
        persistence.add_download_error(FailedArtifact::new(coords("a"), StageFailure::new("timeout")));
        persistence.add_downloaded_artifact(DownloadedArtifact {
            artifact: coords("a"),
            path: PathBuf::from("a.jar"),
        });

        let snapshot = persistence.snapshot();
        assert_eq!(snapshot.step_3_downloaded_artifacts.len(), 1);
        assert!(snapshot.step_3_download_failed_artifacts.is_empty());
    }

    #[test]
    fn test_snapshot_is_sorted_and_deduplicated() {
        let persistence = InMemoryPersistence::new();
        for name in ["b", "a", "b"] {
            persistence.add_resolved_artifact(ResolvedArtifact {
                artifact: coords(name),
                dependees: BTreeSet::new(),
            });
        }
        persistence.add_project(ProjectCoordinates::new("z", "z"));
        persistence.add_project(ProjectCoordinates::new("a", "a"));

        let snapshot = persistence.snapshot();
        let resolved: Vec<&str> = snapshot
            .step_5_resolved_artifacts
            .iter()
            .map(|r| r.artifact.artifact_id.as_str())
            .collect();
        assert_eq!(resolved, vec!["a", "b"]);
        assert_eq!(snapshot.step_1_projects[0], ProjectCoordinates::new("a", "a"));
    }

    #[test]
    fn test_completed_records() {
        let persistence = InMemoryPersistence::new();
        let record = ClosureRecord::new(coords("a"), Ok(BTreeSet::new()), Ok(vec![]));
        persistence.add_completed(&record);
        let restored = persistence.snapshot().restore_closures().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].as_ref(), &record);
    }
}
