use super::memory::InMemoryPersistence;
use super::model::PersistedAnalysis;
use super::AnalysisPersistence;
use crate::artifact::{
    AnalyzedArtifact, DownloadedArtifact, FailedArtifact, FailedProject, ResolvedArtifact,
    ResolvedProject,
};
use crate::closure::ClosureRecord;
use crate::coordinates::ProjectCoordinates;
use crate::core::errors::{DepwallError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Stores the whole analysis in one YAML document, rewritten on every flush
#[derive(Debug)]
pub struct YamlPersistence {
    path: PathBuf,
    memory: InMemoryPersistence,
    dirty: AtomicBool,
}

impl YamlPersistence {
    /// Loads the document at `path`; a missing file starts an empty analysis
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let analysis = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| DepwallError::io(format!("read {}", path.display()), e))?;
            if content.trim().is_empty() {
                PersistedAnalysis::default()
            } else {
                serde_yaml::from_str(&content)
                    .map_err(|e| DepwallError::persistence_with_source(format!("parse {}", path.display()), e))?
            }
        } else {
            PersistedAnalysis::default()
        };
        info!(
            path = %path.display(),
            projects = analysis.step_1_projects.len(),
            completed = analysis.step_6_completed_artifacts.len(),
            "Loaded persisted analysis"
        );
        Ok(Self {
            path,
            memory: InMemoryPersistence::from_analysis(analysis),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn touched(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}

#[async_trait]
impl AnalysisPersistence for YamlPersistence {
    fn snapshot(&self) -> PersistedAnalysis {
        self.memory.snapshot()
    }

    fn add_project(&self, project: ProjectCoordinates) {
        self.memory.add_project(project);
        self.touched();
    }

    fn add_resolved_project(&self, project: ResolvedProject) {
        self.memory.add_resolved_project(project);
        self.touched();
    }

    fn add_project_resolution_error(&self, project: FailedProject) {
        self.memory.add_project_resolution_error(project);
        self.touched();
    }

    fn add_downloaded_artifact(&self, artifact: DownloadedArtifact) {
        self.memory.add_downloaded_artifact(artifact);
        self.touched();
    }

    fn add_download_error(&self, artifact: FailedArtifact) {
        self.memory.add_download_error(artifact);
        self.touched();
    }

    fn add_analyzed_artifact(&self, artifact: AnalyzedArtifact) {
        self.memory.add_analyzed_artifact(artifact);
        self.touched();
    }

    fn add_analysis_error(&self, artifact: FailedArtifact) {
        self.memory.add_analysis_error(artifact);
        self.touched();
    }

    fn add_resolved_artifact(&self, artifact: ResolvedArtifact) {
        self.memory.add_resolved_artifact(artifact);
        self.touched();
    }

    fn add_dependency_resolution_error(&self, artifact: FailedArtifact) {
        self.memory.add_dependency_resolution_error(artifact);
        self.touched();
    }

    fn add_completed(&self, record: &ClosureRecord) {
        self.memory.add_completed(record);
        self.touched();
    }

    /// Writes to a sibling temp file first and renames it over the document
    async fn flush(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let content = serde_yaml::to_string(&self.memory.snapshot())?;
        let temp = self.path.with_extension("yaml.tmp");
        let write = async {
            tokio::fs::write(&temp, content.as_bytes()).await?;
            tokio::fs::rename(&temp, &self.path).await
        };
        if let Err(e) = write.await {
            self.touched();
            return Err(DepwallError::io(format!("write {}", self.path.display()), e));
        }
        debug!(path = %self.path.display(), bytes = content.len(), "Flushed analysis");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::StageFailure;
    use crate::coordinates::ArtifactCoordinates;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = YamlPersistence::open(dir.path().join("analysis.yaml")).unwrap();
        assert!(persistence.snapshot().is_empty());
        // Nothing changed, nothing written
        persistence.flush().await.unwrap();
        assert!(!persistence.path().exists());
    }

    #[tokio::test]
    async fn test_flush_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.yaml");
        let artifact = ArtifactCoordinates::new("org.example", "lib", "1.0");

        let persistence = YamlPersistence::open(&path).unwrap();
        persistence.add_project(artifact.project());
        persistence.add_resolved_artifact(ResolvedArtifact {
            artifact: artifact.clone(),
            dependees: BTreeSet::new(),
        });
        persistence.add_analysis_error(FailedArtifact::new(
            artifact.clone(),
            StageFailure::new("class file too new"),
        ));
        persistence.add_completed(&ClosureRecord::new(
            artifact.clone(),
            Err(StageFailure::new("class file too new")),
            Ok(vec![]),
        ));
        persistence.flush().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.find("step_1_projects").unwrap() < content.find("step_6_completed_artifacts").unwrap());

        let reopened = YamlPersistence::open(&path).unwrap();
        let snapshot = reopened.snapshot();
        assert_eq!(snapshot, persistence.snapshot());
        assert_eq!(snapshot.step_4_analysis_failed_artifacts[0].failure.message, "class file too new");
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.yaml");
        std::fs::write(&path, "step_1_projects: 17").unwrap();
        let err = YamlPersistence::open(&path).unwrap_err();
        assert_eq!(err.category(), "persistence");
    }
}
