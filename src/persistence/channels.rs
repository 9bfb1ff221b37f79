use super::AnalysisPersistence;
use crate::channel::{SharedChannel, TaskChannelExt};
use crate::core::config::AnalysisConfig;
use crate::core::errors::Result;
use crate::orchestrator::channels::{AnalysisChannels, OutputChannel};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds stage channels that replay a persisted analysis and report new items to the store
pub struct PersistenceChannels;

impl PersistenceChannels {
    /// Every stage channel becomes `simple.replaying(persisted).spy(listening)`; the output
    /// channel is only spied. The returned recorder moves what the listeners saw into `persistence`.
    pub fn build(
        persistence: Arc<dyn AnalysisPersistence>,
        config: &AnalysisConfig,
    ) -> (AnalysisChannels, PersistenceRecorder) {
        let persisted = persistence.snapshot();
        let base = AnalysisChannels::from_config(config);
        let listeners = AnalysisChannels::unbounded();

        let (downloaded, download_failed) = if config.replay_downloads {
            (
                persisted.step_3_downloaded_artifacts,
                persisted.step_3_download_failed_artifacts,
            )
        } else {
            (Vec::new(), Vec::new())
        };

        info!(
            projects = persisted.step_1_projects.len(),
            downloads = downloaded.len() + download_failed.len(),
            analyses = persisted.step_4_analyzed_artifacts.len()
                + persisted.step_4_analysis_failed_artifacts.len(),
            resolutions = persisted.step_5_resolved_artifacts.len()
                + persisted.step_5_resolution_failed_artifacts.len(),
            "Replaying persisted analysis"
        );

        let channels = AnalysisChannels {
            add_projects: base
                .add_projects
                .replaying(Vec::new(), persisted.step_1_projects, Vec::new())
                .spy(listeners.add_projects.clone()),
            resolve_versions: base
                .resolve_versions
                .replaying(
                    Vec::new(),
                    persisted.step_2_resolved_projects,
                    persisted.step_2_resolution_failed_projects,
                )
                .spy(listeners.resolve_versions.clone()),
            download: base
                .download
                .replaying(Vec::new(), downloaded, download_failed)
                .spy(listeners.download.clone()),
            analysis: base
                .analysis
                .replaying(
                    Vec::new(),
                    persisted.step_4_analyzed_artifacts,
                    persisted.step_4_analysis_failed_artifacts,
                )
                .spy(listeners.analysis.clone()),
            resolve_dependencies: base
                .resolve_dependencies
                .replaying(
                    Vec::new(),
                    persisted.step_5_resolved_artifacts,
                    persisted.step_5_resolution_failed_artifacts,
                )
                .spy(listeners.resolve_dependencies.clone()),
            output: base.output.spy(listeners.output.clone()),
        };

        let recorder = PersistenceRecorder {
            persistence,
            listeners,
        };
        (channels, recorder)
    }
}

/// Drains the listening side of the spied channels into the store
pub struct PersistenceRecorder {
    persistence: Arc<dyn AnalysisPersistence>,
    listeners: AnalysisChannels,
}

impl PersistenceRecorder {
    /// Stores everything the listeners received since the last call; returns how many items
    pub fn record(&self) -> usize {
        let persistence = self.persistence.as_ref();
        let mut recorded = 0;

        recorded += record_channel(
            &self.listeners.add_projects,
            |project| persistence.add_project(project),
            |failure| warn!(%failure, "Project discovery failed"),
        );
        recorded += record_channel(
            &self.listeners.resolve_versions,
            |project| persistence.add_resolved_project(project),
            |project| persistence.add_project_resolution_error(project),
        );
        recorded += record_channel(
            &self.listeners.download,
            |artifact| persistence.add_downloaded_artifact(artifact),
            |artifact| persistence.add_download_error(artifact),
        );
        recorded += record_channel(
            &self.listeners.analysis,
            |artifact| persistence.add_analyzed_artifact(artifact),
            |artifact| persistence.add_analysis_error(artifact),
        );
        recorded += record_channel(
            &self.listeners.resolve_dependencies,
            |artifact| persistence.add_resolved_artifact(artifact),
            |artifact| persistence.add_dependency_resolution_error(artifact),
        );

        // Completed records travel as output tasks; acknowledgements are not stored
        let output: &OutputChannel = &self.listeners.output;
        for record in output.drain_tasks() {
            persistence.add_completed(&record);
            recorded += 1;
        }
        output.drain_results();
        output.drain_errors();

        if recorded > 0 {
            debug!(recorded, "Recorded analysis progress");
        }
        recorded
    }

    pub async fn flush(&self) -> Result<()> {
        self.persistence.flush().await
    }

    pub fn persistence(&self) -> &Arc<dyn AnalysisPersistence> {
        &self.persistence
    }
}

/// Drops the mirrored tasks and hands results and errors to the store
fn record_channel<T, R, E>(
    channel: &SharedChannel<T, R, E>,
    mut on_result: impl FnMut(R),
    mut on_error: impl FnMut(E),
) -> usize
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    channel.drain_tasks();
    let mut recorded = 0;
    for result in channel.drain_results() {
        on_result(result);
        recorded += 1;
    }
    for error in channel.drain_errors() {
        on_error(error);
        recorded += 1;
    }
    recorded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{
        AnalyzedArtifact, DownloadedArtifact, FailedArtifact, StageFailure,
    };
    use crate::closure::ClosureRecord;
    use crate::coordinates::{ArtifactCoordinates, ProjectCoordinates};
    use crate::persistence::InMemoryPersistence;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn coords(artifact: &str) -> ArtifactCoordinates {
        ArtifactCoordinates::new("org.example", artifact, "1.0")
    }

    fn seeded() -> Arc<dyn AnalysisPersistence> {
        let persistence = InMemoryPersistence::new();
        persistence.add_project(ProjectCoordinates::new("org.example", "a"));
        persistence.add_downloaded_artifact(DownloadedArtifact {
            artifact: coords("a"),
            path: PathBuf::from("a.jar"),
        });
        persistence.add_download_error(FailedArtifact::new(coords("b"), StageFailure::new("404")));
        Arc::new(persistence)
    }

    #[test]
    fn test_persisted_items_are_replayed_once() {
        let (channels, recorder) = PersistenceChannels::build(seeded(), &AnalysisConfig::default());

        assert_eq!(
            channels.add_projects.drain_results(),
            vec![ProjectCoordinates::new("org.example", "a")]
        );
        assert_eq!(channels.download.drain_results().len(), 1);
        assert_eq!(channels.download.drain_errors().len(), 1);
        assert!(channels.download.drain_results().is_empty());

        // Replayed items are not stored a second time
        assert_eq!(recorder.record(), 0);
    }

    #[test]
    fn test_downloads_are_not_replayed_when_disabled() {
        let config = AnalysisConfig::builder().replay_downloads(false).build().unwrap();
        let (channels, _recorder) = PersistenceChannels::build(seeded(), &config);

        assert!(channels.download.drain_results().is_empty());
        assert!(channels.download.drain_errors().is_empty());
        assert_eq!(channels.add_projects.drain_results().len(), 1);
    }

    #[tokio::test]
    async fn test_new_items_are_recorded() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let (channels, recorder) =
            PersistenceChannels::build(persistence.clone(), &AnalysisConfig::default());

        channels.analysis.send_task(DownloadedArtifact {
            artifact: coords("a"),
            path: PathBuf::from("a.jar"),
        }).unwrap();
        channels
            .analysis
            .send_result(AnalyzedArtifact {
                artifact: coords("a"),
                violations: BTreeSet::new(),
            })
            .await
            .unwrap();
        let record = Arc::new(ClosureRecord::new(coords("a"), Ok(BTreeSet::new()), Ok(vec![])));
        channels.output.send_task(record).unwrap();
        channels.output.send_result(coords("a")).await.unwrap();

        assert_eq!(recorder.record(), 2);
        assert_eq!(recorder.record(), 0);

        let snapshot = persistence.snapshot();
        assert_eq!(snapshot.step_4_analyzed_artifacts.len(), 1);
        assert_eq!(snapshot.step_6_completed_artifacts.len(), 1);
        // The orchestrator side still sees its own items
        assert_eq!(channels.analysis.drain_results().len(), 1);
        assert_eq!(channels.output.waiting_tasks(), 1);
    }
}
