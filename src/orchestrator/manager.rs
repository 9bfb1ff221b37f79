use super::channels::{AnalysisChannels, QueueDepths};
use crate::artifact::{
    AnalyzedArtifact, DownloadedArtifact, FailedArtifact, FailedProject, IdentifiesArtifact,
    ResolvedArtifact, ResolvedProject, StageFailure,
};
use crate::closure::{ClosureEngine, ClosureRecord, ClosureStats, ResolutionOutcome, ViolationsOutcome};
use crate::coordinates::{ArtifactCoordinates, ProjectCoordinates};
use crate::core::config::AnalysisConfig;
use crate::core::errors::{DepwallError, Result};
use crate::graph::{AnalysisGraph, ArtifactNode, GraphStats};
use crate::persistence::{AnalysisPersistence, PersistenceChannels, PersistenceRecorder, YamlPersistence};
use crate::task::{Task, TaskStateKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
struct StartedSenders {
    versions: mpsc::UnboundedSender<ProjectCoordinates>,
    download: mpsc::UnboundedSender<ArtifactCoordinates>,
    analysis: mpsc::UnboundedSender<ArtifactCoordinates>,
    dependencies: mpsc::UnboundedSender<ArtifactCoordinates>,
}

struct StartedReceivers {
    versions: mpsc::UnboundedReceiver<ProjectCoordinates>,
    download: mpsc::UnboundedReceiver<ArtifactCoordinates>,
    analysis: mpsc::UnboundedReceiver<ArtifactCoordinates>,
    dependencies: mpsc::UnboundedReceiver<ArtifactCoordinates>,
}

fn started_queues() -> (StartedSenders, StartedReceivers) {
    let (versions_tx, versions_rx) = mpsc::unbounded_channel();
    let (download_tx, download_rx) = mpsc::unbounded_channel();
    let (analysis_tx, analysis_rx) = mpsc::unbounded_channel();
    let (dependencies_tx, dependencies_rx) = mpsc::unbounded_channel();
    (
        StartedSenders {
            versions: versions_tx,
            download: download_tx,
            analysis: analysis_tx,
            dependencies: dependencies_tx,
        },
        StartedReceivers {
            versions: versions_rx,
            download: download_rx,
            analysis: analysis_rx,
            dependencies: dependencies_rx,
        },
    )
}

fn publish_started<K>(sender: &mpsc::UnboundedSender<K>, stage: &str, key: K) -> Result<()> {
    sender
        .send(key)
        .map_err(|_| DepwallError::channel(stage, "cannot publish start: orchestrator is gone"))
}

fn drain_started<K>(receiver: &mut mpsc::UnboundedReceiver<K>) -> Vec<K> {
    let mut started = Vec::new();
    while let Ok(key) = receiver.try_recv() {
        started.push(key);
    }
    started
}

/// The worker side of the orchestrator.
///
/// Workers never touch graph nodes. Taking a task publishes a started notice, and reporting an
/// outcome pushes it onto the stage's result or error queue; the orchestrator applies both on its
/// next drain.
#[derive(Clone)]
pub struct OrchestratorHandle {
    channels: AnalysisChannels,
    started: StartedSenders,
}

impl OrchestratorHandle {
    pub fn channels(&self) -> &AnalysisChannels {
        &self.channels
    }

    pub async fn add_project(&self, project: ProjectCoordinates) -> Result<()> {
        self.channels.add_projects.send_result(project).await
    }

    pub async fn project_discovery_failed(&self, failure: StageFailure) -> Result<()> {
        self.channels.add_projects.send_error(failure).await
    }

    pub async fn get_next_version_resolution(&self) -> Result<ProjectCoordinates> {
        let project = self.channels.resolve_versions.get_task().await?;
        publish_started(&self.started.versions, self.channels.resolve_versions.task_name(), project.clone())?;
        Ok(project)
    }

    pub async fn report_version_resolution_success(&self, project: ResolvedProject) -> Result<()> {
        self.channels.resolve_versions.send_result(project).await
    }

    pub async fn report_version_resolution_failure(&self, project: FailedProject) -> Result<()> {
        self.channels.resolve_versions.send_error(project).await
    }

    pub async fn get_next_download(&self) -> Result<ArtifactCoordinates> {
        let artifact = self.channels.download.get_task().await?;
        publish_started(&self.started.download, self.channels.download.task_name(), artifact.clone())?;
        Ok(artifact)
    }

    pub async fn report_download_success(&self, artifact: DownloadedArtifact) -> Result<()> {
        self.channels.download.send_result(artifact).await
    }

    pub async fn report_download_failure(&self, artifact: FailedArtifact) -> Result<()> {
        self.channels.download.send_error(artifact).await
    }

    /// The task carries the downloaded artifact, not only its coordinates
    pub async fn get_next_analysis(&self) -> Result<DownloadedArtifact> {
        let downloaded = self.channels.analysis.get_task().await?;
        publish_started(
            &self.started.analysis,
            self.channels.analysis.task_name(),
            downloaded.artifact.clone(),
        )?;
        Ok(downloaded)
    }

    pub async fn report_analysis_success(&self, artifact: AnalyzedArtifact) -> Result<()> {
        self.channels.analysis.send_result(artifact).await
    }

    pub async fn report_analysis_failure(&self, artifact: FailedArtifact) -> Result<()> {
        self.channels.analysis.send_error(artifact).await
    }

    pub async fn get_next_dependency_resolution(&self) -> Result<ArtifactCoordinates> {
        let artifact = self.channels.resolve_dependencies.get_task().await?;
        publish_started(
            &self.started.dependencies,
            self.channels.resolve_dependencies.task_name(),
            artifact.clone(),
        )?;
        Ok(artifact)
    }

    pub async fn report_dependency_resolution_success(&self, artifact: ResolvedArtifact) -> Result<()> {
        self.channels.resolve_dependencies.send_result(artifact).await
    }

    pub async fn report_dependency_resolution_failure(&self, artifact: FailedArtifact) -> Result<()> {
        self.channels.resolve_dependencies.send_error(artifact).await
    }

    /// Output has no task state, so no started notice
    pub async fn get_next_output(&self) -> Result<Arc<ClosureRecord>> {
        self.channels.output.get_task().await
    }

    pub async fn report_output_success(&self, artifact: ArtifactCoordinates) -> Result<()> {
        self.channels.output.send_result(artifact).await
    }

    pub async fn report_output_failure(&self, artifact: FailedArtifact) -> Result<()> {
        self.channels.output.send_error(artifact).await
    }

    /// Wakes every blocked worker; workers finish what they hold and stop
    pub fn close(&self) {
        self.channels.close();
    }
}

/// Snapshot of the whole run for logging
#[derive(Debug, Clone)]
pub struct OrchestratorStats {
    pub iteration: u64,
    pub graph: GraphStats,
    pub closure: ClosureStats,
    pub queues: QueueDepths,
    pub outputs_in_flight: usize,
}

impl fmt::Display for OrchestratorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iteration {}: {} | closure {} | queues {} | outputs in flight {}",
            self.iteration, self.graph, self.closure, self.queues, self.outputs_in_flight
        )
    }
}

/// Stages to send after a node's states were moved to QUEUED
#[derive(Default)]
struct QueuedStages {
    download: bool,
    analysis: Option<DownloadedArtifact>,
    dependency_resolution: bool,
}

fn queue_artifact_stages(node: &mut ArtifactNode) -> Result<QueuedStages> {
    let mut queued = QueuedStages::default();
    // A finished analysis needs no content
    if node.download.is(TaskStateKind::NotComputed) && !node.analysis.is_finished() {
        node.download.queue()?;
        queued.download = true;
    }
    if node.is_analysis_eligible() {
        let downloaded = node.download.result()?.clone();
        node.analysis.queue()?;
        queued.analysis = Some(downloaded);
    }
    if node.dependency_resolution.is(TaskStateKind::NotComputed) {
        node.dependency_resolution.queue()?;
        queued.dependency_resolution = true;
    }
    Ok(queued)
}

/// Outcomes replayed from persistence arrive for tasks that were never queued
fn start_if_not_computed<R>(task: &mut Task<R>) -> Result<()> {
    if task.is(TaskStateKind::NotComputed) {
        task.start()?;
    }
    Ok(())
}

fn closure_inputs(node: &ArtifactNode) -> Option<(ViolationsOutcome, ResolutionOutcome)> {
    let violations = match node.analysis.outcome()? {
        Ok(analyzed) => Ok(analyzed.violations.clone()),
        Err(failure) => Err(failure.clone()),
    };
    let dependees = match node.dependency_resolution.outcome()? {
        Ok(resolved) => Ok(resolved.dependees.clone()),
        Err(failure) => Err(failure.clone()),
    };
    Some((violations, dependees))
}

fn unfinished(counts: &BTreeMap<TaskStateKind, usize>) -> usize {
    counts
        .iter()
        .filter(|(state, _)| !state.is_finished())
        .map(|(_, count)| count)
        .sum()
}

fn in_flight(counts: &BTreeMap<TaskStateKind, usize>) -> usize {
    [TaskStateKind::Queued, TaskStateKind::Started]
        .iter()
        .filter_map(|state| counts.get(state))
        .sum()
}

fn is_multiple(iteration: u64, every: u64) -> bool {
    every != 0 && iteration % every == 0
}

/// The single owner of the graph and the closure engine.
///
/// [`Orchestrator::run`] alternates a queue phase (send every NOT_COMPUTED stage to its channel)
/// and a drain phase (apply every reported outcome) until aborted. Workers interact with it only
/// through an [`OrchestratorHandle`].
pub struct Orchestrator {
    config: AnalysisConfig,
    channels: AnalysisChannels,
    graph: AnalysisGraph,
    engine: ClosureEngine,
    started: StartedReceivers,
    handle: OrchestratorHandle,
    recorder: Option<PersistenceRecorder>,
    iteration: u64,
    outputs_in_flight: usize,
}

impl Orchestrator {
    pub fn new(config: AnalysisConfig, channels: AnalysisChannels) -> Self {
        let (senders, receivers) = started_queues();
        let handle = OrchestratorHandle {
            channels: channels.clone(),
            started: senders,
        };
        Self {
            config,
            channels,
            graph: AnalysisGraph::new(),
            engine: ClosureEngine::new(),
            started: receivers,
            handle,
            recorder: None,
            iteration: 0,
            outputs_in_flight: 0,
        }
    }

    /// Plain channels, or YAML persistence when `persistence_path` is set
    pub fn from_config(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        match config.persistence_path.clone() {
            Some(path) => {
                let persistence = YamlPersistence::open(path)?;
                Self::with_persistence(config, Arc::new(persistence))
            }
            None => {
                let channels = AnalysisChannels::from_config(&config);
                Ok(Self::new(config, channels))
            }
        }
    }

    /// Resumes the analysis stored in `persistence` and keeps recording into it
    pub fn with_persistence(config: AnalysisConfig, persistence: Arc<dyn AnalysisPersistence>) -> Result<Self> {
        let restored = persistence.snapshot().restore_closures()?;
        let (channels, recorder) = PersistenceChannels::build(persistence, &config);
        let mut orchestrator = Self::new(config, channels);
        orchestrator.recorder = Some(recorder);
        orchestrator.restore(restored)?;
        Ok(orchestrator)
    }

    pub fn handle(&self) -> OrchestratorHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn graph(&self) -> &AnalysisGraph {
        &self.graph
    }

    pub fn engine(&self) -> &ClosureEngine {
        &self.engine
    }

    pub async fn add_project(&self, project: ProjectCoordinates) -> Result<()> {
        self.handle.add_project(project).await
    }

    pub async fn project_discovery_failed(&self, failure: StageFailure) -> Result<()> {
        self.handle.project_discovery_failed(failure).await
    }

    /// Seeds closure records of an earlier run; they are never queued or output again
    pub fn restore(&mut self, records: Vec<Arc<ClosureRecord>>) -> Result<()> {
        let restored = records.len();
        self.engine.restore(records.iter().cloned());
        for record in &records {
            let coordinates = record.coordinates();
            self.graph.add_artifact(coordinates.clone());
            self.graph.update_artifact(coordinates, |node| {
                node.set_closure(record.clone());
                Ok(())
            })?;
        }
        for record in &records {
            if let Some(dependees) = record.dependee_coordinates() {
                for created in self.graph.add_dependees(record.coordinates(), dependees.iter())? {
                    self.engine.submit(created);
                }
            }
        }
        if restored > 0 {
            info!(restored, "Restored completed artifacts");
        }
        Ok(())
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            iteration: self.iteration,
            graph: self.graph.stats(),
            closure: self.engine.stats(),
            queues: self.channels.queue_depths(),
            outputs_in_flight: self.outputs_in_flight,
        }
    }

    /// Nothing is queued, running or waiting, and every finalized record was output
    pub fn is_idle(&self) -> bool {
        let closure = self.engine.stats();
        let graph = self.graph.stats();
        closure.pending == 0
            && closure.awaiting_analysis == 0
            && closure.awaiting_dependees == 0
            && unfinished(&graph.version_resolution) == 0
            && in_flight(&graph.download) == 0
            && in_flight(&graph.analysis) == 0
            && in_flight(&graph.dependency_resolution) == 0
            && self.channels.queue_depths().total() == 0
            && self.outputs_in_flight == 0
    }

    /// Runs until `abort` fires (or its sender is dropped).
    ///
    /// Returns an error only for invariant violations and persistence failures; stage failures
    /// are recorded on the nodes and never end the loop.
    pub async fn run(&mut self, abort: oneshot::Receiver<()>) -> Result<()> {
        self.run_loop(abort, false).await
    }

    /// Like [`Orchestrator::run`], but also returns once [`Orchestrator::is_idle`] holds
    pub async fn run_until_idle(&mut self, abort: oneshot::Receiver<()>) -> Result<()> {
        self.run_loop(abort, true).await
    }

    async fn run_loop(&mut self, mut abort: oneshot::Receiver<()>, until_idle: bool) -> Result<()> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            until_idle, "Orchestrator started"
        );
        let outcome = match self.bookkeeping(&mut abort, until_idle).await {
            Err(e) if e.is_shutdown() => {
                info!(error = %e, "Orchestrator stopped, channels closed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, category = e.category(), "Orchestrator failed");
                Err(e)
            }
            Ok(()) => Ok(()),
        };

        let discarded = self.channels.discard_stage_tasks();
        self.channels.close();
        if discarded > 0 {
            debug!(discarded, "Discarded queued tasks");
        }
        let flushed = self.finish_recording().await;
        info!("{}", self.stats());
        outcome.and(flushed)
    }

    async fn bookkeeping(&mut self, abort: &mut oneshot::Receiver<()>, until_idle: bool) -> Result<()> {
        // Replayed outcomes are applied before anything is queued
        self.drain_phase()?;
        loop {
            self.iterate().await?;
            if until_idle && self.is_idle() {
                info!(iteration = self.iteration, "Analysis complete");
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = &mut *abort => {
                    info!(iteration = self.iteration, "Orchestrator received abort signal");
                    return Ok(());
                }
            }
        }
    }

    /// One bookkeeping iteration: queue, drain, break cycles, record
    pub async fn iterate(&mut self) -> Result<()> {
        self.iteration += 1;
        let queued = self.queue_phase()?;
        let applied = self.drain_phase()?;

        if self.config.break_cycles && is_multiple(self.iteration, self.config.cycle_check_every) {
            let closed = self.engine.break_cycles()?;
            self.publish_closed(closed)?;
        }

        if let Some(recorder) = &self.recorder {
            recorder.record();
            if is_multiple(self.iteration, self.config.flush_every) {
                if let Err(e) = recorder.flush().await {
                    warn!(error = %e, "Flushing persistence failed, retrying later");
                }
            }
        }

        let queues = self.channels.queue_depths();
        debug!(iteration = self.iteration, queued, applied, %queues, "Bookkeeping iteration");
        if is_multiple(self.iteration, self.config.stats_every) {
            info!("{}", self.stats());
        }
        Ok(())
    }

    async fn finish_recording(&self) -> Result<()> {
        let Some(recorder) = &self.recorder else {
            return Ok(());
        };
        recorder.record();
        recorder.flush().await.map_err(|e| {
            error!(error = %e, "Final persistence flush failed");
            e
        })
    }

    fn queue_phase(&mut self) -> Result<usize> {
        for dispatched in self.engine.dispatch() {
            self.graph.add_artifact(dispatched);
        }

        let mut queued = 0;
        for project in self.graph.project_coordinates() {
            let queue = self.graph.update_project(&project, |node| {
                if node.version_resolution.is(TaskStateKind::NotComputed) {
                    node.version_resolution.queue()?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            })?;
            if queue {
                self.channels.resolve_versions.send_task(project)?;
                queued += 1;
            }
        }

        for artifact in self.graph.artifact_coordinates() {
            if self.engine.is_closed(&artifact) {
                continue;
            }
            let stages = self.graph.update_artifact(&artifact, queue_artifact_stages)?;
            if stages.download {
                self.channels.download.send_task(artifact.clone())?;
                queued += 1;
            }
            if let Some(downloaded) = stages.analysis {
                self.channels.analysis.send_task(downloaded)?;
                queued += 1;
            }
            if stages.dependency_resolution {
                self.channels.resolve_dependencies.send_task(artifact)?;
                queued += 1;
            }
        }
        Ok(queued)
    }

    fn drain_phase(&mut self) -> Result<usize> {
        let mut applied = self.drain_discovery();
        applied += self.drain_version_resolution()?;
        // Analysis before downloads: a replayed analysis outcome must land before a replayed
        // download failure could fail the analysis in its place
        applied += self.drain_analysis()?;
        applied += self.drain_downloads()?;
        applied += self.drain_dependency_resolution()?;
        applied += self.drain_output();
        Ok(applied)
    }

    fn drain_discovery(&mut self) -> usize {
        let projects = self.channels.add_projects.drain_results();
        let failures = self.channels.add_projects.drain_errors();
        let applied = projects.len() + failures.len();
        for project in projects {
            if self.graph.add_project(project.clone()) {
                info!(%project, "Project added");
            }
        }
        for failure in failures {
            warn!(%failure, "Project discovery failed");
        }
        applied
    }

    fn drain_version_resolution(&mut self) -> Result<usize> {
        // Outcomes first, notices second: every drained outcome then has its start notice
        let resolved = self.channels.resolve_versions.drain_results();
        let failed = self.channels.resolve_versions.drain_errors();
        for project in drain_started(&mut self.started.versions) {
            self.graph.update_project(&project, |node| node.version_resolution.start())?;
        }
        let applied = resolved.len() + failed.len();

        for result in resolved {
            let project = result.project.clone();
            let versions = result.versions.clone();
            self.graph.add_project(project.clone());
            self.graph.update_project(&project, |node| {
                start_if_not_computed(&mut node.version_resolution)?;
                node.version_resolution.succeed(result)
            })?;
            info!(%project, versions = versions.len(), "Versions resolved");
            for created in self.graph.add_versions(&project, versions)? {
                self.engine.submit(created);
            }
        }

        for result in failed {
            let failure = result.failure.clone();
            self.graph.add_project(result.project.clone());
            self.graph.update_project(&result.project, |node| {
                start_if_not_computed(&mut node.version_resolution)?;
                node.version_resolution.fail(failure.clone())
            })?;
            warn!(project = %result.project, %failure, "Version resolution failed");
        }
        Ok(applied)
    }

    fn drain_downloads(&mut self) -> Result<usize> {
        let downloaded = self.channels.download.drain_results();
        let failed = self.channels.download.drain_errors();
        for artifact in drain_started(&mut self.started.download) {
            self.graph.update_artifact(&artifact, |node| node.download.start())?;
        }
        let applied = downloaded.len() + failed.len();

        for result in downloaded {
            let artifact = result.artifact.clone();
            self.ensure_artifact(&artifact);
            self.graph.update_artifact(&artifact, |node| {
                start_if_not_computed(&mut node.download)?;
                node.download.succeed(result)
            })?;
            debug!(%artifact, "Downloaded");
        }

        for result in failed {
            let artifact = result.artifact.clone();
            let failure = result.failure;
            self.ensure_artifact(&artifact);
            let closed = self.engine.is_closed(&artifact);
            // Without content there is nothing to analyze, so analysis fails along with the download
            let became_ready = self.graph.update_artifact(&artifact, |node| {
                let was_ready = node.is_ready_for_closure();
                start_if_not_computed(&mut node.download)?;
                node.download.fail(failure.clone())?;
                if !closed && node.analysis.is(TaskStateKind::NotComputed) {
                    node.analysis.start()?;
                    node.analysis
                        .fail(StageFailure::new(format!("download failed: {}", failure)))?;
                }
                Ok(!was_ready && node.is_ready_for_closure())
            })?;
            warn!(%artifact, %failure, "Download failed");
            if became_ready {
                self.close(&artifact)?;
            }
        }
        Ok(applied)
    }

    fn drain_analysis(&mut self) -> Result<usize> {
        let analyzed = self.channels.analysis.drain_results();
        let failed = self.channels.analysis.drain_errors();
        for artifact in drain_started(&mut self.started.analysis) {
            self.graph.update_artifact(&artifact, |node| node.analysis.start())?;
        }
        let applied = analyzed.len() + failed.len();

        for result in analyzed {
            let artifact = result.artifact.clone();
            let violations = result.violations.len();
            self.ensure_artifact(&artifact);
            let became_ready = self.graph.update_artifact(&artifact, |node| {
                let was_ready = node.is_ready_for_closure();
                start_if_not_computed(&mut node.analysis)?;
                node.analysis.succeed(result)?;
                Ok(!was_ready && node.is_ready_for_closure())
            })?;
            debug!(%artifact, violations, "Analyzed");
            if became_ready {
                self.close(&artifact)?;
            }
        }

        for result in failed {
            let artifact = result.artifact.clone();
            let failure = result.failure;
            self.ensure_artifact(&artifact);
            let became_ready = self.graph.update_artifact(&artifact, |node| {
                let was_ready = node.is_ready_for_closure();
                start_if_not_computed(&mut node.analysis)?;
                node.analysis.fail(failure.clone())?;
                Ok(!was_ready && node.is_ready_for_closure())
            })?;
            warn!(%artifact, %failure, "Analysis failed");
            if became_ready {
                self.close(&artifact)?;
            }
        }
        Ok(applied)
    }

    fn drain_dependency_resolution(&mut self) -> Result<usize> {
        let resolved = self.channels.resolve_dependencies.drain_results();
        let failed = self.channels.resolve_dependencies.drain_errors();
        for artifact in drain_started(&mut self.started.dependencies) {
            self.graph.update_artifact(&artifact, |node| node.dependency_resolution.start())?;
        }
        let applied = resolved.len() + failed.len();

        for result in resolved {
            let artifact = result.artifact.clone();
            let dependees = result.dependees.clone();
            self.ensure_artifact(&artifact);
            let became_ready = self.graph.update_artifact(&artifact, |node| {
                let was_ready = node.is_ready_for_closure();
                start_if_not_computed(&mut node.dependency_resolution)?;
                node.dependency_resolution.succeed(result)?;
                Ok(!was_ready && node.is_ready_for_closure())
            })?;
            debug!(%artifact, dependees = dependees.len(), "Dependencies resolved");
            for created in self.graph.add_dependees(&artifact, dependees.iter())? {
                self.engine.submit(created);
            }
            if became_ready {
                self.close(&artifact)?;
            }
        }

        for result in failed {
            let artifact = result.artifact.clone();
            let failure = result.failure;
            self.ensure_artifact(&artifact);
            let became_ready = self.graph.update_artifact(&artifact, |node| {
                let was_ready = node.is_ready_for_closure();
                start_if_not_computed(&mut node.dependency_resolution)?;
                node.dependency_resolution.fail(failure.clone())?;
                Ok(!was_ready && node.is_ready_for_closure())
            })?;
            warn!(%artifact, %failure, "Dependency resolution failed");
            if became_ready {
                self.close(&artifact)?;
            }
        }
        Ok(applied)
    }

    fn drain_output(&mut self) -> usize {
        let accepted = self.channels.output.drain_results();
        let rejected = self.channels.output.drain_errors();
        let applied = accepted.len() + rejected.len();
        for artifact in accepted {
            debug!(%artifact, "Output accepted");
        }
        for result in rejected {
            warn!(artifact = %result.artifact, failure = %result.failure, "Output rejected record");
        }
        self.outputs_in_flight = self.outputs_in_flight.saturating_sub(applied);
        applied
    }

    /// Replayed outcomes may name artifacts this run has not discovered yet
    fn ensure_artifact(&mut self, artifact: &ArtifactCoordinates) {
        if self.graph.add_artifact(artifact.clone()) {
            self.engine.submit(artifact.clone());
        }
    }

    /// Hands both finished stages of `artifact` to the closure engine
    fn close(&mut self, artifact: &ArtifactCoordinates) -> Result<()> {
        if self.engine.is_closed(artifact) {
            return Ok(());
        }
        let (violations, dependees) = self
            .graph
            .read_artifact(artifact, closure_inputs)?
            .ok_or_else(|| DepwallError::invariant(artifact, "closure requested before both stages finished"))?;
        let closed = self.engine.on_analyzed(artifact, violations, dependees)?;
        self.publish_closed(closed)
    }

    fn publish_closed(&mut self, records: Vec<Arc<ClosureRecord>>) -> Result<()> {
        for record in records {
            self.graph.update_artifact(record.coordinates(), |node| {
                node.set_closure(record.clone());
                Ok(())
            })?;
            self.channels.output.send_task(record)?;
            self.outputs_in_flight += 1;
        }
        Ok(())
    }
}
