//! Fake collaborators shared by the integration tests

#![allow(dead_code)]

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use depwall::artifact::IdentifiesArtifact;
use depwall::{
    AnalysisConfig, Analyzer, ArtifactCoordinates, ClosureRecord, Collaborators,
    DependencyResolver, DownloadedArtifact, Downloader, Orchestrator, OutputSink,
    ProjectCoordinates, VersionResolver, Violation, WorkerPool,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub fn artifact(name: &str) -> ArtifactCoordinates {
    ArtifactCoordinates::new("org.example", name, "1.0")
}

pub fn project(name: &str) -> ProjectCoordinates {
    ProjectCoordinates::new("org.example", name)
}

pub fn violation() -> BTreeSet<Violation> {
    let mut violations = BTreeSet::new();
    violations.insert(Violation::new("org.example.Widget", ["sun.misc.Unsafe"]).unwrap());
    violations
}

/// An in-memory package repository that logs every call it receives
#[derive(Default)]
pub struct FakeRepository {
    versions: BTreeMap<ProjectCoordinates, BTreeSet<ArtifactCoordinates>>,
    dependencies: BTreeMap<ArtifactCoordinates, BTreeSet<ArtifactCoordinates>>,
    violations: BTreeMap<ArtifactCoordinates, BTreeSet<Violation>>,
    failing_versions: HashSet<ProjectCoordinates>,
    failing_downloads: HashSet<ArtifactCoordinates>,
    failing_resolutions: HashSet<ArtifactCoordinates>,
    hanging_downloads: HashSet<ArtifactCoordinates>,
    calls: Mutex<Vec<String>>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A project with a single version `1.0`
    pub fn project(mut self, name: &str) -> Self {
        self.versions
            .entry(project(name))
            .or_default()
            .insert(artifact(name));
        self
    }

    pub fn depends(mut self, dependent: &str, dependees: &[&str]) -> Self {
        self.dependencies
            .entry(artifact(dependent))
            .or_default()
            .extend(dependees.iter().map(|d| artifact(d)));
        self
    }

    pub fn violating(mut self, name: &str) -> Self {
        self.violations.insert(artifact(name), violation());
        self
    }

    pub fn failing_versions(mut self, name: &str) -> Self {
        self.failing_versions.insert(project(name));
        self
    }

    pub fn failing_download(mut self, name: &str) -> Self {
        self.failing_downloads.insert(artifact(name));
        self
    }

    pub fn failing_resolution(mut self, name: &str) -> Self {
        self.failing_resolutions.insert(artifact(name));
        self
    }

    pub fn hanging_download(mut self, name: &str) -> Self {
        self.hanging_downloads.insert(artifact(name));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, stage: &str) -> Vec<String> {
        let prefix = format!("{} ", stage);
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(&prefix))
            .collect()
    }

    fn log(&self, stage: &str, subject: impl std::fmt::Display) {
        self.calls.lock().unwrap().push(format!("{} {}", stage, subject));
    }

    fn path_of(artifact: &ArtifactCoordinates) -> PathBuf {
        PathBuf::from(format!("/repository/{}-{}.jar", artifact.artifact_id, artifact.version))
    }
}

#[async_trait]
impl VersionResolver for FakeRepository {
    async fn resolve_versions(&self, project: &ProjectCoordinates) -> anyhow::Result<BTreeSet<ArtifactCoordinates>> {
        self.log("versions", project);
        if self.failing_versions.contains(project) {
            bail!("no metadata for {}", project);
        }
        Ok(self.versions.get(project).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DependencyResolver for FakeRepository {
    async fn resolve_direct_dependencies(
        &self,
        artifact: &ArtifactCoordinates,
    ) -> anyhow::Result<BTreeSet<ArtifactCoordinates>> {
        self.log("dependencies", artifact);
        if self.failing_resolutions.contains(artifact) {
            bail!("unparsable pom for {}", artifact);
        }
        Ok(self.dependencies.get(artifact).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Downloader for FakeRepository {
    async fn download(&self, artifact: &ArtifactCoordinates) -> anyhow::Result<PathBuf> {
        self.log("download", artifact);
        if self.failing_downloads.contains(artifact) {
            bail!("404 for {}", artifact);
        }
        if self.hanging_downloads.contains(artifact) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(Self::path_of(artifact))
    }
}

#[async_trait]
impl Analyzer for FakeRepository {
    async fn analyze(&self, downloaded: &DownloadedArtifact) -> anyhow::Result<BTreeSet<Violation>> {
        self.log("analysis", &downloaded.artifact);
        // Only what the downloader produced can be analyzed
        if downloaded.path != Self::path_of(&downloaded.artifact) {
            return Err(anyhow!("unexpected content {}", downloaded.path.display()));
        }
        Ok(self.violations.get(&downloaded.artifact).cloned().unwrap_or_default())
    }
}

/// Keeps every record it receives
#[derive(Default)]
pub struct CollectingSink {
    records: Mutex<Vec<Arc<ClosureRecord>>>,
}

impl CollectingSink {
    pub fn records(&self) -> Vec<Arc<ClosureRecord>> {
        self.records.lock().unwrap().clone()
    }

    pub fn record(&self, name: &str) -> Arc<ClosureRecord> {
        let coordinates = artifact(name);
        self.records()
            .into_iter()
            .find(|record| *record.coordinates() == coordinates)
            .unwrap_or_else(|| panic!("no record for {}", name))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records()
            .iter()
            .map(|record| record.coordinates().artifact_id.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl OutputSink for CollectingSink {
    async fn accept(&self, record: Arc<ClosureRecord>) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

pub fn collaborators(repository: &Arc<FakeRepository>, sink: &Arc<CollectingSink>) -> Collaborators {
    Collaborators {
        version_resolver: repository.clone(),
        dependency_resolver: repository.clone(),
        downloader: repository.clone(),
        analyzer: repository.clone(),
        output: sink.clone(),
    }
}

/// Runs the orchestrator with a worker pool until nothing is left to do
pub async fn run_to_completion(
    orchestrator: &mut Orchestrator,
    repository: &Arc<FakeRepository>,
    sink: &Arc<CollectingSink>,
    projects: &[&str],
) {
    depwall::core::logging::init_for_tests();
    let config: AnalysisConfig = orchestrator.config().clone();
    let pool = WorkerPool::spawn(orchestrator.handle(), collaborators(repository, sink), &config);
    for name in projects {
        orchestrator.add_project(project(name)).await.unwrap();
    }

    let (_abort, abort_rx) = oneshot::channel();
    tokio::time::timeout(Duration::from_secs(20), orchestrator.run_until_idle(abort_rx))
        .await
        .expect("analysis did not finish")
        .unwrap();
    pool.join().await.unwrap();
}
