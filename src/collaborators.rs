//! Interfaces of the external services the engine drives.
//!
//! None of these are implemented against a real package repository or analysis tool here; the
//! worker pools call them and convert their errors into stage failures.

use crate::artifact::{DownloadedArtifact, Violation};
use crate::closure::ClosureRecord;
use crate::coordinates::{ArtifactCoordinates, ProjectCoordinates};
use crate::persistence::PersistedClosure;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Resolves the published versions of a project
#[async_trait]
pub trait VersionResolver: Send + Sync {
    async fn resolve_versions(
        &self,
        project: &ProjectCoordinates,
    ) -> anyhow::Result<BTreeSet<ArtifactCoordinates>>;
}

/// Resolves the direct, non-test dependencies of an artifact
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    async fn resolve_direct_dependencies(
        &self,
        artifact: &ArtifactCoordinates,
    ) -> anyhow::Result<BTreeSet<ArtifactCoordinates>>;
}

/// Fetches an artifact's binary and returns where it landed
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, artifact: &ArtifactCoordinates) -> anyhow::Result<PathBuf>;
}

/// Inspects a downloaded binary for uses of forbidden internal types
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, artifact: &DownloadedArtifact) -> anyhow::Result<BTreeSet<Violation>>;
}

/// Receives every finalized record
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn accept(&self, record: Arc<ClosureRecord>) -> anyhow::Result<()>;
}

/// Supplies projects to analyze
#[async_trait]
pub trait ProjectSource: Send + Sync {
    async fn projects(&self) -> anyhow::Result<Vec<ProjectCoordinates>>;
}

/// The full set of collaborators a worker pool needs
#[derive(Clone)]
pub struct Collaborators {
    pub version_resolver: Arc<dyn VersionResolver>,
    pub dependency_resolver: Arc<dyn DependencyResolver>,
    pub downloader: Arc<dyn Downloader>,
    pub analyzer: Arc<dyn Analyzer>,
    pub output: Arc<dyn OutputSink>,
}

/// Writes each record to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

#[async_trait]
impl OutputSink for LoggingSink {
    async fn accept(&self, record: Arc<ClosureRecord>) -> anyhow::Result<()> {
        tracing::info!("Completed:\n{}", record.to_long_string());
        Ok(())
    }
}

/// Appends each record as one JSON line to a file
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OutputSink for JsonLinesSink {
    async fn accept(&self, record: Arc<ClosureRecord>) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(&PersistedClosure::from_record(&record))?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("appending to {}", self.path.display()))?;
        Ok(())
    }
}

/// A fixed list of projects
#[derive(Debug, Default, Clone)]
pub struct StaticProjects(pub Vec<ProjectCoordinates>);

#[async_trait]
impl ProjectSource for StaticProjects {
    async fn projects(&self) -> anyhow::Result<Vec<ProjectCoordinates>> {
        Ok(self.0.clone())
    }
}

/// A plain text file of projects.
///
/// The file starts with comment lines, followed by one empty line, followed by one
/// `groupId:artifactId` per line. The empty line is required even without comments.
#[derive(Debug, Clone)]
pub struct ProjectListFile {
    path: PathBuf,
}

impl ProjectListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(content: &str) -> anyhow::Result<Vec<ProjectCoordinates>> {
        content
            .lines()
            .skip_while(|line| !line.trim().is_empty())
            .skip(1)
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<ProjectCoordinates>()
                    .with_context(|| format!("invalid project line '{}'", line))
            })
            .collect()
    }
}

#[async_trait]
impl ProjectSource for ProjectListFile {
    async fn projects(&self) -> anyhow::Result<Vec<ProjectCoordinates>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading project list {}", self.path.display()))?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_list_skips_header() {
        let content = "# projects to scan\n# one per line\n\norg.slf4j:slf4j-api\n  com.google.guava:guava  \n\n";
        let projects = ProjectListFile::parse(content).unwrap();
        assert_eq!(
            projects,
            vec![
                ProjectCoordinates::new("org.slf4j", "slf4j-api"),
                ProjectCoordinates::new("com.google.guava", "guava"),
            ]
        );
    }

    #[test]
    fn test_project_list_without_separator_is_empty() {
        assert!(ProjectListFile::parse("org.slf4j:slf4j-api\n").unwrap().is_empty());
    }

    #[test]
    fn test_project_list_rejects_malformed_line() {
        let err = ProjectListFile::parse("\nnot-a-project\n").unwrap_err();
        assert!(format!("{:#}", err).contains("not-a-project"));
    }

    #[tokio::test]
    async fn test_json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesSink::new(dir.path().join("records.jsonl"));
        for artifact in ["a", "b"] {
            let coordinates = ArtifactCoordinates::new("org.example", artifact, "1.0");
            let record = ClosureRecord::new(coordinates, Ok(BTreeSet::new()), Ok(vec![]));
            sink.accept(Arc::new(record)).await.unwrap();
        }

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<PersistedClosure> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].artifact.artifact_id, "b");
        assert!(content.contains("\"marker\":\"NONE\""));
    }

    #[tokio::test]
    async fn test_project_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.txt");
        std::fs::write(&path, "\njunit:junit\n").unwrap();

        let source = ProjectListFile::new(&path);
        assert_eq!(
            source.projects().await.unwrap(),
            vec![ProjectCoordinates::new("junit", "junit")]
        );
    }
}
