//! The live dependency graph: project and artifact nodes keyed by coordinates, plus an index from
//! each dependee to the artifacts depending on it.

pub mod node;

pub use node::{ArtifactNode, ArtifactStage, ProjectNode};

use crate::coordinates::{ArtifactCoordinates, ProjectCoordinates};
use crate::core::errors::{DepwallError, Result};
use crate::task::TaskStateKind;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Node counts per stage state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub projects: usize,
    pub artifacts: usize,
    pub closed_artifacts: usize,
    pub dependency_edges: usize,
    pub version_resolution: BTreeMap<TaskStateKind, usize>,
    pub download: BTreeMap<TaskStateKind, usize>,
    pub analysis: BTreeMap<TaskStateKind, usize>,
    pub dependency_resolution: BTreeMap<TaskStateKind, usize>,
}

impl GraphStats {
    /// Count of artifacts whose stage is in the given state
    pub fn artifacts_in(&self, stage: ArtifactStage, state: TaskStateKind) -> usize {
        let counts = match stage {
            ArtifactStage::Download => &self.download,
            ArtifactStage::Analysis => &self.analysis,
            ArtifactStage::DependencyResolution => &self.dependency_resolution,
        };
        counts.get(&state).copied().unwrap_or(0)
    }
}

fn format_counts(counts: &BTreeMap<TaskStateKind, usize>) -> String {
    counts
        .iter()
        .map(|(state, count)| format!("{}:{}", state, count))
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for GraphStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects={} artifacts={} closed={} edges={} | versions[{}] download[{}] analysis[{}] dependencies[{}]",
            self.projects,
            self.artifacts,
            self.closed_artifacts,
            self.dependency_edges,
            format_counts(&self.version_resolution),
            format_counts(&self.download),
            format_counts(&self.analysis),
            format_counts(&self.dependency_resolution),
        )
    }
}

/// Arena of nodes keyed by coordinates.
///
/// Node creation goes through the map's entry API and is therefore atomic: a coordinate gets at
/// most one node no matter how often, or from where, it is added.
#[derive(Debug, Default)]
pub struct AnalysisGraph {
    projects: DashMap<ProjectCoordinates, ProjectNode>,
    artifacts: DashMap<ArtifactCoordinates, ArtifactNode>,
    /// If artifact A depends on B, then dependents[B] contains A
    dependents: DashMap<ArtifactCoordinates, DashSet<ArtifactCoordinates>>,
}

impl AnalysisGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a project node; returns whether it was created
    pub fn add_project(&self, coordinates: ProjectCoordinates) -> bool {
        let mut created = false;
        self.projects.entry(coordinates.clone()).or_insert_with(|| {
            created = true;
            ProjectNode::new(coordinates.clone())
        });
        if created {
            debug!(project = %coordinates, "Project node created");
        }
        created
    }

    /// Adds an artifact node; returns whether it was created
    pub fn add_artifact(&self, coordinates: ArtifactCoordinates) -> bool {
        let mut created = false;
        self.artifacts.entry(coordinates.clone()).or_insert_with(|| {
            created = true;
            ArtifactNode::new(coordinates.clone())
        });
        if created {
            debug!(artifact = %coordinates, "Artifact node created");
        }
        created
    }

    /// Links resolved versions to their project, creating artifact nodes as needed.
    ///
    /// Returns the artifacts that did not have a node before.
    pub fn add_versions<I>(&self, project: &ProjectCoordinates, versions: I) -> Result<Vec<ArtifactCoordinates>>
    where
        I: IntoIterator<Item = ArtifactCoordinates>,
    {
        let versions: Vec<ArtifactCoordinates> = versions.into_iter().collect();
        {
            let mut node = self
                .projects
                .get_mut(project)
                .ok_or_else(|| DepwallError::node_not_found(project))?;
            for version in &versions {
                node.add_version(version.clone());
            }
        }
        Ok(versions
            .into_iter()
            .filter(|version| self.add_artifact(version.clone()))
            .collect())
    }

    /// Records the edges dependent -> dependee once resolution succeeded, creating dependee nodes
    /// as needed. Edges are never removed.
    ///
    /// Returns the dependees that did not have a node before.
    pub fn add_dependees<'a, I>(&self, dependent: &ArtifactCoordinates, dependees: I) -> Result<Vec<ArtifactCoordinates>>
    where
        I: IntoIterator<Item = &'a ArtifactCoordinates>,
    {
        if !self.artifacts.contains_key(dependent) {
            return Err(DepwallError::node_not_found(dependent));
        }
        let mut discovered = Vec::new();
        for dependee in dependees {
            self.dependents
                .entry(dependee.clone())
                .or_insert_with(DashSet::new)
                .insert(dependent.clone());
            if self.add_artifact(dependee.clone()) {
                discovered.push(dependee.clone());
            }
        }
        Ok(discovered)
    }

    /// Artifacts that depend on `dependee`, sorted
    pub fn dependents_of(&self, dependee: &ArtifactCoordinates) -> Vec<ArtifactCoordinates> {
        let mut dependents: Vec<ArtifactCoordinates> = self
            .dependents
            .get(dependee)
            .map(|set| set.iter().map(|d| d.clone()).collect())
            .unwrap_or_default();
        dependents.sort();
        dependents
    }

    pub fn contains_project(&self, coordinates: &ProjectCoordinates) -> bool {
        self.projects.contains_key(coordinates)
    }

    pub fn contains_artifact(&self, coordinates: &ArtifactCoordinates) -> bool {
        self.artifacts.contains_key(coordinates)
    }

    /// Runs `f` on the project node. The node is locked while `f` runs, so `f` must not call
    /// back into the graph.
    pub fn update_project<T, F>(&self, coordinates: &ProjectCoordinates, f: F) -> Result<T>
    where
        F: FnOnce(&mut ProjectNode) -> Result<T>,
    {
        let mut node = self
            .projects
            .get_mut(coordinates)
            .ok_or_else(|| DepwallError::node_not_found(coordinates))?;
        f(&mut node)
    }

    /// Runs `f` on the artifact node; the same locking rule as for [`Self::update_project`] applies
    pub fn update_artifact<T, F>(&self, coordinates: &ArtifactCoordinates, f: F) -> Result<T>
    where
        F: FnOnce(&mut ArtifactNode) -> Result<T>,
    {
        let mut node = self
            .artifacts
            .get_mut(coordinates)
            .ok_or_else(|| DepwallError::node_not_found(coordinates))?;
        f(&mut node)
    }

    pub fn read_project<T, F>(&self, coordinates: &ProjectCoordinates, f: F) -> Result<T>
    where
        F: FnOnce(&ProjectNode) -> T,
    {
        let node = self
            .projects
            .get(coordinates)
            .ok_or_else(|| DepwallError::node_not_found(coordinates))?;
        Ok(f(&node))
    }

    pub fn read_artifact<T, F>(&self, coordinates: &ArtifactCoordinates, f: F) -> Result<T>
    where
        F: FnOnce(&ArtifactNode) -> T,
    {
        let node = self
            .artifacts
            .get(coordinates)
            .ok_or_else(|| DepwallError::node_not_found(coordinates))?;
        Ok(f(&node))
    }

    /// Snapshot of all project coordinates, sorted
    pub fn project_coordinates(&self) -> Vec<ProjectCoordinates> {
        let mut coordinates: Vec<ProjectCoordinates> =
            self.projects.iter().map(|entry| entry.key().clone()).collect();
        coordinates.sort();
        coordinates
    }

    /// Snapshot of all artifact coordinates, sorted
    pub fn artifact_coordinates(&self) -> Vec<ArtifactCoordinates> {
        let mut coordinates: Vec<ArtifactCoordinates> =
            self.artifacts.iter().map(|entry| entry.key().clone()).collect();
        coordinates.sort();
        coordinates
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            projects: self.projects.len(),
            artifacts: self.artifacts.len(),
            dependency_edges: self.dependents.iter().map(|entry| entry.value().len()).sum(),
            ..GraphStats::default()
        };
        for project in self.projects.iter() {
            *stats
                .version_resolution
                .entry(project.version_resolution.current_state())
                .or_insert(0) += 1;
        }
        for artifact in self.artifacts.iter() {
            *stats.download.entry(artifact.download.current_state()).or_insert(0) += 1;
            *stats.analysis.entry(artifact.analysis.current_state()).or_insert(0) += 1;
            *stats
                .dependency_resolution
                .entry(artifact.dependency_resolution.current_state())
                .or_insert(0) += 1;
            if artifact.closure().is_some() {
                stats.closed_artifacts += 1;
            }
        }
        stats
    }
}
