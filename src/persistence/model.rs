use crate::artifact::{
    AnalyzedArtifact, DownloadedArtifact, FailedArtifact, FailedProject, IdentifiesArtifact,
    ResolvedArtifact, ResolvedProject, StageFailure, Violation,
};
use crate::closure::{ClosureRecord, InternalDependencies};
use crate::coordinates::{ArtifactCoordinates, ProjectCoordinates};
use crate::core::errors::{DepwallError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// A completed record flattened for storage: dependees by coordinates instead of by reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedClosure {
    pub artifact: ArtifactCoordinates,
    pub marker: InternalDependencies,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations: Option<BTreeSet<Violation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<StageFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependees: Option<BTreeSet<ArtifactCoordinates>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_error: Option<StageFailure>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub cyclic_dependees: BTreeSet<ArtifactCoordinates>,
    pub completed_at: DateTime<Utc>,
}

impl PersistedClosure {
    pub fn from_record(record: &ClosureRecord) -> Self {
        let (violations, analysis_error) = match record.violations() {
            Ok(violations) => (Some(violations.clone()), None),
            Err(failure) => (None, Some(failure.clone())),
        };
        let (dependees, resolution_error) = match record.dependees() {
            Ok(records) => (
                Some(records.iter().map(|r| r.coordinates().clone()).collect()),
                None,
            ),
            Err(failure) => (None, Some(failure.clone())),
        };
        Self {
            artifact: record.coordinates().clone(),
            marker: record.marker(),
            violations,
            analysis_error,
            dependees,
            resolution_error,
            cyclic_dependees: record.cyclic_dependees().clone(),
            completed_at: Utc::now(),
        }
    }
}

/// The stored document. Sections are prefixed with their pipeline step so they stay in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedAnalysis {
    pub step_1_projects: Vec<ProjectCoordinates>,
    pub step_2_resolved_projects: Vec<ResolvedProject>,
    pub step_2_resolution_failed_projects: Vec<FailedProject>,
    pub step_3_downloaded_artifacts: Vec<DownloadedArtifact>,
    pub step_3_download_failed_artifacts: Vec<FailedArtifact>,
    pub step_4_analyzed_artifacts: Vec<AnalyzedArtifact>,
    pub step_4_analysis_failed_artifacts: Vec<FailedArtifact>,
    pub step_5_resolved_artifacts: Vec<ResolvedArtifact>,
    pub step_5_resolution_failed_artifacts: Vec<FailedArtifact>,
    pub step_6_completed_artifacts: Vec<PersistedClosure>,
}

impl PersistedAnalysis {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Rebuilds the completed records, dependees before their dependents, so every record can
    /// reference the records of its dependees
    pub fn restore_closures(&self) -> Result<Vec<Arc<ClosureRecord>>> {
        let by_coordinates: HashMap<&ArtifactCoordinates, &PersistedClosure> = self
            .step_6_completed_artifacts
            .iter()
            .map(|closure| (&closure.artifact, closure))
            .collect();
        let mut restored: HashMap<ArtifactCoordinates, Arc<ClosureRecord>> = HashMap::new();
        let mut ordered = Vec::with_capacity(by_coordinates.len());

        for root in &self.step_6_completed_artifacts {
            // (coordinates, dependees already pushed)
            let mut stack = vec![(&root.artifact, false)];
            let mut visiting: HashSet<&ArtifactCoordinates> = HashSet::new();
            while let Some((coordinates, expanded)) = stack.pop() {
                if restored.contains_key(coordinates) {
                    continue;
                }
                let closure = by_coordinates.get(coordinates).ok_or_else(|| {
                    DepwallError::persistence(format!(
                        "restore: completed dependee {} is missing",
                        coordinates
                    ))
                })?;
                let dependees: Vec<&ArtifactCoordinates> =
                    closure.dependees.iter().flatten().collect();
                if expanded {
                    let record = Arc::new(Self::restore_one(closure, &restored)?);
                    restored.insert(coordinates.clone(), record.clone());
                    ordered.push(record);
                    continue;
                }
                if !visiting.insert(coordinates) {
                    return Err(DepwallError::persistence(format!(
                        "restore: {} depends on itself through completed records",
                        coordinates
                    )));
                }
                stack.push((coordinates, true));
                for dependee in dependees {
                    if !restored.contains_key(dependee) {
                        stack.push((dependee, false));
                    }
                }
            }
        }
        Ok(ordered)
    }

    fn restore_one(
        closure: &PersistedClosure,
        restored: &HashMap<ArtifactCoordinates, Arc<ClosureRecord>>,
    ) -> Result<ClosureRecord> {
        let violations = match (&closure.violations, &closure.analysis_error) {
            (Some(violations), _) => Ok(violations.clone()),
            (None, Some(failure)) => Err(failure.clone()),
            (None, None) => {
                return Err(DepwallError::persistence(format!(
                    "restore: {} has neither violations nor an analysis error",
                    closure.artifact
                )))
            }
        };
        let dependees = match (&closure.dependees, &closure.resolution_error) {
            (Some(dependees), _) => Ok(dependees
                .iter()
                .map(|dependee| {
                    restored.get(dependee).cloned().ok_or_else(|| {
                        DepwallError::persistence(format!(
                            "restore: dependee {} of {} was not restored",
                            dependee, closure.artifact
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?),
            (None, Some(failure)) => Err(failure.clone()),
            (None, None) => {
                return Err(DepwallError::persistence(format!(
                    "restore: {} has neither dependees nor a resolution error",
                    closure.artifact
                )))
            }
        };
        Ok(ClosureRecord::with_marker(
            closure.artifact.clone(),
            closure.marker,
            violations,
            dependees,
            closure.cyclic_dependees.clone(),
        ))
    }
}

/// Working copy of the stored data: one entry per key, latest outcome wins
#[derive(Debug, Default)]
pub(super) struct Store {
    pub(super) projects: BTreeSet<ProjectCoordinates>,
    pub(super) resolved_projects: BTreeMap<ProjectCoordinates, ResolvedProject>,
    pub(super) failed_projects: BTreeMap<ProjectCoordinates, FailedProject>,
    pub(super) downloaded: BTreeMap<ArtifactCoordinates, DownloadedArtifact>,
    pub(super) download_failed: BTreeMap<ArtifactCoordinates, FailedArtifact>,
    pub(super) analyzed: BTreeMap<ArtifactCoordinates, AnalyzedArtifact>,
    pub(super) analysis_failed: BTreeMap<ArtifactCoordinates, FailedArtifact>,
    pub(super) resolved: BTreeMap<ArtifactCoordinates, ResolvedArtifact>,
    pub(super) resolution_failed: BTreeMap<ArtifactCoordinates, FailedArtifact>,
    pub(super) completed: BTreeMap<ArtifactCoordinates, PersistedClosure>,
}

/// Inserts `value` under its key and drops the opposite outcome for the same key
pub(super) fn record_outcome<K: Ord + Clone, V, W>(
    key: &K,
    value: V,
    into: &mut BTreeMap<K, V>,
    superseded: &mut BTreeMap<K, W>,
) {
    superseded.remove(key);
    into.insert(key.clone(), value);
}

impl From<PersistedAnalysis> for Store {
    fn from(analysis: PersistedAnalysis) -> Self {
        fn keyed<V: IdentifiesArtifact>(values: Vec<V>) -> BTreeMap<ArtifactCoordinates, V> {
            values
                .into_iter()
                .map(|value| (value.coordinates().clone(), value))
                .collect()
        }
        Self {
            projects: analysis.step_1_projects.into_iter().collect(),
            resolved_projects: analysis
                .step_2_resolved_projects
                .into_iter()
                .map(|p| (p.project.clone(), p))
                .collect(),
            failed_projects: analysis
                .step_2_resolution_failed_projects
                .into_iter()
                .map(|p| (p.project.clone(), p))
                .collect(),
            downloaded: keyed(analysis.step_3_downloaded_artifacts),
            download_failed: keyed(analysis.step_3_download_failed_artifacts),
            analyzed: keyed(analysis.step_4_analyzed_artifacts),
            analysis_failed: keyed(analysis.step_4_analysis_failed_artifacts),
            resolved: keyed(analysis.step_5_resolved_artifacts),
            resolution_failed: keyed(analysis.step_5_resolution_failed_artifacts),
            completed: analysis
                .step_6_completed_artifacts
                .into_iter()
                .map(|c| (c.artifact.clone(), c))
                .collect(),
        }
    }
}

impl From<&Store> for PersistedAnalysis {
    fn from(store: &Store) -> Self {
        Self {
            step_1_projects: store.projects.iter().cloned().collect(),
            step_2_resolved_projects: store.resolved_projects.values().cloned().collect(),
            step_2_resolution_failed_projects: store.failed_projects.values().cloned().collect(),
            step_3_downloaded_artifacts: store.downloaded.values().cloned().collect(),
            step_3_download_failed_artifacts: store.download_failed.values().cloned().collect(),
            step_4_analyzed_artifacts: store.analyzed.values().cloned().collect(),
            step_4_analysis_failed_artifacts: store.analysis_failed.values().cloned().collect(),
            step_5_resolved_artifacts: store.resolved.values().cloned().collect(),
            step_5_resolution_failed_artifacts: store.resolution_failed.values().cloned().collect(),
            step_6_completed_artifacts: store.completed.values().cloned().collect(),
        }
    }
}
