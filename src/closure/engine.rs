use super::record::{ClosureRecord, ViolationsOutcome};
use crate::artifact::{IdentifiesArtifact, StageFailure};
use crate::coordinates::ArtifactCoordinates;
use crate::core::errors::{DepwallError, Result};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of dependee resolution as handed to the engine
pub type ResolutionOutcome = std::result::Result<BTreeSet<ArtifactCoordinates>, StageFailure>;

/// Raw outcome of both stages that feed a closure
#[derive(Debug)]
pub(super) struct Analyzed {
    pub(super) violations: ViolationsOutcome,
    pub(super) dependees: ResolutionOutcome,
}

/// Working record of a dispatched artifact
#[derive(Debug, Default)]
pub(super) struct InProgress {
    /// `None` until `on_analyzed` was called for the artifact
    pub(super) analyzed: Option<Analyzed>,
    /// Dependees whose closure is still outstanding
    pub(super) remaining: BTreeSet<ArtifactCoordinates>,
}

impl InProgress {
    fn is_ready(&self) -> bool {
        self.analyzed.is_some() && self.remaining.is_empty()
    }
}

/// Counts for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClosureStats {
    pub pending: usize,
    pub awaiting_analysis: usize,
    pub awaiting_dependees: usize,
    pub closed: usize,
    pub waiting_edges: usize,
}

impl fmt::Display for ClosureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending={} awaiting_analysis={} awaiting_dependees={} closed={} waiting_edges={}",
            self.pending,
            self.awaiting_analysis,
            self.awaiting_dependees,
            self.closed,
            self.waiting_edges
        )
    }
}

/// Completion-counting closure over a dependency graph that grows while it is traversed.
///
/// Every method takes `&mut self`: the engine has exactly one owner (the orchestrator loop) and
/// a cascade therefore never interleaves with another one.
#[derive(Debug, Default)]
pub struct ClosureEngine {
    pub(super) pending: BTreeSet<ArtifactCoordinates>,
    pub(super) in_progress: HashMap<ArtifactCoordinates, InProgress>,
    pub(super) closed: HashMap<ArtifactCoordinates, Arc<ClosureRecord>>,
    /// dependee -> dependents blocked on it
    pub(super) waiters: HashMap<ArtifactCoordinates, BTreeSet<ArtifactCoordinates>>,
}

impl ClosureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds records that were completed in an earlier run
    pub fn restore<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = Arc<ClosureRecord>>,
    {
        let mut restored = 0;
        for record in records {
            let coordinates = record.coordinates().clone();
            self.pending.remove(&coordinates);
            self.in_progress.remove(&coordinates);
            self.closed.insert(coordinates, record);
            restored += 1;
        }
        debug!(restored, "Restored closed artifacts");
    }

    /// Adds the artifact to `pending` unless the engine already knows it; returns whether it was added
    pub fn submit(&mut self, coordinates: ArtifactCoordinates) -> bool {
        if self.is_known(&coordinates) {
            return false;
        }
        debug!(artifact = %coordinates, "Submitted for closure");
        self.pending.insert(coordinates)
    }

    /// Moves every pending artifact into `in_progress` and returns them
    pub fn dispatch(&mut self) -> BTreeSet<ArtifactCoordinates> {
        let dispatched = std::mem::take(&mut self.pending);
        for coordinates in &dispatched {
            self.in_progress.entry(coordinates.clone()).or_default();
        }
        dispatched
    }

    /// Records the raw outcome for `coordinates` and closes whatever that makes closable.
    ///
    /// Returns every record closed by this call: the artifact itself if all its dependees were
    /// already closed, plus the cascade of dependents that were only waiting on it. An artifact
    /// that is already closed is ignored.
    pub fn on_analyzed(
        &mut self,
        coordinates: &ArtifactCoordinates,
        violations: ViolationsOutcome,
        dependees: ResolutionOutcome,
    ) -> Result<Vec<Arc<ClosureRecord>>> {
        if self.closed.contains_key(coordinates) {
            debug!(artifact = %coordinates, "Already closed, ignoring analysis");
            return Ok(Vec::new());
        }
        let analyzed_before = self
            .in_progress
            .get(coordinates)
            .map_or(false, |entry| entry.analyzed.is_some());
        if analyzed_before {
            return Err(DepwallError::invariant(coordinates, "analyzed twice"));
        }
        self.pending.remove(coordinates);

        let mut remaining = BTreeSet::new();
        let mut discovered = Vec::new();
        if let Ok(dependees) = &dependees {
            for dependee in dependees {
                if self.closed.contains_key(dependee) {
                    continue;
                }
                remaining.insert(dependee.clone());
                self.waiters
                    .entry(dependee.clone())
                    .or_default()
                    .insert(coordinates.clone());
                if dependee != coordinates && !self.is_known(dependee) {
                    discovered.push(dependee.clone());
                }
            }
        }

        let entry = self.in_progress.entry(coordinates.clone()).or_default();
        entry.analyzed = Some(Analyzed {
            violations,
            dependees,
        });
        entry.remaining = remaining;
        let ready = entry.is_ready();

        for dependee in discovered {
            self.submit(dependee);
        }

        if !ready {
            debug!(
                artifact = %coordinates,
                waiting_on = self.in_progress.get(coordinates).map_or(0, |e| e.remaining.len()),
                "Analyzed, waiting for dependees"
            );
            return Ok(Vec::new());
        }

        let mut closed_now = Vec::new();
        self.cascade(VecDeque::from([coordinates.clone()]), &mut closed_now)?;
        Ok(closed_now)
    }

    /// Closes every artifact in `ready` and then, transitively, every dependent that only waited
    /// on artifacts closed along the way
    pub(super) fn cascade(
        &mut self,
        mut ready: VecDeque<ArtifactCoordinates>,
        closed_now: &mut Vec<Arc<ClosureRecord>>,
    ) -> Result<()> {
        while let Some(next) = ready.pop_front() {
            let record = self.finalize(&next)?;
            info!(artifact = %next, marker = %record.marker(), "Artifact closed");
            closed_now.push(record);
            self.release_waiters(&next, &mut ready)?;
        }
        Ok(())
    }

    /// Builds the record of a ready artifact and moves it to `closed`
    fn finalize(&mut self, coordinates: &ArtifactCoordinates) -> Result<Arc<ClosureRecord>> {
        let entry = self
            .in_progress
            .remove(coordinates)
            .ok_or_else(|| DepwallError::invariant(coordinates, "closed while not in progress"))?;
        let analyzed = entry
            .analyzed
            .ok_or_else(|| DepwallError::invariant(coordinates, "closed before it was analyzed"))?;

        let dependees = match analyzed.dependees {
            Ok(dependees) => Ok(self.closed_records(coordinates, &dependees)?),
            Err(failure) => Err(failure),
        };
        let record = Arc::new(ClosureRecord::new(
            coordinates.clone(),
            analyzed.violations,
            dependees,
        ));
        self.closed.insert(coordinates.clone(), record.clone());
        Ok(record)
    }

    pub(super) fn closed_records<'a, I>(
        &self,
        dependent: &ArtifactCoordinates,
        dependees: I,
    ) -> Result<Vec<Arc<ClosureRecord>>>
    where
        I: IntoIterator<Item = &'a ArtifactCoordinates>,
    {
        dependees
            .into_iter()
            .map(|dependee| {
                self.closed.get(dependee).cloned().ok_or_else(|| {
                    DepwallError::invariant(
                        dependent,
                        format!("dependee {} is not closed", dependee),
                    )
                })
            })
            .collect()
    }

    /// Unblocks the dependents of a just-closed artifact and queues those that became ready
    pub(super) fn release_waiters(
        &mut self,
        closed: &ArtifactCoordinates,
        ready: &mut VecDeque<ArtifactCoordinates>,
    ) -> Result<()> {
        let Some(dependents) = self.waiters.remove(closed) else {
            return Ok(());
        };
        for dependent in dependents {
            if self.closed.contains_key(&dependent) {
                continue;
            }
            let entry = self
                .in_progress
                .get_mut(&dependent)
                .ok_or_else(|| DepwallError::node_not_found(&dependent))?;
            entry.remaining.remove(closed);
            if entry.is_ready() {
                debug!(artifact = %dependent, unblocked_by = %closed, "Dependent ready");
                ready.push_back(dependent);
            }
        }
        Ok(())
    }

    pub fn is_known(&self, coordinates: &ArtifactCoordinates) -> bool {
        self.pending.contains(coordinates)
            || self.in_progress.contains_key(coordinates)
            || self.closed.contains_key(coordinates)
    }

    pub fn is_closed(&self, coordinates: &ArtifactCoordinates) -> bool {
        self.closed.contains_key(coordinates)
    }

    pub fn is_pending(&self, coordinates: &ArtifactCoordinates) -> bool {
        self.pending.contains(coordinates)
    }

    pub fn closed_record(&self, coordinates: &ArtifactCoordinates) -> Option<Arc<ClosureRecord>> {
        self.closed.get(coordinates).cloned()
    }

    /// Every closed record, sorted by coordinates
    pub fn closed_records_sorted(&self) -> Vec<Arc<ClosureRecord>> {
        let mut coordinates: Vec<&ArtifactCoordinates> = self.closed.keys().collect();
        coordinates.sort();
        coordinates
            .into_iter()
            .filter_map(|c| self.closed.get(c).cloned())
            .collect()
    }

    /// Artifacts still waiting on the given dependee
    pub fn waiters_of(&self, dependee: &ArtifactCoordinates) -> BTreeSet<ArtifactCoordinates> {
        self.waiters.get(dependee).cloned().unwrap_or_default()
    }

    pub fn stats(&self) -> ClosureStats {
        let awaiting_analysis = self
            .in_progress
            .values()
            .filter(|entry| entry.analyzed.is_none())
            .count();
        ClosureStats {
            pending: self.pending.len(),
            awaiting_analysis,
            awaiting_dependees: self.in_progress.len() - awaiting_analysis,
            closed: self.closed.len(),
            waiting_edges: self.waiters.values().map(BTreeSet::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Violation;
    use crate::closure::InternalDependencies;
    use pretty_assertions::assert_eq;

    fn coords(artifact: &str) -> ArtifactCoordinates {
        ArtifactCoordinates::new("org.example", artifact, "1.0")
    }

    fn deps(artifacts: &[&str]) -> ResolutionOutcome {
        Ok(artifacts.iter().map(|a| coords(a)).collect())
    }

    fn clean() -> ViolationsOutcome {
        Ok(BTreeSet::new())
    }

    fn dirty() -> ViolationsOutcome {
        Ok([Violation::new("org.example.Foo", ["sun.misc.Unsafe"]).unwrap()]
            .into_iter()
            .collect())
    }

    fn closed_names(records: &[Arc<ClosureRecord>]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.coordinates().artifact_id.clone())
            .collect()
    }

    #[test]
    fn test_no_dependencies_close_immediately() {
        let mut engine = ClosureEngine::new();
        engine.submit(coords("a"));
        engine.dispatch();

        let closed = engine.on_analyzed(&coords("a"), clean(), deps(&[])).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].marker(), InternalDependencies::None);
        assert!(engine.is_closed(&coords("a")));
    }

    #[test]
    fn test_single_dependency_gates_closure() {
        let mut engine = ClosureEngine::new();
        engine.submit(coords("a"));
        engine.dispatch();

        let closed = engine.on_analyzed(&coords("a"), clean(), deps(&["b"])).unwrap();
        assert!(closed.is_empty());
        assert!(engine.is_pending(&coords("b")));
        assert_eq!(engine.dispatch(), [coords("b")].into_iter().collect());

        let closed = engine.on_analyzed(&coords("b"), clean(), deps(&[])).unwrap();
        assert_eq!(closed_names(&closed), vec!["b", "a"]);
        let a = engine.closed_record(&coords("a")).unwrap();
        let a_dependees = a.dependees().unwrap();
        assert_eq!(a_dependees.len(), 1);
        assert!(Arc::ptr_eq(&a_dependees[0], &closed[0]));
    }

    #[test]
    fn test_idempotent_submission() {
        let mut engine = ClosureEngine::new();
        assert!(engine.submit(coords("a")));
        assert!(!engine.submit(coords("a")));
        assert_eq!(engine.stats().pending, 1);
        assert_eq!(engine.dispatch().len(), 1);
        assert!(!engine.submit(coords("a")));
        assert!(engine.dispatch().is_empty());
    }

    #[test]
    fn test_chain_closed_one_at_a_time() {
        // a -> b -> c, analyzed bottom up
        let mut engine = ClosureEngine::new();
        let sizes: Vec<usize> = vec![
            engine.on_analyzed(&coords("c"), clean(), deps(&[])).unwrap().len(),
            engine.on_analyzed(&coords("b"), clean(), deps(&["c"])).unwrap().len(),
            engine.on_analyzed(&coords("a"), clean(), deps(&["b"])).unwrap().len(),
        ];
        assert_eq!(sizes, vec![1, 1, 1]);
    }

    #[test]
    fn test_chain_cascades_in_one_call() {
        // a -> b -> c, analyzed top down: closing c closes b and a
        let mut engine = ClosureEngine::new();
        assert!(engine.on_analyzed(&coords("a"), clean(), deps(&["b"])).unwrap().is_empty());
        assert!(engine.on_analyzed(&coords("b"), dirty(), deps(&["c"])).unwrap().is_empty());

        let closed = engine.on_analyzed(&coords("c"), clean(), deps(&[])).unwrap();
        assert_eq!(closed_names(&closed), vec!["c", "b", "a"]);
        let markers: Vec<InternalDependencies> = closed.iter().map(|r| r.marker()).collect();
        assert_eq!(
            markers,
            vec![
                InternalDependencies::None,
                InternalDependencies::Direct,
                InternalDependencies::Indirect
            ]
        );
        assert_eq!(engine.stats().waiting_edges, 0);
    }

    #[test]
    fn test_diamond_waits_for_both_sides() {
        let mut engine = ClosureEngine::new();
        engine.on_analyzed(&coords("top"), clean(), deps(&["left", "right"])).unwrap();
        engine.on_analyzed(&coords("left"), clean(), deps(&["bottom"])).unwrap();
        engine.on_analyzed(&coords("right"), clean(), deps(&["bottom"])).unwrap();

        let closed = engine.on_analyzed(&coords("bottom"), clean(), deps(&[])).unwrap();
        assert_eq!(closed_names(&closed), vec!["bottom", "left", "right", "top"]);
    }

    #[test]
    fn test_failed_resolution_closes_without_dependees() {
        let mut engine = ClosureEngine::new();
        let closed = engine
            .on_analyzed(&coords("a"), clean(), Err(StageFailure::new("pom unavailable")))
            .unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].marker(), InternalDependencies::Unknown);
        assert!(engine.dispatch().is_empty());
    }

    #[test]
    fn test_closed_artifact_is_ignored() {
        let mut engine = ClosureEngine::new();
        engine.on_analyzed(&coords("a"), clean(), deps(&[])).unwrap();
        let closed = engine.on_analyzed(&coords("a"), dirty(), deps(&[])).unwrap();
        assert!(closed.is_empty());
        assert_eq!(
            engine.closed_record(&coords("a")).unwrap().marker(),
            InternalDependencies::None
        );
    }

    #[test]
    fn test_double_analysis_is_an_invariant_violation() {
        let mut engine = ClosureEngine::new();
        engine.on_analyzed(&coords("a"), clean(), deps(&["b"])).unwrap();
        let err = engine.on_analyzed(&coords("a"), clean(), deps(&["b"])).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_restored_dependee_counts_as_closed() {
        let mut engine = ClosureEngine::new();
        let b = Arc::new(ClosureRecord::new(coords("b"), dirty(), Ok(vec![])));
        engine.restore([b]);

        let closed = engine.on_analyzed(&coords("a"), clean(), deps(&["b"])).unwrap();
        assert_eq!(closed_names(&closed), vec!["a"]);
        assert_eq!(closed[0].marker(), InternalDependencies::Indirect);
        assert!(!engine.submit(coords("b")));
    }

    #[test]
    fn test_stats() {
        let mut engine = ClosureEngine::new();
        engine.submit(coords("x"));
        engine.submit(coords("y"));
        engine.dispatch();
        engine.on_analyzed(&coords("x"), clean(), deps(&["z"])).unwrap();

        assert_eq!(
            engine.stats(),
            ClosureStats {
                pending: 1,
                awaiting_analysis: 1,
                awaiting_dependees: 1,
                closed: 0,
                waiting_edges: 1,
            }
        );
        assert_eq!(engine.waiters_of(&coords("z")), [coords("x")].into_iter().collect());
    }
}
