use super::engine::ClosureEngine;
use super::marker::InternalDependencies;
use super::record::ClosureRecord;
use crate::coordinates::ArtifactCoordinates;
use crate::core::errors::{DepwallError, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

impl ClosureEngine {
    /// Closes dependency cycles that would otherwise block closure forever.
    ///
    /// Looks at analyzed artifacts that still wait on dependees. A strongly connected component
    /// among them (more than one member, or one member depending on itself) whose members wait on
    /// nothing outside the component is closed as a unit, and the cascade continues from there.
    /// Returns every record closed this way.
    pub fn break_cycles(&mut self) -> Result<Vec<Arc<ClosureRecord>>> {
        let mut graph: DiGraph<ArtifactCoordinates, ()> = DiGraph::new();
        let mut indices: HashMap<ArtifactCoordinates, NodeIndex> = HashMap::new();

        let mut blocked: Vec<&ArtifactCoordinates> = self
            .in_progress
            .iter()
            .filter(|(_, entry)| entry.analyzed.is_some() && !entry.remaining.is_empty())
            .map(|(coordinates, _)| coordinates)
            .collect();
        if blocked.is_empty() {
            return Ok(Vec::new());
        }
        blocked.sort();
        for coordinates in &blocked {
            indices.insert((*coordinates).clone(), graph.add_node((*coordinates).clone()));
        }
        for coordinates in &blocked {
            let from = indices[*coordinates];
            if let Some(entry) = self.in_progress.get(*coordinates) {
                for dependee in &entry.remaining {
                    if let Some(&to) = indices.get(dependee) {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }

        // Components come out dependees first, so an earlier closure can unblock a later one
        let components: Vec<BTreeSet<ArtifactCoordinates>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || graph.contains_edge(component[0], component[0])
            })
            .map(|component| component.into_iter().map(|i| graph[i].clone()).collect())
            .collect();

        let mut closed_now = Vec::new();
        for component in components {
            if self.is_closable_cycle(&component) {
                self.close_cycle(&component, &mut closed_now)?;
            } else {
                debug!(size = component.len(), "Cycle still waits on outside dependees");
            }
        }
        Ok(closed_now)
    }

    fn is_closable_cycle(&self, component: &BTreeSet<ArtifactCoordinates>) -> bool {
        component.iter().all(|member| {
            self.in_progress
                .get(member)
                .map_or(false, |entry| entry.remaining.is_subset(component))
        })
    }

    fn close_cycle(
        &mut self,
        component: &BTreeSet<ArtifactCoordinates>,
        closed_now: &mut Vec<Arc<ClosureRecord>>,
    ) -> Result<()> {
        let members: Vec<String> = component.iter().map(ToString::to_string).collect();
        warn!(cycle = %members.join(" -> "), "Breaking dependency cycle");

        let mut own_markers = HashMap::new();
        let mut outside = HashMap::new();
        for member in component {
            let analyzed = self
                .in_progress
                .get(member)
                .and_then(|entry| entry.analyzed.as_ref())
                .ok_or_else(|| DepwallError::invariant(member, "cycle member not analyzed"))?;
            own_markers.insert(
                member.clone(),
                InternalDependencies::from_analysis(analyzed.violations.as_ref()),
            );
            let dependees = analyzed
                .dependees
                .as_ref()
                .map_err(|_| DepwallError::invariant(member, "cycle member has no resolved dependees"))?;
            let outside_records =
                self.closed_records(member, dependees.iter().filter(|d| !component.contains(*d)))?;
            outside.insert(member.clone(), outside_records);
        }

        // Every member transitively reaches every other member and all their outside dependees
        let outside_markers: Vec<InternalDependencies> = outside
            .values()
            .flat_map(|records| records.iter().map(|record| record.marker()))
            .collect();

        for member in component {
            let others = own_markers
                .iter()
                .filter(|(other, _)| *other != member)
                .map(|(_, marker)| *marker);
            let reduced = InternalDependencies::reduce(others.chain(outside_markers.iter().copied()));
            let marker = own_markers[member].combine(reduced);

            let entry = self
                .in_progress
                .remove(member)
                .ok_or_else(|| DepwallError::invariant(member, "cycle member not in progress"))?;
            let analyzed = entry
                .analyzed
                .ok_or_else(|| DepwallError::invariant(member, "cycle member not analyzed"))?;
            let cyclic_dependees: BTreeSet<ArtifactCoordinates> = analyzed
                .dependees
                .as_ref()
                .map(|dependees| dependees.intersection(component).cloned().collect())
                .unwrap_or_default();

            let record = Arc::new(ClosureRecord::with_marker(
                member.clone(),
                marker,
                analyzed.violations,
                Ok(outside.remove(member).unwrap_or_default()),
                cyclic_dependees,
            ));
            self.closed.insert(member.clone(), record.clone());
            closed_now.push(record);
        }

        let mut ready = VecDeque::new();
        for member in component {
            self.release_waiters(member, &mut ready)?;
        }
        self.cascade(ready, closed_now)
    }
}
