use super::marker::InternalDependencies;
use crate::artifact::{IdentifiesArtifact, StageFailure, Violation};
use crate::coordinates::ArtifactCoordinates;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Outcome of the analysis stage as kept on a record
pub type ViolationsOutcome = Result<BTreeSet<Violation>, StageFailure>;

/// Outcome of dependee resolution as kept on a record
pub type DependeesOutcome = Result<Vec<Arc<ClosureRecord>>, StageFailure>;

/// Immutable snapshot of a fully processed artifact and, through its dependee records, of
/// everything it transitively depends on.
///
/// Built exactly once per artifact. Dependents hold `Arc`s to it, so a recomputation must build a
/// new record instead of changing this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureRecord {
    coordinates: ArtifactCoordinates,
    marker: InternalDependencies,
    violations: ViolationsOutcome,
    dependees: DependeesOutcome,
    cyclic_dependees: BTreeSet<ArtifactCoordinates>,
}

impl ClosureRecord {
    /// Derives the transitive marker from the analysis outcome and the dependees' markers
    pub fn new(
        coordinates: ArtifactCoordinates,
        violations: ViolationsOutcome,
        dependees: DependeesOutcome,
    ) -> Self {
        let own = InternalDependencies::from_analysis(violations.as_ref());
        let marker = match &dependees {
            Ok(records) => own.combine(InternalDependencies::reduce(
                records.iter().map(|record| record.marker),
            )),
            Err(_) => own.with_unresolved_dependees(),
        };
        Self {
            coordinates,
            marker,
            violations,
            dependees,
            cyclic_dependees: BTreeSet::new(),
        }
    }

    /// A record whose marker was already decided elsewhere, e.g. for a member of a dependency
    /// cycle or when restoring from persistence
    pub fn with_marker(
        coordinates: ArtifactCoordinates,
        marker: InternalDependencies,
        violations: ViolationsOutcome,
        dependees: DependeesOutcome,
        cyclic_dependees: BTreeSet<ArtifactCoordinates>,
    ) -> Self {
        Self {
            coordinates,
            marker,
            violations,
            dependees,
            cyclic_dependees,
        }
    }

    pub fn marker(&self) -> InternalDependencies {
        self.marker
    }

    pub fn violations(&self) -> Result<&BTreeSet<Violation>, &StageFailure> {
        self.violations.as_ref()
    }

    pub fn dependees(&self) -> Result<&[Arc<ClosureRecord>], &StageFailure> {
        self.dependees.as_deref()
    }

    /// Dependees on the same cycle as this artifact; they have no record reference here
    pub fn cyclic_dependees(&self) -> &BTreeSet<ArtifactCoordinates> {
        &self.cyclic_dependees
    }

    /// Coordinates of every direct dependee, acyclic and cyclic, or `None` if resolution failed
    pub fn dependee_coordinates(&self) -> Option<BTreeSet<ArtifactCoordinates>> {
        let records = self.dependees.as_ref().ok()?;
        Some(
            records
                .iter()
                .map(|record| record.coordinates.clone())
                .chain(self.cyclic_dependees.iter().cloned())
                .collect(),
        )
    }

    pub fn to_long_string(&self) -> String {
        self.to_long_string_with_indent("\t")
    }

    pub fn to_long_string_with_indent(&self, indent: &str) -> String {
        format!(
            "{indent}{coordinates}\n{indent}{indent}marker: {marker}\n{indent}{indent}violations: {violations}\n{indent}{indent}dependees: {dependees}",
            indent = indent,
            coordinates = self.coordinates,
            marker = self.marker,
            violations = self.violations_string(),
            dependees = self.dependees_string(),
        )
    }

    fn violations_string(&self) -> String {
        match &self.violations {
            Err(failure) => failure.message.clone(),
            Ok(violations) if violations.is_empty() => "none".to_string(),
            Ok(violations) => violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn dependees_string(&self) -> String {
        match self.dependee_coordinates() {
            None => self
                .dependees
                .as_ref()
                .err()
                .map(|failure| failure.message.clone())
                .unwrap_or_default(),
            Some(coordinates) if coordinates.is_empty() => "none".to_string(),
            Some(coordinates) => coordinates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl IdentifiesArtifact for ClosureRecord {
    fn coordinates(&self) -> &ArtifactCoordinates {
        &self.coordinates
    }
}

impl fmt::Display for ClosureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (completed, {})", self.coordinates, self.marker)
    }
}
