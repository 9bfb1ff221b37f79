//! Payloads that travel through the stage channels.

use crate::coordinates::{ArtifactCoordinates, ProjectCoordinates};
use crate::core::errors::{DepwallError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Anything that names the artifact it belongs to
pub trait IdentifiesArtifact {
    fn coordinates(&self) -> &ArtifactCoordinates;
}

/// Anything that names the project it belongs to
pub trait IdentifiesProject {
    fn coordinates(&self) -> &ProjectCoordinates;
}

/// Why a stage failed. Serialisable so it can be persisted and replayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageFailure {
    pub message: String,
}

impl StageFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Keeps the whole context chain of the error
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self::new(format!("{:#}", error))
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&DepwallError> for StageFailure {
    fn from(error: &DepwallError) -> Self {
        Self::new(error.to_string())
    }
}

/// A type that depends on one or more forbidden internal types
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "UncheckedViolation")]
pub struct Violation {
    pub dependent: String,
    pub internal_dependencies: BTreeSet<String>,
}

/// Deserialized form of a [`Violation`] before `Violation::new` checked it
#[derive(Deserialize)]
struct UncheckedViolation {
    dependent: String,
    internal_dependencies: BTreeSet<String>,
}

impl TryFrom<UncheckedViolation> for Violation {
    type Error = DepwallError;

    fn try_from(unchecked: UncheckedViolation) -> Result<Self> {
        Violation::new(unchecked.dependent, unchecked.internal_dependencies)
    }
}

impl Violation {
    /// Fails if `internal_dependencies` is empty; such a type is not a violation.
    pub fn new<I, S>(dependent: impl Into<String>, internal_dependencies: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dependent = dependent.into();
        let internal_dependencies: BTreeSet<String> =
            internal_dependencies.into_iter().map(Into::into).collect();
        if internal_dependencies.is_empty() {
            return Err(DepwallError::invalid(format!(
                "violation by {} must contain at least one internal dependency",
                dependent
            )));
        }
        Ok(Self {
            dependent,
            internal_dependencies,
        })
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let internals: Vec<&str> = self.internal_dependencies.iter().map(String::as_str).collect();
        write!(f, "{} -> [{}]", self.dependent, internals.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedProject {
    pub project: ProjectCoordinates,
    pub versions: BTreeSet<ArtifactCoordinates>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedProject {
    pub project: ProjectCoordinates,
    pub failure: StageFailure,
}

/// The content handle produced by a download: where the binary landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedArtifact {
    pub artifact: ArtifactCoordinates,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedArtifact {
    pub artifact: ArtifactCoordinates,
    pub violations: BTreeSet<Violation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    pub artifact: ArtifactCoordinates,
    pub dependees: BTreeSet<ArtifactCoordinates>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedArtifact {
    pub artifact: ArtifactCoordinates,
    pub failure: StageFailure,
}

impl FailedArtifact {
    pub fn new(artifact: ArtifactCoordinates, failure: StageFailure) -> Self {
        Self { artifact, failure }
    }
}

macro_rules! identifies_artifact {
    ($($ty:ty),*) => {
        $(impl IdentifiesArtifact for $ty {
            fn coordinates(&self) -> &ArtifactCoordinates {
                &self.artifact
            }
        })*
    };
}

identifies_artifact!(
    DownloadedArtifact,
    AnalyzedArtifact,
    ResolvedArtifact,
    FailedArtifact
);

impl IdentifiesArtifact for ArtifactCoordinates {
    fn coordinates(&self) -> &ArtifactCoordinates {
        self
    }
}

impl IdentifiesProject for ResolvedProject {
    fn coordinates(&self) -> &ProjectCoordinates {
        &self.project
    }
}

impl IdentifiesProject for FailedProject {
    fn coordinates(&self) -> &ProjectCoordinates {
        &self.project
    }
}

impl IdentifiesProject for ProjectCoordinates {
    fn coordinates(&self) -> &ProjectCoordinates {
        self
    }
}
