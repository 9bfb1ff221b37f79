//! Identities of projects and artifacts.
//!
//! Coordinates are plain values: cheap to clone, ordered, hashable and serialisable,
//! so they can key every map in the graph and the closure engine.

use crate::core::errors::{DepwallError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A package identity without a version (`group:artifact`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectCoordinates {
    pub group_id: String,
    pub artifact_id: String,
}

impl ProjectCoordinates {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
        }
    }

    /// The artifact of this project with the given version
    pub fn with_version(&self, version: impl Into<String>) -> ArtifactCoordinates {
        ArtifactCoordinates::new(self.group_id.clone(), self.artifact_id.clone(), version)
    }

    pub fn to_artifacts_with_versions<I, V>(&self, versions: I) -> Vec<ArtifactCoordinates>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        versions.into_iter().map(|v| self.with_version(v)).collect()
    }
}

impl fmt::Display for ProjectCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)
    }
}

impl FromStr for ProjectCoordinates {
    type Err = DepwallError;

    fn from_str(s: &str) -> Result<Self> {
        match split_coordinates(s)?.as_slice() {
            [group, artifact] => Ok(Self::new(*group, *artifact)),
            _ => Err(DepwallError::invalid(format!(
                "project coordinates must look like 'group:artifact', got '{}'",
                s
            ))),
        }
    }
}

/// One specific version of a project; the unit of analysis
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactCoordinates {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl ArtifactCoordinates {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }

    pub fn project(&self) -> ProjectCoordinates {
        ProjectCoordinates::new(self.group_id.clone(), self.artifact_id.clone())
    }
}

impl fmt::Display for ArtifactCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

impl FromStr for ArtifactCoordinates {
    type Err = DepwallError;

    fn from_str(s: &str) -> Result<Self> {
        match split_coordinates(s)?.as_slice() {
            [group, artifact, version] => Ok(Self::new(*group, *artifact, *version)),
            _ => Err(DepwallError::invalid(format!(
                "artifact coordinates must look like 'group:artifact:version', got '{}'",
                s
            ))),
        }
    }
}

fn split_coordinates(s: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = s.trim().split(':').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(DepwallError::invalid(format!(
            "coordinates contain an empty segment: '{}'",
            s
        )));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let artifact: ArtifactCoordinates = "org.example:lib:1.2.3".parse().unwrap();
        assert_eq!(artifact, ArtifactCoordinates::new("org.example", "lib", "1.2.3"));
        assert_eq!(artifact.to_string(), "org.example:lib:1.2.3");
        assert_eq!(artifact.project().to_string(), "org.example:lib");

        let project: ProjectCoordinates = " org.example : lib ".parse().unwrap();
        assert_eq!(project, ProjectCoordinates::new("org.example", "lib"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("org.example".parse::<ProjectCoordinates>().is_err());
        assert!("org.example:lib:1.0".parse::<ProjectCoordinates>().is_err());
        assert!("org.example::1.0".parse::<ArtifactCoordinates>().is_err());
        assert!("org.example:lib".parse::<ArtifactCoordinates>().is_err());
    }

    #[test]
    fn test_versions_expand_to_artifacts() {
        let project = ProjectCoordinates::new("g", "a");
        let artifacts = project.to_artifacts_with_versions(["1.0", "2.0"]);
        assert_eq!(
            artifacts,
            vec![
                ArtifactCoordinates::new("g", "a", "1.0"),
                ArtifactCoordinates::new("g", "a", "2.0"),
            ]
        );
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut artifacts = vec![
            ArtifactCoordinates::new("b", "x", "1"),
            ArtifactCoordinates::new("a", "y", "2"),
            ArtifactCoordinates::new("a", "y", "1"),
        ];
        artifacts.sort();
        assert_eq!(artifacts[0].to_string(), "a:y:1");
        assert_eq!(artifacts[2].to_string(), "b:x:1");
    }
}
