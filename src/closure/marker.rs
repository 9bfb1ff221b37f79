use crate::artifact::{StageFailure, Violation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Summarised internal-dependency classification of an artifact.
///
/// `None < Indirect < Direct` form the lattice for analyzed artifacts; `Unknown` marks artifacts
/// whose analysis or dependee resolution failed somewhere along the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InternalDependencies {
    Unknown,
    None,
    Indirect,
    Direct,
}

impl InternalDependencies {
    pub const ALL: [InternalDependencies; 4] = [
        InternalDependencies::Unknown,
        InternalDependencies::None,
        InternalDependencies::Indirect,
        InternalDependencies::Direct,
    ];

    /// The artifact's own marker, ignoring its dependees
    pub fn from_analysis(violations: Result<&BTreeSet<Violation>, &StageFailure>) -> Self {
        match violations {
            Err(_) => InternalDependencies::Unknown,
            Ok(violations) if violations.is_empty() => InternalDependencies::None,
            Ok(_) => InternalDependencies::Direct,
        }
    }

    /// Rank used when reducing several dependee markers: `Direct > Indirect > Unknown > None`
    fn priority(self) -> u8 {
        match self {
            InternalDependencies::None => 0,
            InternalDependencies::Unknown => 1,
            InternalDependencies::Indirect => 2,
            InternalDependencies::Direct => 3,
        }
    }

    /// Reduces dependee markers to the most severe one; no dependees reduce to `None`
    pub fn reduce<I>(markers: I) -> Self
    where
        I: IntoIterator<Item = InternalDependencies>,
    {
        markers
            .into_iter()
            .fold(InternalDependencies::None, |acc, marker| {
                if marker.priority() > acc.priority() {
                    marker
                } else {
                    acc
                }
            })
    }

    /// Combines an artifact's own marker with the reduced marker of its dependees
    pub fn combine(self, dependees: InternalDependencies) -> Self {
        use InternalDependencies::*;
        match (self, dependees) {
            (Direct, _) => Direct,
            // Only arises when a transitive marker is fed back in as an own marker (cycles)
            (Indirect, _) => Indirect,
            (None | Unknown, Direct | Indirect) => Indirect,
            (None, None) => None,
            (None | Unknown, Unknown) | (Unknown, None) => Unknown,
        }
    }

    /// The transitive marker when dependee resolution failed: only a direct finding survives
    pub fn with_unresolved_dependees(self) -> Self {
        match self {
            InternalDependencies::Direct => InternalDependencies::Direct,
            _ => InternalDependencies::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InternalDependencies::Unknown => "UNKNOWN",
            InternalDependencies::None => "NONE",
            InternalDependencies::Indirect => "INDIRECT",
            InternalDependencies::Direct => "DIRECT",
        }
    }
}

impl fmt::Display for InternalDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::InternalDependencies::*;
    use super::*;

    #[test]
    fn test_combine_table() {
        let expected = [
            // (own, dependees, combined)
            (Unknown, Unknown, Unknown),
            (Unknown, None, Unknown),
            (Unknown, Indirect, Indirect),
            (Unknown, Direct, Indirect),
            (None, Unknown, Unknown),
            (None, None, None),
            (None, Indirect, Indirect),
            (None, Direct, Indirect),
            (Direct, Unknown, Direct),
            (Direct, None, Direct),
            (Direct, Indirect, Direct),
            (Direct, Direct, Direct),
        ];
        for (own, dependees, combined) in expected {
            assert_eq!(
                own.combine(dependees),
                combined,
                "combine({}, {})",
                own,
                dependees
            );
        }
    }

    #[test]
    fn test_direct_dominates_everything() {
        for other in InternalDependencies::ALL {
            assert_eq!(Direct.combine(other), Direct);
        }
    }

    #[test]
    fn test_reduce_priority() {
        assert_eq!(InternalDependencies::reduce([]), None);
        assert_eq!(InternalDependencies::reduce([None, Unknown]), Unknown);
        assert_eq!(InternalDependencies::reduce([Unknown, Indirect, None]), Indirect);
        assert_eq!(InternalDependencies::reduce([Indirect, Direct, Unknown]), Direct);
    }

    #[test]
    fn test_own_marker_from_analysis() {
        let empty = BTreeSet::new();
        assert_eq!(InternalDependencies::from_analysis(Ok(&empty)), None);

        let violations: BTreeSet<Violation> = [Violation::new("a.B", ["sun.misc.Unsafe"]).unwrap()]
            .into_iter()
            .collect();
        assert_eq!(InternalDependencies::from_analysis(Ok(&violations)), Direct);

        let failure = StageFailure::new("jdeps crashed");
        assert_eq!(InternalDependencies::from_analysis(Err(&failure)), Unknown);
    }

    #[test]
    fn test_unresolved_dependees() {
        assert_eq!(Direct.with_unresolved_dependees(), Direct);
        assert_eq!(None.with_unresolved_dependees(), Unknown);
        assert_eq!(Unknown.with_unresolved_dependees(), Unknown);
    }
}
