//! Transitive "fully analyzed" classification of artifacts.
//!
//! [`ClosureEngine`] collects the raw per-artifact outcome (violations and direct dependees) and
//! finalizes an artifact into an immutable [`ClosureRecord`] as soon as all of its dependees are
//! finalized, cascading upward through the dependents waiting on it.

mod cycles;
pub mod engine;
pub mod marker;
pub mod record;

pub use engine::{ClosureEngine, ClosureStats, ResolutionOutcome};
pub use marker::InternalDependencies;
pub use record::{ClosureRecord, DependeesOutcome, ViolationsOutcome};
