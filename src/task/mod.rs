// Per-stage task lifecycle

pub mod state;

pub use state::{Task, TaskState, TaskStateKind};
