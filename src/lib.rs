//! This crate provides the core logic for a single-tape Turing Machine simulator.
//! It includes the growable tape, rule validation, the pure step engine, the step history,
//! a cooperative run scheduler and the session that ties them together, plus a loader for
//! `.tur` program files and a set of built-in programs.

pub mod history;
pub mod loader;
pub mod machine;
pub mod parser;
pub mod programs;
pub mod scheduler;
pub mod session;
pub mod tape;
pub mod types;
pub mod validator;

/// Re-exports the `History` log.
pub use history::History;
/// Re-exports the `ProgramLoader` struct from the loader module.
pub use loader::ProgramLoader;
/// Re-exports the `parse` function from the parser module.
pub use parser::parse;
/// Re-exports `ProgramInfo`, `ProgramManager`, and `PROGRAMS` from the programs module.
pub use programs::{ProgramInfo, ProgramManager, PROGRAMS};
/// Re-exports the `Scheduler`.
pub use scheduler::Scheduler;
/// Re-exports the `Session` and its `Snapshot`.
pub use session::{Session, Snapshot};
/// Re-exports the `Tape` store.
pub use tape::Tape;
/// Re-exports various types related to machine definition and execution from the types module.
pub use types::{
    Direction, HistoryEntry, MachineConfig, MachineState, Program, Rule, RuleId,
    RuleIdGenerator, SimulatorError, Symbol, ValidatedRule, MAX_PROGRAM_SIZE,
};
/// Re-exports the validation entry points.
pub use validator::{analyze, lookup, validate, AnalysisWarning, Validation};
