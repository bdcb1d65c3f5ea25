//! This module defines the core data structures and types used throughout the Turing Machine
//! simulator, including rules, machine state, history entries, configuration and error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::parser::Rule as GrammarRule;
use crate::tape::Tape;

/// The default blank symbol used on the Turing Machine tape.
pub const DEFAULT_BLANK_SYMBOL: char = ' ';
/// A special input symbol used in program definitions to represent the blank symbol.
pub const INPUT_BLANK_SYMBOL: char = '_';
/// The control-state a freshly reset machine starts in.
pub const DEFAULT_INITIAL_STATE: &str = "q0";
/// The control-state label that halts the machine.
pub const DEFAULT_HALT_STATE: &str = "halt";
/// Default interval between two scheduled steps, in milliseconds.
pub const DEFAULT_SPEED_MS: u64 = 1500;
/// Number of blank cells added on a side of the tape at initialization and on every growth.
pub const TAPE_PADDING: usize = 20;
/// Distance from either tape edge at which the tape grows.
pub const TAPE_SAFE_ZONE: usize = 10;
/// The maximum allowed size for a Turing Machine program in bytes.
pub const MAX_PROGRAM_SIZE: usize = 65536; // 64KB
/// The maximum number of steps the blocking driver executes before giving up.
pub const MAX_EXECUTION_STEPS: usize = 10000;

/// A single tape cell value.
pub type Symbol = char;

/// Stable identity of a rule. Assigned by the host when a rule is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out monotonically increasing rule ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleIdGenerator {
    next: u64,
    exhausted: bool,
}

impl RuleIdGenerator {
    /// Creates a generator whose first id is `#1`.
    pub fn new() -> Self {
        Self {
            next: 1,
            exhausted: false,
        }
    }

    /// Creates a generator that never hands out an id already used by `rules`.
    pub fn after(rules: &[Rule]) -> Self {
        let mut ids = Self::new();
        ids.skip_past(rules);
        ids
    }

    /// Makes sure the next id is greater than every id in `rules`.
    ///
    /// Once `u64::MAX` is in use there is no greater id and the generator is exhausted.
    pub fn skip_past(&mut self, rules: &[Rule]) {
        if let Some(max) = rules.iter().map(|r| r.id.0).max() {
            match max.checked_add(1) {
                Some(next) => self.next = self.next.max(next),
                None => self.exhausted = true,
            }
        }
    }

    pub fn next_id(&mut self) -> Result<RuleId, SimulatorError> {
        if self.exhausted {
            return Err(SimulatorError::RuleIdsExhausted);
        }
        let id = self.next.max(1);
        match id.checked_add(1) {
            Some(next) => self.next = next,
            None => self.exhausted = true,
        }
        Ok(RuleId(id))
    }
}

/// Represents the possible directions the tape head can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Move the head one position to the left.
    Left,
    /// Move the head one position to the right.
    Right,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Left => write!(f, "L"),
            Direction::Right => write!(f, "R"),
        }
    }
}

/// A single transition rule: `(current_state, read) -> (new_state, write, direction)`.
///
/// Identity is by `id`; every other field may be edited by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub current_state: String,
    pub read: Symbol,
    pub new_state: String,
    pub write: Symbol,
    pub direction: Direction,
}

impl Rule {
    pub fn new(
        id: RuleId,
        current_state: impl Into<String>,
        read: Symbol,
        new_state: impl Into<String>,
        write: Symbol,
        direction: Direction,
    ) -> Self {
        Self {
            id,
            current_state: current_state.into(),
            read,
            new_state: new_state.into(),
            write,
            direction,
        }
    }

    /// The lookup key of this rule.
    pub fn key(&self) -> (&str, Symbol) {
        (&self.current_state, self.read)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, '{}') -> ({}, '{}', {})",
            self.current_state, self.read, self.new_state, self.write, self.direction
        )
    }
}

/// A rule annotated by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedRule {
    #[serde(flatten)]
    pub rule: Rule,
    /// Human-readable conflict diagnostic. `None` means the rule is valid.
    pub conflict: Option<String>,
}

impl ValidatedRule {
    pub fn is_valid(&self) -> bool {
        self.conflict.is_none()
    }
}

/// One observed step, captured before the transition was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: usize,
    pub state: String,
    pub read: Symbol,
    pub position: usize,
    /// `None` records a halting step that used no rule.
    pub rule_id: Option<RuleId>,
}

/// The complete, serializable machine configuration at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub tape: Tape,
    /// Always a valid index into `tape`.
    pub head_position: usize,
    pub current_state: String,
    /// Terminal until the next reset.
    pub is_halted: bool,
    pub step_count: usize,
    pub last_used_rule_id: Option<RuleId>,
    /// Set when the machine halted because no rule matched.
    pub error: Option<String>,
}

impl MachineState {
    /// Builds the state of a freshly reset machine.
    pub fn new(input: &str, config: &MachineConfig) -> Self {
        let tape = Tape::new(input, config.blank);
        Self {
            head_position: tape.origin(),
            tape,
            current_state: config.initial_state.clone(),
            is_halted: false,
            step_count: 0,
            last_used_rule_id: None,
            error: None,
        }
    }

    /// The symbol under the head.
    pub fn symbol(&self) -> Symbol {
        self.tape.read(self.head_position)
    }
}

/// Per-machine configuration supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// The symbol used for padding and trimming.
    pub blank: Symbol,
    /// The state a reset machine starts in.
    pub initial_state: String,
    /// Reaching this state halts the machine regardless of the rule table.
    pub halt_state: String,
    /// Milliseconds between two scheduled steps.
    pub speed_ms: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            blank: DEFAULT_BLANK_SYMBOL,
            initial_state: DEFAULT_INITIAL_STATE.to_string(),
            halt_state: DEFAULT_HALT_STATE.to_string(),
            speed_ms: DEFAULT_SPEED_MS,
        }
    }
}

/// A loaded program: a rule table, the input it is meant to run on, and the configuration
/// headers it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub description: String,
    /// Initial tape contents, with the blank alias already rewritten.
    pub input: String,
    pub blank: Option<Symbol>,
    pub initial_state: Option<String>,
    pub halt_state: Option<String>,
    pub rules: Vec<Rule>,
}

impl Program {
    /// The default configuration with this program's overrides applied.
    pub fn config(&self) -> MachineConfig {
        self.apply(MachineConfig::default())
    }

    /// Applies this program's overrides on top of `base`.
    pub fn apply(&self, mut base: MachineConfig) -> MachineConfig {
        if let Some(blank) = self.blank {
            base.blank = blank;
        }
        if let Some(state) = &self.initial_state {
            base.initial_state = state.clone();
        }
        if let Some(state) = &self.halt_state {
            base.halt_state = state.clone();
        }
        base
    }

    /// Number of distinct control-states mentioned by the rules.
    pub fn state_count(&self) -> usize {
        self.rules
            .iter()
            .flat_map(|r| [r.current_state.as_str(), r.new_state.as_str()])
            .collect::<std::collections::HashSet<_>>()
            .len()
    }
}

/// Represents various errors that can occur during simulator operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulatorError {
    /// No rule matches the current state and the symbol under the head.
    #[error("no rule defined for state '{0}' and symbol '{1}'")]
    UndefinedTransition(String, Symbol),
    /// Two or more rules share the same `(state, symbol)` key.
    #[error("conflicting rules for state '{0}' and symbol '{1}'")]
    RuleConflict(String, Symbol),
    /// The operation is not allowed while the machine is running continuously.
    #[error("machine is running")]
    Running,
    /// The operation is not allowed once the machine has halted.
    #[error("machine is halted")]
    Halted,
    /// The rule table has conflicts and cannot be executed.
    #[error("rule table has conflicts")]
    InvalidRules,
    /// No rule with the given id exists.
    #[error("unknown rule {0}")]
    UnknownRule(RuleId),
    /// Every rule id up to `u64::MAX` has been handed out.
    #[error("no rule ids left")]
    RuleIdsExhausted,
    /// Indicates an error during the parsing of a program definition.
    #[error("Program parsing error: {0}")]
    ParseError(#[from] Box<pest::error::Error<GrammarRule>>),
    /// Indicates a program that parsed but is not usable.
    #[error("Program validation error: {0}")]
    ValidationError(String),
    /// Indicates an error related to file system operations.
    #[error("File error: {0}")]
    FileError(String),
}
