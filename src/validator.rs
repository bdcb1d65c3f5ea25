//! This module checks rule tables before execution. `validate` detects conflicting rules,
//! which block execution, while `analyze` reports non-blocking problems such as dead rules
//! and unreachable states.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::types::{MachineConfig, Rule, SimulatorError, Symbol, ValidatedRule};

/// The outcome of validating a rule table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// Every rule, in the order supplied, annotated with its conflict diagnostic.
    pub rules: Vec<ValidatedRule>,
    /// `true` if at least one key is shared by two or more rules.
    pub has_errors: bool,
}

impl Validation {
    /// Returns the unique valid rule for `(state, symbol)`, if any.
    pub fn lookup(&self, state: &str, symbol: Symbol) -> Option<&Rule> {
        lookup(&self.rules, state, symbol)
    }

    /// Iterates over the rules that were marked invalid.
    pub fn conflicts(&self) -> impl Iterator<Item = &ValidatedRule> {
        self.rules.iter().filter(|r| !r.is_valid())
    }
}

/// Groups `rules` by `(current_state, read)` and marks every member of a group with more than
/// one rule as invalid.
///
/// This is a total function: it never fails and has no side effects.
pub fn validate(rules: &[Rule]) -> Validation {
    let mut counts: HashMap<(&str, Symbol), usize> = HashMap::new();
    for rule in rules {
        *counts.entry(rule.key()).or_default() += 1;
    }

    let rules: Vec<ValidatedRule> = rules
        .iter()
        .map(|rule| {
            let conflict = (counts[&rule.key()] > 1).then(|| {
                SimulatorError::RuleConflict(rule.current_state.clone(), rule.read).to_string()
            });
            ValidatedRule {
                rule: rule.clone(),
                conflict,
            }
        })
        .collect();

    let has_errors = rules.iter().any(|r| !r.is_valid());

    Validation { rules, has_errors }
}

/// Finds the valid rule matching `(state, symbol)`.
///
/// Invalid rules are skipped, so a conflicting key behaves like a missing one.
pub fn lookup<'a>(rules: &'a [ValidatedRule], state: &str, symbol: Symbol) -> Option<&'a Rule> {
    rules
        .iter()
        .filter(|r| r.is_valid())
        .map(|r| &r.rule)
        .find(|r| r.current_state == state && r.read == symbol)
}

/// Non-blocking findings about a rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisWarning {
    /// Rules keyed on the halt state. Halting happens before lookup, so they never fire.
    DeadHaltRules(Vec<String>),
    /// States that appear in the table but cannot be reached from the initial state.
    UnreachableStates(Vec<String>),
}

impl std::fmt::Display for AnalysisWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisWarning::DeadHaltRules(ids) => {
                write!(f, "Rules keyed on the halt state never fire: {}", ids.join(", "))
            }
            AnalysisWarning::UnreachableStates(states) => {
                write!(f, "Unreachable states detected: {}", states.join(", "))
            }
        }
    }
}

/// Analyzes `rules` for problems that do not block execution.
pub fn analyze(rules: &[Rule], config: &MachineConfig) -> Vec<AnalysisWarning> {
    [check_dead_halt_rules, check_unreachable_states]
        .iter()
        .filter_map(|check| check(rules, config))
        .collect()
}

fn check_dead_halt_rules(rules: &[Rule], config: &MachineConfig) -> Option<AnalysisWarning> {
    let dead: Vec<String> = rules
        .iter()
        .filter(|r| r.current_state == config.halt_state)
        .map(|r| r.id.to_string())
        .collect();

    (!dead.is_empty()).then_some(AnalysisWarning::DeadHaltRules(dead))
}

/// Walks the transition graph from the initial state. The halt state is never expanded.
fn check_unreachable_states(rules: &[Rule], config: &MachineConfig) -> Option<AnalysisWarning> {
    let mut reachable = HashSet::new();
    let mut to_visit = vec![config.initial_state.as_str()];

    while let Some(state) = to_visit.pop() {
        if !reachable.insert(state) || state == config.halt_state {
            continue;
        }
        to_visit.extend(
            rules
                .iter()
                .filter(|r| r.current_state == state)
                .map(|r| r.new_state.as_str()),
        );
    }

    let mut unreachable: Vec<String> = rules
        .iter()
        .flat_map(|r| [r.current_state.as_str(), r.new_state.as_str()])
        .filter(|s| !reachable.contains(s) && *s != config.halt_state)
        .map(String::from)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    unreachable.sort();

    (!unreachable.is_empty()).then_some(AnalysisWarning::UnreachableStates(unreachable))
}
