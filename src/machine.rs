//! This module defines the step engine: a pure transition function from one `MachineState`
//! to the next. It owns no timers and no history; the session decides when to call it.

use tracing::{debug, info};

use crate::types::{MachineConfig, MachineState, SimulatorError, ValidatedRule};
use crate::validator::lookup;

/// Executes a single transition.
///
/// The halt state is checked before any rule lookup, so rules keyed on it never fire.
///
/// # Returns
///
/// * `state` unchanged if it is already halted.
/// * A normally halted state if the current state is the halt state, or if the applied rule
///   moves into it.
/// * An error-halted state (with `error` set) if no valid rule matches.
/// * Otherwise the state after writing, moving and switching control-state.
pub fn step(
    mut state: MachineState,
    rules: &[ValidatedRule],
    config: &MachineConfig,
) -> MachineState {
    if state.is_halted {
        return state;
    }

    if state.current_state == config.halt_state {
        info!(step = state.step_count, "machine halted");
        state.is_halted = true;
        state.last_used_rule_id = None;
        state.error = None;
        return state;
    }

    let symbol = state.symbol();

    let Some(rule) = lookup(rules, &state.current_state, symbol) else {
        let error = SimulatorError::UndefinedTransition(state.current_state.clone(), symbol);
        info!(step = state.step_count, %error, "machine halted with error");
        state.is_halted = true;
        state.last_used_rule_id = None;
        state.error = Some(error.to_string());
        return state;
    };

    debug!(
        step = state.step_count,
        state = %state.current_state,
        symbol = %symbol,
        head = state.head_position,
        rule = %rule.id,
        "applying rule"
    );

    state.tape.write(state.head_position, rule.write);
    state.head_position = state.tape.shift(state.head_position, rule.direction);
    state.current_state = rule.new_state.clone();
    state.is_halted = state.current_state == config.halt_state;
    state.step_count += 1;
    state.last_used_rule_id = Some(rule.id);
    state.error = None;

    if state.is_halted {
        info!(step = state.step_count, "machine halted");
    }

    state
}

/// Steps `state` until it halts or `max_steps` transitions have been attempted.
pub fn run(
    mut state: MachineState,
    rules: &[ValidatedRule],
    config: &MachineConfig,
    max_steps: usize,
) -> MachineState {
    for _ in 0..max_steps {
        if state.is_halted {
            break;
        }
        state = step(state, rules, config);
    }

    state
}
