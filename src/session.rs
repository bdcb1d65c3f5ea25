//! This module defines the `Session`, which ties the tape, the validated rule table, the step
//! engine, the history log and the scheduler together behind the API a host embeds.
//!
//! A session is single-threaded. Every operation runs to completion before returning, so a
//! host never observes a partially applied step.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::history::History;
use crate::machine;
use crate::scheduler::Scheduler;
use crate::types::{
    Direction, HistoryEntry, MachineConfig, MachineState, Program, Rule, RuleId, RuleIdGenerator,
    SimulatorError, Symbol, ValidatedRule,
};
use crate::validator::{analyze, validate, AnalysisWarning, Validation};

type StepHook = Box<dyn FnMut()>;

/// A read-only copy of everything a host needs to render the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tape: Vec<Symbol>,
    pub head_position: usize,
    pub current_state: String,
    pub is_halted: bool,
    pub step_count: usize,
    pub last_used_rule_id: Option<RuleId>,
    pub error: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub validated_rules: Vec<ValidatedRule>,
    pub has_rule_errors: bool,
    pub is_running: bool,
    pub speed_ms: u64,
}

impl Snapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// A simulation session: one machine, its rule table, its history and its run loop.
pub struct Session {
    config: MachineConfig,
    input: String,
    rules: Vec<Rule>,
    validation: Validation,
    state: MachineState,
    history: History,
    scheduler: Scheduler,
    rule_ids: RuleIdGenerator,
    on_step: Option<StepHook>,
}

impl Session {
    /// Creates a session with an empty rule table and an empty input.
    pub fn new(config: MachineConfig) -> Self {
        Self {
            state: MachineState::new("", &config),
            scheduler: Scheduler::new(config.speed_ms),
            config,
            input: String::new(),
            rules: Vec::new(),
            validation: Validation::default(),
            history: History::new(),
            rule_ids: RuleIdGenerator::new(),
            on_step: None,
        }
    }

    /// Creates a session for `program`, reset to the program's input and rules.
    ///
    /// `base` supplies everything the program does not override, such as the speed.
    pub fn from_program(program: &Program, base: MachineConfig) -> Self {
        let mut session = Self::new(program.apply(base));
        session.reset(&program.input, program.rules.clone());
        session
    }

    /// Rebuilds the machine from `input` and installs `rules`.
    ///
    /// Stops a running scheduler, clears the history and re-validates the rules.
    pub fn reset(&mut self, input: &str, rules: Vec<Rule>) {
        self.scheduler.stop();
        self.input = input.to_string();
        self.state = MachineState::new(input, &self.config);
        self.history.clear();
        self.set_rules(rules);
        debug!(input, rules = self.rules.len(), "session reset");
    }

    /// Resets with the last input and the current rule table.
    pub fn restart(&mut self) {
        let input = std::mem::take(&mut self.input);
        let rules = std::mem::take(&mut self.rules);
        self.reset(&input, rules);
    }

    /// Performs exactly one step.
    ///
    /// # Returns
    ///
    /// * `Err(SimulatorError::Running)` while the scheduler is running.
    /// * `Err(SimulatorError::Halted)` once the machine has halted.
    /// * `Err(SimulatorError::InvalidRules)` while the rule table has conflicts.
    ///
    /// The machine is left untouched whenever an error is returned.
    pub fn manual_step(&mut self) -> Result<(), SimulatorError> {
        if self.scheduler.is_running() {
            return Err(SimulatorError::Running);
        }
        self.check_runnable()?;
        self.advance();
        Ok(())
    }

    /// Starts continuous running, one step per configured interval.
    ///
    /// Calling `run` while already running is a no-op.
    pub fn run(&mut self) -> Result<(), SimulatorError> {
        self.run_at(Instant::now())
    }

    /// Same as [`Session::run`] with an explicit start time.
    pub fn run_at(&mut self, now: Instant) -> Result<(), SimulatorError> {
        self.check_runnable()?;
        if self.scheduler.start(now) {
            debug!(speed_ms = self.config.speed_ms, "run started");
        }
        Ok(())
    }

    /// Stops continuous running. Does nothing if not running.
    pub fn pause(&mut self) {
        if self.scheduler.stop() {
            debug!(step = self.state.step_count, "run paused");
        }
    }

    /// Sets the interval between scheduled steps; a running loop uses it from its next tick.
    pub fn set_speed(&mut self, interval_ms: u64) {
        self.config.speed_ms = interval_ms;
        self.scheduler.set_interval(interval_ms);
    }

    /// Drives the scheduler. Performs one step if a tick is due at `now`.
    ///
    /// Returns `true` if a step was taken. The run stops as soon as the machine halts.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.scheduler.poll(now) {
            return false;
        }

        if self.state.is_halted {
            self.scheduler.stop();
            return false;
        }

        self.advance();

        if self.state.is_halted {
            self.scheduler.stop();
        }
        true
    }

    /// Blocks the current thread, sleeping until each tick is due, until the run stops.
    ///
    /// The run is paused after `max_steps` steps. Returns the number of steps taken.
    pub fn drive(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;

        while steps < max_steps {
            let Some(wait) = self.scheduler.time_until_next(Instant::now()) else {
                break;
            };
            if !wait.is_zero() {
                thread::sleep(wait);
            }
            if self.tick(Instant::now()) {
                steps += 1;
            }
        }

        if self.scheduler.is_running() {
            warn!(max_steps, "step limit reached, pausing");
            self.pause();
        }

        steps
    }

    /// Registers a callback invoked after every step that applied a rule.
    ///
    /// The callback receives nothing and cannot influence the step.
    pub fn on_step(&mut self, hook: impl FnMut() + 'static) {
        self.on_step = Some(Box::new(hook));
    }

    pub fn clear_on_step(&mut self) {
        self.on_step = None;
    }

    /// Replaces the rule table and re-validates it.
    pub fn set_rules(&mut self, rules: Vec<Rule>) {
        self.rule_ids.skip_past(&rules);
        self.rules = rules;
        self.revalidate();
    }

    /// Hands out an id that no rule in this session uses.
    pub fn next_rule_id(&mut self) -> Result<RuleId, SimulatorError> {
        self.rule_ids.next_id()
    }

    /// Appends a new rule with a fresh id and returns that id.
    ///
    /// Fails with `RuleIdsExhausted` once an installed rule holds `RuleId(u64::MAX)`.
    pub fn add_rule(
        &mut self,
        current_state: impl Into<String>,
        read: Symbol,
        new_state: impl Into<String>,
        write: Symbol,
        direction: Direction,
    ) -> Result<RuleId, SimulatorError> {
        let id = self.next_rule_id()?;
        self.rules
            .push(Rule::new(id, current_state, read, new_state, write, direction));
        self.revalidate();
        Ok(id)
    }

    /// Replaces the rule with the same id as `rule`.
    pub fn update_rule(&mut self, rule: Rule) -> Result<(), SimulatorError> {
        let slot = self
            .rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or(SimulatorError::UnknownRule(rule.id))?;
        *slot = rule;
        self.revalidate();
        Ok(())
    }

    /// Removes and returns the rule with the given id.
    pub fn remove_rule(&mut self, id: RuleId) -> Result<Rule, SimulatorError> {
        let index = self
            .rules
            .iter()
            .position(|r| r.id == id)
            .ok_or(SimulatorError::UnknownRule(id))?;
        let rule = self.rules.remove(index);
        self.revalidate();
        Ok(rule)
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn validation(&self) -> &Validation {
        &self.validation
    }

    pub fn has_rule_errors(&self) -> bool {
        self.validation.has_errors
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Non-blocking findings about the current rule table.
    pub fn analyze(&self) -> Vec<AnalysisWarning> {
        analyze(&self.rules, &self.config)
    }

    /// The tape with leading and trailing blanks trimmed, available once halted.
    pub fn final_tape(&self) -> Option<String> {
        self.state
            .is_halted
            .then(|| self.state.tape.trimmed().iter().collect())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tape: self.state.tape.cells().to_vec(),
            head_position: self.state.head_position,
            current_state: self.state.current_state.clone(),
            is_halted: self.state.is_halted,
            step_count: self.state.step_count,
            last_used_rule_id: self.state.last_used_rule_id,
            error: self.state.error.clone(),
            history: self.history.entries().to_vec(),
            validated_rules: self.validation.rules.clone(),
            has_rule_errors: self.validation.has_errors,
            is_running: self.scheduler.is_running(),
            speed_ms: self.config.speed_ms,
        }
    }

    fn check_runnable(&self) -> Result<(), SimulatorError> {
        if self.state.is_halted {
            return Err(SimulatorError::Halted);
        }
        if self.validation.has_errors {
            return Err(SimulatorError::InvalidRules);
        }
        Ok(())
    }

    fn revalidate(&mut self) {
        self.validation = validate(&self.rules);

        if self.validation.has_errors && self.scheduler.stop() {
            warn!(
                conflicts = self.validation.conflicts().count(),
                "rule table has conflicts, run stopped"
            );
        }
    }

    /// Applies one step and records it. The history entry captures the machine before the
    /// transition together with the rule the transition used.
    fn advance(&mut self) {
        let before = &self.state;
        let step = before.step_count;
        let state = before.current_state.clone();
        let read = before.symbol();
        let position = before.head_position;

        let next = machine::step(self.state.clone(), &self.validation.rules, &self.config);

        self.history.append(HistoryEntry {
            step,
            state,
            read,
            position,
            rule_id: next.last_used_rule_id,
        });
        self.state = next;

        if self.state.is_halted {
            info!(
                steps = self.state.step_count,
                error = self.state.error.as_deref(),
                "session halted"
            );
        }

        if self.state.last_used_rule_id.is_some() {
            if let Some(hook) = self.on_step.as_mut() {
                hook();
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("rules", &self.rules.len())
            .field("history", &self.history.len())
            .field("running", &self.scheduler.is_running())
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl Program {
    /// Builds a session ready to run this program. Same as [`Session::from_program`].
    pub fn session(&self, base: MachineConfig) -> Session {
        Session::from_program(self, base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TAPE_PADDING;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    const B: char = ' ';

    fn rule(id: u64, state: &str, read: char, next: &str, write: char, dir: Direction) -> Rule {
        Rule::new(RuleId(id), state, read, next, write, dir)
    }

    fn bit_inverter() -> Vec<Rule> {
        use Direction::Right;
        vec![
            rule(1, "q0", '0', "q0", '1', Right),
            rule(2, "q0", '1', "q0", '0', Right),
            rule(3, "q0", B, "halt", B, Right),
        ]
    }

    fn binary_increment() -> Vec<Rule> {
        use Direction::{Left, Right};
        vec![
            rule(1, "q0", '1', "q0", '1', Right),
            rule(2, "q0", '0', "q0", '0', Right),
            rule(3, "q0", B, "q1", B, Left),
            rule(4, "q1", '1', "q1", '0', Left),
            rule(5, "q1", '0', "q2", '1', Left),
            rule(6, "q1", B, "q2", '1', Left),
            rule(7, "q2", '0', "q2", '0', Left),
            rule(8, "q2", '1', "q2", '1', Left),
            rule(9, "q2", B, "halt", B, Right),
        ]
    }

    fn session(input: &str, rules: Vec<Rule>) -> Session {
        let mut session = Session::default();
        session.reset(input, rules);
        session
    }

    fn step_until_halted(session: &mut Session) {
        for _ in 0..1000 {
            if session.manual_step().is_err() {
                break;
            }
        }
    }

    /// Ticks far enough apart that every call is due.
    fn tick_until_stopped(session: &mut Session, start: Instant) -> usize {
        let mut steps = 0;
        for i in 1..1000u32 {
            if !session.is_running() {
                break;
            }
            if session.tick(start + Duration::from_secs(10) * i) {
                steps += 1;
            }
        }
        steps
    }

    #[test]
    fn test_reset_builds_fresh_state() {
        let session = session("101", bit_inverter());
        let state = session.state();

        assert_eq!(state.head_position, TAPE_PADDING);
        assert_eq!(state.current_state, "q0");
        assert_eq!(state.step_count, 0);
        assert!(!state.is_halted);
        assert!(session.history().is_empty());
        assert!(!session.has_rule_errors());
        assert_eq!(session.final_tape(), None);
    }

    #[test]
    fn test_binary_increment_scenario() {
        let mut session = session("1011", binary_increment());
        step_until_halted(&mut session);

        assert!(session.state().is_halted);
        assert_eq!(session.state().error, None);
        assert_eq!(session.final_tape().as_deref(), Some("1100"));
    }

    #[test]
    fn test_bit_inverter_scenario() {
        let mut session = session("01101", bit_inverter());
        step_until_halted(&mut session);

        assert_eq!(session.final_tape().as_deref(), Some("10010"));
    }

    #[test]
    fn test_conflict_blocks_step_and_run() {
        let rules = vec![
            rule(1, "q0", '1', "q1", '1', Direction::Right),
            rule(2, "q0", '1', "q2", '0', Direction::Left),
        ];
        let mut session = session("1", rules);
        let before = session.snapshot();

        assert!(session.has_rule_errors());
        assert!(session.validation().rules.iter().all(|r| !r.is_valid()));
        assert_eq!(session.manual_step(), Err(SimulatorError::InvalidRules));
        assert_eq!(session.run(), Err(SimulatorError::InvalidRules));
        assert!(!session.is_running());
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn test_conflict_recovers_by_rule_edit() {
        let rules = vec![
            rule(1, "q0", '1', "halt", '1', Direction::Right),
            rule(2, "q0", '1', "q2", '0', Direction::Left),
        ];
        let mut session = session("1", rules);
        assert!(session.has_rule_errors());

        let removed = session.remove_rule(RuleId(2)).unwrap();
        assert_eq!(removed.id, RuleId(2));
        assert!(!session.has_rule_errors());
        assert_eq!(session.manual_step(), Ok(()));
        assert!(session.state().is_halted);
    }

    #[test]
    fn test_no_rule_halts_with_error() {
        let rules = vec![rule(1, "q0", '1', "q0", '1', Direction::Right)];
        let mut session = session("10", rules);

        session.manual_step().unwrap();
        session.manual_step().unwrap();

        let state = session.state();
        assert!(state.is_halted);
        assert!(state.error.as_deref().unwrap().contains("'q0'"));
        assert_eq!(session.history().last().unwrap().rule_id, None);
        assert_eq!(session.manual_step(), Err(SimulatorError::Halted));
        assert_eq!(session.run(), Err(SimulatorError::Halted));
    }

    #[test]
    fn test_history_fidelity() {
        let mut session = session("0110", bit_inverter());
        for _ in 0..3 {
            session.manual_step().unwrap();
        }

        let history = session.history();
        assert_eq!(history.len(), 3);
        for (i, entry) in history.iter().enumerate() {
            assert_eq!(entry.step, i);
            assert_eq!(entry.position, TAPE_PADDING + i);
        }
        assert_eq!(history.entries()[0].read, '0');
        assert_eq!(history.entries()[0].rule_id, Some(RuleId(1)));
        assert_eq!(history.entries()[1].read, '1');
        assert_eq!(history.entries()[1].rule_id, Some(RuleId(2)));
    }

    #[test]
    fn test_reset_clears_history_and_stops_run() {
        let mut session = session("0110", bit_inverter());
        session.manual_step().unwrap();
        session.run().unwrap();

        session.reset("1", bit_inverter());

        assert!(session.history().is_empty());
        assert!(!session.is_running());
        assert_eq!(session.state().step_count, 0);
    }

    #[test]
    fn test_restart_reuses_input_and_rules() {
        let mut session = session("01", bit_inverter());
        step_until_halted(&mut session);

        session.restart();

        assert_eq!(session.input(), "01");
        assert_eq!(session.rules().len(), 3);
        assert!(!session.state().is_halted);
        assert_eq!(session.state().symbol(), '0');
    }

    #[test]
    fn test_run_loop_stops_on_halt() {
        let mut session = session("01101", bit_inverter());
        let start = Instant::now();
        session.run_at(start).unwrap();

        assert_eq!(session.manual_step(), Err(SimulatorError::Running));

        let steps = tick_until_stopped(&mut session, start);

        assert_eq!(steps, 6);
        assert!(!session.is_running());
        assert!(session.state().is_halted);
        assert_eq!(session.history().len(), 6);
        assert!(!session.tick(start + Duration::from_secs(100_000)));
    }

    #[test]
    fn test_run_twice_keeps_single_timer() {
        let mut session = session("01101", bit_inverter());
        let start = Instant::now();
        session.run_at(start).unwrap();
        let deadline = session.scheduler().next_tick();

        session.run_at(start + Duration::from_millis(500)).unwrap();

        assert_eq!(session.scheduler().next_tick(), deadline);
    }

    #[test]
    fn test_pause_stops_ticks() {
        let mut session = session("01101", bit_inverter());
        let start = Instant::now();
        session.run_at(start).unwrap();

        assert!(session.tick(start + Duration::from_secs(10)));
        session.pause();
        session.pause();

        assert!(!session.tick(start + Duration::from_secs(20)));
        assert_eq!(session.state().step_count, 1);
        assert_eq!(session.manual_step(), Ok(()));
    }

    #[test]
    fn test_conflicting_edit_stops_run() {
        let mut session = session("01101", bit_inverter());
        let start = Instant::now();
        session.run_at(start).unwrap();

        session
            .add_rule("q0", '0', "q9", '0', Direction::Left)
            .unwrap();

        assert!(session.has_rule_errors());
        assert!(!session.is_running());
        assert!(!session.tick(start + Duration::from_secs(10)));
    }

    #[test]
    fn test_update_rule() {
        let mut session = session("0", bit_inverter());
        let mut edited = session.rules()[0].clone();
        edited.write = 'x';

        session.update_rule(edited).unwrap();
        session.manual_step().unwrap();

        assert_eq!(session.state().tape.read(TAPE_PADDING), 'x');

        let missing = rule(42, "q0", '0', "q0", '0', Direction::Right);
        assert_eq!(
            session.update_rule(missing),
            Err(SimulatorError::UnknownRule(RuleId(42)))
        );
    }

    #[test]
    fn test_add_rule_assigns_fresh_ids() {
        let mut session = session("0", bit_inverter());

        let a = session.add_rule("q1", '0', "q1", '0', Direction::Right);
        let b = session.add_rule("q1", '1', "q1", '1', Direction::Right);

        assert_eq!(a, Ok(RuleId(4)));
        assert_eq!(b, Ok(RuleId(5)));
        assert!(!session.has_rule_errors());
    }

    #[test]
    fn test_reset_with_largest_rule_id() {
        let mut session = Session::default();
        session.reset("1", vec![rule(u64::MAX, "q0", '1', "halt", '1', Direction::Right)]);

        assert!(!session.has_rule_errors());
        assert_eq!(
            session.add_rule("q0", '0', "halt", '0', Direction::Right),
            Err(SimulatorError::RuleIdsExhausted)
        );
        assert_eq!(session.rules().len(), 1);

        session.manual_step().unwrap();
        assert!(session.state().is_halted);
        assert_eq!(session.state().last_used_rule_id, Some(RuleId(u64::MAX)));
    }

    #[test]
    fn test_set_speed_while_running() {
        let mut session = session("01101", bit_inverter());
        let start = Instant::now();
        session.run_at(start).unwrap();

        session.set_speed(10);

        assert_eq!(session.config().speed_ms, 10);
        assert_eq!(
            session.scheduler().next_tick(),
            Some(start + Duration::from_millis(1500))
        );
        assert!(session.tick(start + Duration::from_millis(1500)));
        assert_eq!(
            session.scheduler().next_tick(),
            Some(start + Duration::from_millis(1510))
        );
    }

    #[test]
    fn test_drive_runs_to_halt() {
        let mut session = session("1011", binary_increment());
        session.set_speed(0);
        session.run().unwrap();

        let steps = session.drive(1000);

        assert_eq!(steps, session.history().len());
        assert!(!session.is_running());
        assert_eq!(session.final_tape().as_deref(), Some("1100"));
    }

    #[test]
    fn test_drive_pauses_at_step_limit() {
        let rules = vec![
            rule(1, "q0", B, "q0", B, Direction::Right),
            rule(2, "q0", '1', "q0", '1', Direction::Right),
        ];
        let mut session = session("1", rules);
        session.set_speed(0);
        session.run().unwrap();

        assert_eq!(session.drive(50), 50);
        assert!(!session.is_running());
        assert!(!session.state().is_halted);
    }

    #[test]
    fn test_on_step_hook_fires_per_applied_rule() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);

        let mut session = session("01", bit_inverter());
        session.on_step(move || counter.set(counter.get() + 1));
        step_until_halted(&mut session);

        assert_eq!(calls.get(), 3);
        assert_eq!(session.state().step_count, 3);
    }

    #[test]
    fn test_hook_does_not_change_outcome() {
        let mut plain = session("1011", binary_increment());
        let mut hooked = session("1011", binary_increment());
        hooked.on_step(|| {});

        step_until_halted(&mut plain);
        step_until_halted(&mut hooked);

        assert_eq!(plain.snapshot(), hooked.snapshot());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut session = session("1", bit_inverter());
        session.manual_step().unwrap();

        let json = session.snapshot().to_json().unwrap();
        let snapshot: Snapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(snapshot.step_count, 1);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.validated_rules.len(), 3);
        assert_eq!(snapshot.last_used_rule_id, Some(RuleId(2)));
    }

    #[test]
    fn test_from_program_applies_overrides() {
        let program = Program {
            name: "Dots".to_string(),
            description: String::new(),
            input: "a.a".to_string(),
            blank: Some('.'),
            initial_state: Some("start".to_string()),
            halt_state: Some("done".to_string()),
            rules: vec![
                rule(1, "start", 'a', "start", 'b', Direction::Right),
                rule(2, "start", '.', "done", '.', Direction::Right),
            ],
        };
        let base = MachineConfig {
            speed_ms: 0,
            ..MachineConfig::default()
        };

        let mut session = Session::from_program(&program, base);
        assert_eq!(session.state().current_state, "start");
        assert_eq!(session.config().speed_ms, 0);

        step_until_halted(&mut session);

        assert_eq!(session.state().current_state, "done");
        assert_eq!(session.final_tape().as_deref(), Some("b.a"));

        let fresh = program.session(MachineConfig::default());
        assert_eq!(fresh.state().current_state, "start");
        assert_eq!(fresh.input(), "a.a");
        assert_eq!(fresh.rules().len(), 2);
        assert_eq!(fresh.config().blank, '.');
    }

    #[test]
    fn test_final_tape_all_blank() {
        let rules = vec![rule(1, "q0", '1', "halt", B, Direction::Right)];
        let mut session = session("1", rules);
        session.manual_step().unwrap();

        assert_eq!(session.final_tape().as_deref(), Some(" "));
    }
}
