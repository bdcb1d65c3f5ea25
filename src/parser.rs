//! This module provides the parser for Turing Machine programs, utilizing the `pest` crate.
//! A program is a list of `key: value` headers and transition lines of the form
//! `state, read -> new_state, write, direction`, in any order.

use crate::{
    types::{
        self, Direction, Program, RuleIdGenerator, SimulatorError, Symbol, DEFAULT_BLANK_SYMBOL,
        INPUT_BLANK_SYMBOL, MAX_PROGRAM_SIZE,
    },
    validator::analyze,
};
use pest::{
    error::{Error, ErrorVariant},
    iterators::{Pair, Pairs},
    Parser as PestParser, Span,
};
use pest_derive::Parser as PestParser;
use std::collections::HashSet;
use tracing::warn;

/// Derives a `PestParser` for the program grammar defined in `grammar.pest`.
#[derive(PestParser)]
#[grammar = "grammar.pest"]
pub struct ProgramParser;

/// Parses the given input string into a `Program`.
///
/// Conflicting rules are not rejected here; they surface through validation once the rules
/// are installed in a session. Non-blocking analysis findings are logged.
///
/// # Returns
///
/// * `Ok(Program)` if the input is successfully parsed.
/// * `Err(SimulatorError::ParseError)` if there are syntax errors or misused headers.
/// * `Err(SimulatorError::ValidationError)` if the program is missing required parts.
pub fn parse(input: &str) -> Result<Program, SimulatorError> {
    if input.len() > MAX_PROGRAM_SIZE {
        return Err(SimulatorError::ValidationError(format!(
            "Program exceeds {} bytes",
            MAX_PROGRAM_SIZE
        )));
    }

    let root = ProgramParser::parse(Rule::program, input.trim())
        .map_err(|e| SimulatorError::ParseError(Box::new(e)))?
        .next()
        .ok_or_else(|| SimulatorError::ValidationError("Empty program".to_string()))?;

    let program = parse_program(root)?;

    for warning in analyze(&program.rules, &program.config()) {
        warn!(program = %program.name, %warning, "program analysis");
    }

    Ok(program)
}

/// Header values collected while walking the parse tree.
#[derive(Default)]
struct Headers {
    name: Option<String>,
    description: Option<String>,
    input: Option<String>,
    blank: Option<Symbol>,
    initial_state: Option<String>,
    halt_state: Option<String>,
}

/// Parses the top-level structure of a program from a `Pair<Rule::program>`.
///
/// Transition lines are collected first and converted once the blank symbol is known, since
/// `_` in a transition stands for the blank and `blank:` may appear anywhere.
fn parse_program(pair: Pair<Rule>) -> Result<Program, SimulatorError> {
    let mut headers = Headers::default();
    let mut transitions = Vec::new();
    let mut seen = HashSet::new();

    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::header => parse_header(p, &mut headers, &mut seen)?,
            Rule::transition => transitions.push(p),
            _ => {} // EOI
        }
    }

    let name = check_required(headers.name, "name")?;
    if transitions.is_empty() {
        return Err(SimulatorError::ValidationError(
            "Program defines no transitions".to_string(),
        ));
    }

    let blank = headers.blank;
    let effective_blank = blank.unwrap_or(DEFAULT_BLANK_SYMBOL);
    let mut ids = RuleIdGenerator::new();
    let rules = transitions
        .into_iter()
        .map(|p| parse_transition(p, effective_blank, &mut ids))
        .collect::<Result<Vec<_>, _>>()?;

    let input = headers
        .input
        .unwrap_or_default()
        .chars()
        .map(|c| rewrite_blank(c, effective_blank))
        .collect();

    Ok(Program {
        name,
        description: headers.description.unwrap_or_default(),
        input,
        blank,
        initial_state: headers.initial_state,
        halt_state: headers.halt_state,
        rules,
    })
}

/// Parses a single `key: value` header into `headers`, rejecting duplicates.
fn parse_header(
    pair: Pair<Rule>,
    headers: &mut Headers,
    seen: &mut HashSet<String>,
) -> Result<(), SimulatorError> {
    let span = pair.as_span();
    let mut pairs = pair.into_inner();
    let key = next_str(&mut pairs);
    let value = next_str(&mut pairs).trim();

    if !seen.insert(key.to_string()) {
        return Err(parse_error(
            &format!("Duplicate \"{key}:\" declaration"),
            span,
        ));
    }

    match key {
        "name" => headers.name = Some(check_non_empty(value, key, span)?.to_string()),
        "description" => headers.description = Some(value.to_string()),
        "input" => headers.input = Some(value.to_string()),
        "blank" => headers.blank = Some(parse_blank(value, span)?),
        "initial" => headers.initial_state = Some(parse_state_label(value, key, span)?),
        "halt" => headers.halt_state = Some(parse_state_label(value, key, span)?),
        _ => {}
    }

    Ok(())
}

/// Parses one transition line from a `Pair<Rule::transition>`.
fn parse_transition(
    pair: Pair<Rule>,
    blank: Symbol,
    ids: &mut RuleIdGenerator,
) -> Result<types::Rule, SimulatorError> {
    let span = pair.as_span();
    let mut pairs = pair.into_inner();
    let current_state = next_str(&mut pairs).to_string();
    let read = parse_symbol(next_str(&mut pairs), blank);
    let new_state = next_str(&mut pairs).to_string();
    let write = parse_symbol(next_str(&mut pairs), blank);
    let direction = parse_direction(next_str(&mut pairs), span)?;

    Ok(types::Rule::new(
        ids.next_id()?,
        current_state,
        read,
        new_state,
        write,
        direction,
    ))
}

/// Parses the direction of a transition.
///
/// Supports `L`/`Left` and `R`/`Right`, in any case.
fn parse_direction(input: &str, span: Span) -> Result<Direction, SimulatorError> {
    match input.to_ascii_lowercase().as_str() {
        "l" | "left" => Ok(Direction::Left),
        "r" | "right" => Ok(Direction::Right),
        other => Err(parse_error(
            &format!("Unsupported direction: \"{other}\""),
            span,
        )),
    }
}

/// Parses a single character symbol, handling quoted symbols and the blank alias.
fn parse_symbol(input: &str, blank: Symbol) -> Symbol {
    let symbol = unquote(input).chars().next().unwrap_or(blank);
    rewrite_blank(symbol, blank)
}

/// Parses the `blank:` header. The value must be exactly one (optionally quoted) character.
fn parse_blank(value: &str, span: Span) -> Result<Symbol, SimulatorError> {
    let mut chars = unquote(value).chars();
    match (chars.next(), chars.next()) {
        (Some(symbol), None) => Ok(symbol),
        _ => Err(parse_error(
            &format!("Blank symbol must be a single character, got \"{value}\""),
            span,
        )),
    }
}

/// Parses the value of `initial:` or `halt:`.
fn parse_state_label(value: &str, key: &str, span: Span) -> Result<String, SimulatorError> {
    let label = check_non_empty(value, key, span)?;
    if label.chars().any(char::is_whitespace) {
        return Err(parse_error(
            &format!("\"{key}:\" must be a single state name"),
            span,
        ));
    }
    Ok(label.to_string())
}

fn rewrite_blank(symbol: Symbol, blank: Symbol) -> Symbol {
    if symbol == INPUT_BLANK_SYMBOL {
        blank
    } else {
        symbol
    }
}

fn unquote(input: &str) -> &str {
    let trimmed = input.trim();
    if trimmed.len() >= 3 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// Creates a `SimulatorError::ParseError` from a message and a `Span`.
fn parse_error(msg: &str, span: Span) -> SimulatorError {
    SimulatorError::ParseError(Box::new(Error::new_from_span(
        ErrorVariant::CustomError {
            message: msg.to_string(),
        },
        span,
    )))
}

/// Extracts the string content of the next `Pair`, or `""` if there is none.
fn next_str<'i>(pairs: &mut Pairs<'i, Rule>) -> &'i str {
    pairs.next().map(|p| p.as_str()).unwrap_or_default()
}

fn check_non_empty<'a>(value: &'a str, key: &str, span: Span) -> Result<&'a str, SimulatorError> {
    if value.is_empty() {
        return Err(parse_error(&format!("\"{key}:\" must not be empty"), span));
    }
    Ok(value)
}

/// Checks if a required header is present, returning an `Err` if it's missing.
fn check_required<T>(value: Option<T>, name: &str) -> Result<T, SimulatorError> {
    value.ok_or_else(|| SimulatorError::ValidationError(format!("Missing '{name}' header")))
}
