//! Built-in example programs, embedded at compile time and parsed once on first use.

use crate::types::{Program, SimulatorError};

use tracing::error;

// Default embedded programs
const PROGRAM_TEXTS: [&str; 3] = [
    include_str!("../programs/binary-increment.tur"),
    include_str!("../programs/bit-inverter.tur"),
    include_str!("../programs/palindrome.tur"),
];

lazy_static::lazy_static! {
    /// The embedded programs that parsed successfully, paired with their source text.
    pub static ref PROGRAMS: Vec<(Program, &'static str)> = PROGRAM_TEXTS
        .iter()
        .filter_map(|text| match crate::parser::parse(text) {
            Ok(program) => Some((program, *text)),
            Err(e) => {
                error!(error = %e, "failed to parse embedded program");
                None
            }
        })
        .collect();
}

pub struct ProgramManager;

impl ProgramManager {
    /// Get the number of available programs
    pub fn count() -> usize {
        PROGRAMS.len()
    }

    /// Get a program by its index
    pub fn get_program_by_index(index: usize) -> Result<Program, SimulatorError> {
        PROGRAMS
            .get(index)
            .map(|(program, _)| program.clone())
            .ok_or_else(|| {
                SimulatorError::ValidationError(format!("Program index {} out of range", index))
            })
    }

    /// Get a program by its name, ignoring case
    pub fn get_program_by_name(name: &str) -> Result<Program, SimulatorError> {
        PROGRAMS
            .iter()
            .find(|(program, _)| program.name.eq_ignore_ascii_case(name))
            .map(|(program, _)| program.clone())
            .ok_or_else(|| SimulatorError::ValidationError(format!("Program '{}' not found", name)))
    }

    /// List all program names
    pub fn list_program_names() -> Vec<String> {
        PROGRAMS
            .iter()
            .map(|(program, _)| program.name.clone())
            .collect()
    }

    /// Get the original text of a program by its index
    pub fn get_program_text_by_index(index: usize) -> Result<&'static str, SimulatorError> {
        PROGRAMS.get(index).map(|(_, text)| *text).ok_or_else(|| {
            SimulatorError::ValidationError(format!("Program text index {} out of range", index))
        })
    }

    /// Get information about a program by its index
    pub fn get_program_info(index: usize) -> Result<ProgramInfo, SimulatorError> {
        let program = Self::get_program_by_index(index)?;

        Ok(ProgramInfo {
            index,
            state_count: program.state_count(),
            rule_count: program.rules.len(),
            name: program.name,
            description: program.description,
            input: program.input,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProgramInfo {
    pub index: usize,
    pub name: String,
    pub description: String,
    pub input: String,
    pub state_count: usize,
    pub rule_count: usize,
}
