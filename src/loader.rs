//! Reads `.tur` program files from disk and hands their text to the parser.

use crate::parser::parse;
use crate::types::{Program, SimulatorError};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One entry of a directory scan: the file and what it parsed to.
pub type LoadResult = Result<(PathBuf, Program), SimulatorError>;

pub struct ProgramLoader;

impl ProgramLoader {
    /// Reads and parses the program stored at `path`.
    ///
    /// An unreadable file is a `FileError`; unreadable content is whatever `parse` reports.
    pub fn load_program(path: &Path) -> Result<Program, SimulatorError> {
        let content = fs::read_to_string(path).map_err(|e| {
            SimulatorError::FileError(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), bytes = content.len(), "loading program");
        parse(&content)
    }

    /// Parses program text that did not come from a file, such as piped stdin.
    pub fn load_program_from_string(content: &str) -> Result<Program, SimulatorError> {
        parse(content)
    }

    /// Scans `directory` (not recursively) for `.tur` files.
    ///
    /// A bad file does not stop the scan: its error takes its place in the list. Loaded
    /// programs come first in path order, failures after them.
    pub fn load_programs(directory: &Path) -> Vec<LoadResult> {
        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) => {
                return vec![Err(SimulatorError::FileError(format!(
                    "Failed to read directory {}: {}",
                    directory.display(),
                    e
                )))]
            }
        };

        let mut results: Vec<LoadResult> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => {
                    let path = entry.path();
                    is_program_file(&path)
                        .then(|| Self::load_program(&path).map(|program| (path, program)))
                }
                Err(e) => Some(Err(SimulatorError::FileError(format!(
                    "Failed to read directory entry: {}",
                    e
                )))),
            })
            .collect();

        results.sort_by(by_path_failures_last);
        results
    }
}

fn is_program_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("tur")
}

// read_dir order is platform dependent
fn by_path_failures_last(a: &LoadResult, b: &LoadResult) -> Ordering {
    match (a, b) {
        (Ok((a, _)), Ok((b, _))) => a.cmp(b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => Ordering::Equal,
    }
}
