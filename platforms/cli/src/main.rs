mod logging;

use clap::Parser;
use std::io::{self, Read};
use std::path::Path;
use std::process::ExitCode;
use tracing::info;
use tursim::types::{INPUT_BLANK_SYMBOL, MAX_EXECUTION_STEPS};
use tursim::{MachineConfig, Program, ProgramLoader, ProgramManager, Session, SimulatorError};

/// Runs a single-tape Turing machine program until it halts.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(after_help = "EXAMPLES:
  tursim-cli --program programs/binary-increment.tur --input 111
  tursim-cli --example \"Bit Inverter\" --debug
  cat programs/palindrome.tur | tursim-cli")]
struct Cli {
    /// The program file (.tur) to execute. Program text is read from stdin when piped.
    #[clap(short, long, conflicts_with = "example")]
    program: Option<String>,

    /// Run a built-in program by name
    #[clap(short, long)]
    example: Option<String>,

    /// Replace the program's input. `_` stands for the blank symbol
    #[clap(short, long)]
    input: Option<String>,

    /// Milliseconds between two steps
    #[clap(short, long, default_value_t = 0)]
    speed: u64,

    /// Pause after this many steps
    #[clap(long, default_value_t = MAX_EXECUTION_STEPS)]
    max_steps: usize,

    /// Print each step of the execution
    #[clap(short = 'd', long)]
    debug: bool,

    /// Print the final snapshot as JSON instead of the tape
    #[clap(long)]
    json: bool,

    /// List the built-in programs and exit
    #[clap(short, long)]
    list: bool,
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, SimulatorError> {
    if cli.list {
        for (index, name) in ProgramManager::list_program_names().iter().enumerate() {
            println!("{}. {}", index + 1, name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut program = load_program(&cli)?;
    let base = MachineConfig {
        speed_ms: cli.speed,
        ..MachineConfig::default()
    };
    let config = program.apply(base.clone());

    if let Some(input) = &cli.input {
        program.input = input
            .chars()
            .map(|c| if c == INPUT_BLANK_SYMBOL { config.blank } else { c })
            .collect();
    }

    let mut session = Session::from_program(&program, base);
    for warning in session.analyze() {
        eprintln!("Warning: {}", warning);
    }
    for invalid in session.validation().conflicts() {
        let reason = invalid.conflict.as_deref().unwrap_or_default();
        eprintln!("Rule {} {}: {}", invalid.rule.id, invalid.rule, reason);
    }

    info!(program = %program.name, input = %program.input, "running");
    session.run()?;
    let steps = session.drive(cli.max_steps);

    if cli.debug {
        for entry in session.history() {
            let rule = entry
                .rule_id
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            println!(
                "Step: {}, State: {}, Read: '{}', Head: {}, Rule: {}",
                entry.step, entry.state, entry.read, entry.position, rule
            );
        }
        println!();
    }

    if cli.json {
        let json = session
            .snapshot()
            .to_json()
            .map_err(|e| SimulatorError::ValidationError(e.to_string()))?;
        println!("{}", json);
    }

    let state = session.state();
    if !state.is_halted {
        eprintln!("Machine did not halt after {} steps.", steps);
        return Ok(ExitCode::from(2));
    }

    if let Some(error) = &state.error {
        eprintln!("Machine error: {}", error);
        return Ok(ExitCode::FAILURE);
    }

    if !cli.json {
        println!("{}", session.final_tape().unwrap_or_default());
    }

    Ok(ExitCode::SUCCESS)
}

/// Loads the program from a file, a built-in name, stdin, or falls back to the first
/// built-in program.
fn load_program(cli: &Cli) -> Result<Program, SimulatorError> {
    if let Some(path) = &cli.program {
        ProgramLoader::load_program(Path::new(path))
    } else if let Some(name) = &cli.example {
        ProgramManager::get_program_by_name(name)
    } else if atty::isnt(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| SimulatorError::FileError(format!("Failed to read from stdin: {}", e)))?;
        ProgramLoader::load_program_from_string(&buffer)
    } else {
        ProgramManager::get_program_by_index(0)
    }
}
