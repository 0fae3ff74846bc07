//! Driver for Hanoi programs: compiles source text, runs it on a fresh
//! machine and collects everything a caller wants to report.

use std::vec::Vec as StdVec;

use hanoi_machine::{
    Machine, MachineError, Program, ProgramWord, Snapshot,
    builder::ProgramBuilder,
    compiler::{CompileError, Compiler},
    decode,
};
use thiserror::Error;
use tracing::debug;

pub mod samples;

pub use samples::Sample;

const PROGRAM_WORDS: usize = 16 * 1024;
const LABEL_CAP: usize = 64;
const REF_CAP: usize = 32;
pub const TOWER_CAP: usize = 1024;

pub type DeckSnapshot = Snapshot<TOWER_CAP>;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("{0}")]
    Compile(CompileError),
    /// The run stopped on a fault. `output` holds every character emitted
    /// before it and `snapshot` the towers as the fault left them.
    #[error("runtime fault at instruction {pc}: {error}")]
    Machine {
        pc: usize,
        error: MachineError,
        output: String,
        snapshot: Box<DeckSnapshot>,
    },
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not encode snapshot: {0}")]
    Encode(String),
}

impl From<CompileError> for DeckError {
    fn from(err: CompileError) -> Self {
        DeckError::Compile(err)
    }
}

impl DeckError {
    /// Multi line report in the shape users of the toolchain expect for
    /// parse failures: a headline, the offending text and a caret.
    pub fn diagnostic(&self) -> String {
        match self {
            DeckError::Compile(CompileError::UnparseableInput { line, snippet }) => {
                format!("Unable to parse program (line {line})\n {snippet}\n ^")
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeckConfig {
    /// Reject labels that are referenced but never defined.
    pub strict: bool,
    /// Log every executed instruction at debug level.
    pub trace: bool,
}

/// Result of compiling a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSource {
    pub instructions: StdVec<ProgramWord>,
    pub unresolved: StdVec<String>,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub compiled: CompiledSource,
    pub output: String,
    pub snapshot: DeckSnapshot,
}

pub fn compile_program(source: &str, config: &DeckConfig) -> Result<CompiledSource, DeckError> {
    let mut buffer = vec![0; PROGRAM_WORDS];
    let builder = ProgramBuilder::<LABEL_CAP, REF_CAP>::new(&mut buffer);
    let mut compiler = Compiler::new(builder).strict(config.strict);
    compiler.add_source(source)?;
    let descriptor = compiler.finish()?;
    let unresolved = descriptor
        .unresolved_labels()
        .map(str::to_string)
        .collect();
    buffer.truncate(descriptor.length);
    Ok(CompiledSource {
        instructions: buffer,
        unresolved,
    })
}

/// Runs a compiled program on a fresh machine. A fault is reported with
/// the offset of the faulting opcode, the output emitted so far and the
/// towers as the fault left them.
pub fn run_program(compiled: CompiledSource, config: &DeckConfig) -> Result<RunReport, DeckError> {
    let mut machine = Machine::<TOWER_CAP>::new();
    let mut program = Program::new(&compiled.instructions);
    let mut output = String::new();

    loop {
        // Literals move the counter onto their operand before they can
        // fault, so the opcode offset is taken up front.
        let pc = program.pc();
        let running = match machine.step(&mut program, &mut output) {
            Ok(running) => running,
            Err(error) => {
                return Err(DeckError::Machine {
                    pc,
                    error,
                    output,
                    snapshot: Box::new(machine.snapshot()),
                });
            }
        };
        if config.trace {
            debug!(
                pc,
                current = machine.current().get(),
                stack = ?machine.current_stack(),
                "step"
            );
        }
        if !running {
            break;
        }
    }

    let snapshot = machine.snapshot();
    Ok(RunReport {
        compiled,
        output,
        snapshot,
    })
}

/// Compiles and runs `source`.
pub fn run_source(source: &str, config: &DeckConfig) -> Result<RunReport, DeckError> {
    let compiled = compile_program(source, config)?;
    run_program(compiled, config)
}

/// One line per decoded instruction, e.g. `0004 ADD`.
pub fn disassemble(instructions: &[ProgramWord]) -> String {
    let mut text = String::new();
    for instruction in decode(instructions) {
        let line = match instruction {
            Ok(instruction) => instruction.to_string(),
            Err(err) => format!("???? {err}"),
        };
        text.push_str(&line);
        text.push('\n');
    }
    text
}

pub fn snapshot_json(snapshot: &DeckSnapshot) -> Result<String, DeckError> {
    serde_json::to_string_pretty(snapshot).map_err(|err| DeckError::Encode(err.to_string()))
}

/// COBS framed postcard encoding of the snapshot, as lowercase hex.
pub fn snapshot_postcard(snapshot: &DeckSnapshot) -> Result<String, DeckError> {
    let bytes = postcard::to_allocvec_cobs(snapshot)
        .map_err(|err| DeckError::Encode(err.to_string()))?;
    Ok(bytes.iter().map(|byte| format!("{byte:02x}")).collect())
}
