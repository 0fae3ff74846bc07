//! Compile and run a Hanoi program.
//!
//! Usage:
//! `hanoi-deck [FILE] [--sample add|hello|labels] [--strict] [--trace]
//! [--dump json|postcard] [--quiet]`
//!
//! Program output goes to stdout, also when the run faults; logs go to
//! stderr.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use hanoi_deck::{
    DeckConfig, DeckError, Sample, compile_program, disassemble, run_program, snapshot_json,
    snapshot_postcard,
};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DumpFormat {
    Json,
    Postcard,
}

#[derive(Parser, Debug)]
#[command(name = "hanoi-deck")]
#[command(about = "Compile a Hanoi tower program and run it")]
struct Cli {
    /// Program source file; a bundled sample runs when omitted
    file: Option<PathBuf>,

    /// Bundled sample to run when no file is given
    #[arg(long, value_enum, default_value_t = Sample::Add)]
    sample: Sample,

    /// Fail when a jump reference names a label that is never defined
    #[arg(long)]
    strict: bool,

    /// Log every executed instruction (needs RUST_LOG=hanoi_deck=debug)
    #[arg(long)]
    trace: bool,

    /// Print the final machine state to stdout in this format
    #[arg(long, value_enum)]
    dump: Option<DumpFormat>,

    /// Do not print the start and end banners around program output
    #[arg(long)]
    quiet: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hanoi_deck=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn read_source(cli: &Cli) -> Result<String, DeckError> {
    match &cli.file {
        Some(path) => fs::read_to_string(path).map_err(|source| DeckError::Read {
            path: path.display().to_string(),
            source,
        }),
        None => Ok(cli.sample.source().to_string()),
    }
}

fn write_output(output: &str, banners: bool) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    if banners {
        writeln!(stdout, "$$$ PROGRAM START $$$")?;
    }
    write!(stdout, "{output}")?;
    if banners {
        writeln!(stdout, "\n$$$$$$$$$$$$$$$$$$$$$")?;
    }
    stdout.flush()
}

fn print_output(output: &str, quiet: bool) {
    if let Err(err) = write_output(output, !quiet) {
        warn!("could not write program output: {err}");
    }
}

fn run(cli: &Cli) -> Result<(), DeckError> {
    let config = DeckConfig {
        strict: cli.strict,
        trace: cli.trace,
    };

    let source = read_source(cli)?;
    info!("INPUT\n{}", source.trim_end());

    let compiled = compile_program(&source, &config)?;
    info!(program = ?compiled.instructions, "PROGRAM");
    debug!("disassembly\n{}", disassemble(&compiled.instructions).trim_end());
    for label in compiled.unresolved.iter() {
        warn!(label = label.as_str(), "label is referenced but never defined");
    }

    let report = match run_program(compiled, &config) {
        Ok(report) => report,
        Err(err) => {
            if let DeckError::Machine { output, .. } = &err {
                print_output(output, cli.quiet);
            }
            return Err(err);
        }
    };
    print_output(&report.output, cli.quiet);

    for (index, tower) in report.snapshot.towers.iter().enumerate() {
        info!(tower = index, values = ?tower.as_slice(), "final tower");
    }
    info!(current = report.snapshot.current.get(), "current tower");

    match cli.dump {
        Some(DumpFormat::Json) => println!("{}", snapshot_json(&report.snapshot)?),
        Some(DumpFormat::Postcard) => println!("{}", snapshot_postcard(&report.snapshot)?),
        None => {}
    }
    Ok(())
}

fn main() {
    init_logging();

    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        error!("{}", err.diagnostic());
        process::exit(1);
    }
}
