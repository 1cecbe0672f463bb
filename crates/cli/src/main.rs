// tabula - headless driver for a single spreadsheet model.
// Reads line commands from a script file or stdin; see `help` output.

mod repl;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::debug;

use tabula_engine::Sheet;

use repl::{execute, Command, Outcome};

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Single-sheet spreadsheet model (headless)")]
#[command(version)]
struct Cli {
    /// Script of commands to run (stdin when omitted).
    script: Option<PathBuf>,

    /// Suppress the interactive prompt.
    #[arg(long, short = 'q')]
    quiet: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> io::Result<ExitCode> {
    let mut sheet = Sheet::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let script_mode = cli.script.is_some();
    let reader: Box<dyn BufRead> = match &cli.script {
        Some(path) => {
            debug!("running script {}", path.display());
            Box::new(BufReader::new(File::open(path)?))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut failures = 0u32;
    let mut lines = reader.lines();
    loop {
        if !script_mode && !cli.quiet {
            write!(out, "> ")?;
            out.flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        match Command::parse(&line?) {
            Ok(None) => {}
            Ok(Some(command)) => match execute(&mut sheet, command, &mut out)? {
                Outcome::Continue => {}
                Outcome::Failed => failures += 1,
                Outcome::Quit => break,
            },
            Err(e) => {
                writeln!(out, "error: {}", e)?;
                failures += 1;
            }
        }
    }

    if script_mode && failures > 0 {
        debug!("{} commands failed", failures);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
