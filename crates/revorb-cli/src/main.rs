use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revorb_core::{repair, repair_in_place, repair_to, RepairError, RepairOutcome};

/// Recomputes page granule positions in Ogg Vorbis files.
#[derive(Parser, Debug)]
#[command(name = "revorb", version)]
struct Args {
    /// Input file, or "-" for standard input
    input: PathBuf,

    /// Output file; when omitted the input file is repaired in place
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp
                | clap::error::ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "revorb_core=warn,revorb=warn".into()),
        )
        .init();

    if args.input.as_os_str() == "-" && args.output.is_none() {
        eprintln!("An output file is required when reading from standard input.");
        return ExitCode::from(1);
    }

    match run(&args) {
        Ok(outcome) => {
            let summary = outcome.summary();
            tracing::info!(
                packets = summary.packets,
                final_granule = summary.final_granule,
                duration_secs = summary.duration(),
                "repair finished"
            );
            if !outcome.is_clean() {
                tracing::warn!("completed with warnings, original file kept in in-place mode");
            }
            ExitCode::SUCCESS
        }
        Err(RepairError::OutputOpen(_)) => {
            eprintln!("Could not open output file.");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::SUCCESS
        }
    }
}

fn run(args: &Args) -> Result<RepairOutcome, RepairError> {
    match (&args.output, args.input.as_os_str() == "-") {
        (Some(output), true) => {
            let mut data = Vec::new();
            io::stdin().lock().read_to_end(&mut data)?;
            let fo = BufWriter::new(File::create(output).map_err(RepairError::OutputOpen)?);
            repair(Cursor::new(data), fo)
        }
        (Some(output), false) => repair_to(&args.input, output),
        (None, _) => repair_in_place(&args.input),
    }
}
