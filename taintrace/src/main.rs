use std::fs::{read, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use indicatif::ProgressBar;
use log::{info, LevelFilter};
use serde_json::to_string_pretty;
use simple_logger::SimpleLogger;

use taintrace::replay::{replay, Recording, Report};
use taintrace::{Options, Result};

#[derive(Parser, Debug)]
struct Args {
    /// Recorded debugger session (JSON)
    #[clap()]
    recording: PathBuf,
    /// Engine options (JSON), defaults otherwise
    #[clap(short, long)]
    options: Option<PathBuf>,
    /// ELF image to map into the replayed process, overrides the recording
    #[clap(short, long)]
    binary: Option<PathBuf>,
    /// Write the report here instead of stdout
    #[clap(short = 'O', long)]
    output: Option<PathBuf>,
    /// Hide the progress bar
    #[clap(short, long)]
    quiet: bool,
    /// More logging, repeat for trace output
    #[clap(short, long, parse(from_occurrences))]
    verbose: u8,
}

fn run(args: Args) -> Result<()> {
    let options = match &args.options {
        Some(path) => Options::load(path)?,
        None => Options::default(),
    };

    let level = match args.verbose {
        0 => options.log_level(),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("taintrace: cannot install logger: {}", e);
    }

    let mut recording = Recording::from_json(&read(&args.recording)?)?;
    if args.binary.is_some() {
        recording.binary = args.binary;
    }

    let bar = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(recording.events.len() as u64)
    };
    let engine = replay(&recording, options, &bar)?;

    for constraint in engine.session().path_constraints().iter() {
        info!("{}", constraint);
    }

    let report = to_string_pretty(&Report::from_engine(&engine))?;
    if let Some(path) = args.output {
        let mut file = File::create(path)?;
        file.write_all(report.as_bytes())?;
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("taintrace: {}", e);
        exit(1);
    }
}
