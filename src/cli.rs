use crate::config::{ConfigLocator, SettingsStore};
use crate::model::{OutputFormat, ProcessOutcome, SearchRequest, StatusEvent};
use crate::supervisor::WorkerSupervisor;
use crate::table;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr so event printing never blocks
/// the async event consumer.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "bizfinder",
    version,
    about = "Supervises the gmaps-scraper worker and reports typed progress and results"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a business search through the worker
    Search(SearchArgs),
    /// Manage the persisted configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Parse a previously written result file and print its records
    Read {
        /// Path to a result CSV file
        file: PathBuf,
        /// Print records as JSON instead of CSV
        #[arg(long)]
        json: bool,
    },
    /// List candidate configuration and output directories with their
    /// writability status
    Dirs,
}

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    /// What to search for, e.g. "plumbers"
    #[arg(short, long)]
    pub keyword: String,

    /// Where to search, e.g. "Austin, TX"
    #[arg(short, long)]
    pub location: String,

    /// Maximum number of results to fetch
    #[arg(short = 'r', long, default_value_t = 50)]
    pub max_results: u32,

    /// Result file format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Directory for the result file (defaults to the last used directory,
    /// then the user's downloads directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Skip per-business website enhancement
    #[arg(long)]
    pub no_web_scraping: bool,

    /// Worker executable to supervise
    #[arg(long, default_value = "gmaps-scraper")]
    pub worker: PathBuf,

    /// Working directory for the worker (defaults to the worker's own
    /// directory)
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Print the terminal outcome as JSON instead of a text table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ConfigCommand {
    /// Store the Google Maps API key in the active configuration location
    SetKey {
        /// The API key value
        key: String,
    },
    /// Show the active configuration location and whether a key is set
    Show,
}

pub async fn run(args: Cli) -> Result<()> {
    match args.command {
        Command::Search(search) => run_search(search).await,
        Command::Config { command } => run_config(command),
        Command::Read { file, json } => run_read(&file, json),
        Command::Dirs => run_dirs(),
    }
}

/// Build the immutable request from CLI arguments, filling the output
/// directory from remembered settings when not given.
fn build_request(args: &SearchArgs, locator: &mut ConfigLocator) -> SearchRequest {
    let output_directory = args
        .output_dir
        .clone()
        .or_else(|| locator.load().ok().and_then(|d| d.last_output_directory))
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    SearchRequest {
        keyword: args.keyword.clone(),
        location: args.location.clone(),
        max_results: args.max_results.max(1),
        output_format: args.format,
        output_directory,
        enable_web_scraping: !args.no_web_scraping,
    }
}

async fn run_search(args: SearchArgs) -> Result<()> {
    let mut locator = ConfigLocator::new();
    let request = build_request(&args, &mut locator);

    let mut supervisor = WorkerSupervisor::new(args.worker.clone());
    if let Some(dir) = args.working_dir.clone() {
        supervisor = supervisor.with_working_dir(dir);
    }

    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<StatusEvent>();

    // One worker per run; the supervisor task owns the classifier and the
    // configuration context for the run's lifetime.
    let handle = tokio::spawn(async move {
        let outcome = supervisor.run(&mut locator, &request, &evt_tx).await;
        if outcome.is_ok() {
            locator.remember_output_directory(&request.output_directory);
        }
        outcome
    });

    // Forward events in arrival order as they are pushed.
    while let Some(ev) = evt_rx.recv().await {
        let _ = out_tx.send(OutputLine::Stderr(ev.to_message()));
    }

    let outcome = handle.await.context("supervisor task failed")??;
    report_outcome(&args, &outcome, &out_tx)?;

    drop(out_tx);
    let _ = out_handle.await;

    if outcome.success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "worker failed (exit code {}): {}",
            outcome.exit_code,
            outcome.failure_diagnostic()
        ))
    }
}

fn report_outcome(
    args: &SearchArgs,
    outcome: &ProcessOutcome,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    if args.json {
        let text = serde_json::to_string_pretty(outcome)?;
        let _ = out_tx.send(OutputLine::Stdout(text));
        return Ok(());
    }
    if !outcome.success() {
        return Ok(());
    }
    match &outcome.table {
        Some(records) => {
            let _ = out_tx.send(OutputLine::Stderr(format!(
                "{} records, saved to {}",
                records.len(),
                outcome.output_file_path.display()
            )));
            let _ = out_tx.send(OutputLine::Stdout(table::to_csv_text(records)));
        }
        None => {
            let _ = out_tx.send(OutputLine::Stderr(format!(
                "No result table found (expected {})",
                outcome.output_file_path.display()
            )));
        }
    }
    Ok(())
}

fn run_config(command: ConfigCommand) -> Result<()> {
    let mut locator = ConfigLocator::new();
    match command {
        ConfigCommand::SetKey { key } => {
            let location = locator.save(&key)?;
            println!("API key saved to {}", location.config_file().display());
            Ok(())
        }
        ConfigCommand::Show => {
            let location = locator.resolve()?;
            let data = locator.load()?;
            println!("Active location: {}", location.path.display());
            println!(
                "API key: {}",
                if data.api_key.is_some() { "set" } else { "not set" }
            );
            if let Some(dir) = data.last_output_directory {
                println!("Last output directory: {}", dir.display());
            }
            Ok(())
        }
    }
}

fn run_read(file: &std::path::Path, json: bool) -> Result<()> {
    let records = table::read_result_file(file)
        .with_context(|| format!("could not read result file {}", file.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print!("{}", table::to_csv_text(&records));
    }
    Ok(())
}

fn run_dirs() -> Result<()> {
    let locator = ConfigLocator::new();
    println!("Configuration candidates (priority order):");
    for (path, status) in locator.probe_report() {
        match status {
            Ok(()) => println!("  {} (writable)", path.display()),
            Err(reason) => println!("  {} ({})", path.display(), reason),
        }
    }
    println!("Output directory candidates:");
    for dir in output_dir_candidates() {
        println!("  {}", dir.display());
    }
    let _ = SettingsStore::default_path()
        .map(|p| println!("Settings store: {}", p.display()));
    Ok(())
}

/// Directories offered to the user for result files.
pub fn output_dir_candidates() -> Vec<PathBuf> {
    [dirs::download_dir(), dirs::document_dir(), dirs::home_dir()]
        .into_iter()
        .flatten()
        .collect()
}
