//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use govsnap_core::{IngestReport, Pipeline, ProgressReporter, SourceOutcome, SourceReport};
use govsnap_shared::{AppConfig, SourceDescriptor, config_dir, init_config, load_config, load_config_from};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

/// Exit code for configuration errors, before any source is fetched.
const EXIT_CONFIG: i32 = 2;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// GovSnap: snapshot public-sector pages and portals with provenance.
#[derive(Parser)]
#[command(
    name = "govsnap",
    version,
    about = "Fetch public-sector sources into a provenance-tagged, change-detecting snapshot tree.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch every configured source and update the snapshot tree.
    Ingest {
        /// Config file (defaults to ~/.govsnap/govsnap.toml).
        #[arg(short, long, env = "GOVSNAP_CONFIG")]
        config: Option<PathBuf>,

        /// Snapshot root, overriding `[output] root`.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print aggregate statistics for a snapshot tree.
    Stats {
        /// Snapshot root.
        root: PathBuf,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove sidecar files whose content file no longer exists.
    Clean {
        /// Snapshot root.
        root: PathBuf,
    },

    /// Decode a snapshot file and print its provenance header.
    Show {
        /// Snapshot content file.
        file: PathBuf,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default config file.
    Init {
        /// Directory to create it in (defaults to ~/.govsnap).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Validate and print the resolved configuration.
    Show {
        #[arg(short, long, env = "GOVSNAP_CONFIG")]
        config: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "govsnap=info",
        1 => "govsnap=debug",
        _ => "govsnap=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command. Returns the process exit code.
pub(crate) async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Ingest { config, out, json } => cmd_ingest(config.as_deref(), out, json).await,
        Command::Stats { root, json } => cmd_stats(&root, json).map(|()| 0),
        Command::Clean { root } => cmd_clean(&root).map(|()| 0),
        Command::Show { file, json } => cmd_show(&file, json).map(|()| 0),
        Command::Config { action } => match action {
            ConfigAction::Init { dir } => cmd_config_init(dir).map(|()| 0),
            ConfigAction::Show { config } => cmd_config_show(config.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> govsnap_shared::Result<AppConfig> {
    match path {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

async fn cmd_ingest(config_path: Option<&Path>, out: Option<PathBuf>, json: bool) -> Result<i32> {
    let config = match resolve_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration rejected");
            eprintln!("error: {e}");
            return Ok(EXIT_CONFIG);
        }
    };

    let root = out.unwrap_or_else(|| PathBuf::from(&config.output.root));
    let pipeline = Pipeline::with_output_root(&config, root.clone())
        .wrap_err("failed to initialize the ingest pipeline")?;

    info!(sources = config.sources.len(), root = %root.display(), "ingesting");

    let progress = CliProgress::new();
    let report = pipeline.run(&config.sources, &progress).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &root);
    }

    Ok(report.exit_code())
}

fn print_report(report: &IngestReport, root: &Path) {
    println!();
    println!("  Snapshot root: {}", root.display());
    println!("  Created:       {}", report.created());
    println!("  Updated:       {}", report.updated());
    println!("  Unchanged:     {}", report.unchanged());
    println!("  Failed:        {}", report.failed());
    println!("  Elapsed:       {:.1}s", report.elapsed.as_secs_f64());

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!();
        for source in failures {
            if let SourceOutcome::Failed { kind, message } = &source.outcome {
                println!("  FAILED [{kind}] {}: {message}", source.url);
            }
        }
    }
    println!();
}

/// Progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn source_started(&self, source: &SourceDescriptor, index: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching [{}/{total}] {}", index + 1, source.url));
    }

    fn source_finished(&self, report: &SourceReport, index: usize, total: usize) {
        let status = match &report.outcome {
            SourceOutcome::Written { created: true, .. } => "created",
            SourceOutcome::Written { changed: true, .. } => "updated",
            SourceOutcome::Written { .. } => "unchanged",
            SourceOutcome::Failed { .. } => "failed",
        };
        self.spinner.set_message(format!(
            "[{}/{total}] {status} {}",
            index + 1,
            report.output_path
        ));
    }

    fn done(&self, _report: &IngestReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// stats / clean / show
// ---------------------------------------------------------------------------

fn cmd_stats(root: &Path, json: bool) -> Result<()> {
    let stats = govsnap_snapshot::stats(root)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let newest = stats.newest_update.map(|t| t.to_rfc3339());
    let oldest = stats.oldest_update.map(|t| t.to_rfc3339());
    println!("  Files:  {}", stats.total_files);
    println!("  Bytes:  {}", stats.total_size);
    println!("  Newest: {}", newest.as_deref().unwrap_or("-"));
    println!("  Oldest: {}", oldest.as_deref().unwrap_or("-"));
    Ok(())
}

fn cmd_clean(root: &Path) -> Result<()> {
    let removed = govsnap_snapshot::clean_orphaned_metadata(root)?;
    if removed.is_empty() {
        println!("No orphaned sidecars under {}", root.display());
    } else {
        for path in &removed {
            println!("removed {}", path.display());
        }
        println!("{} orphaned sidecar(s) removed", removed.len());
    }
    Ok(())
}

fn cmd_show(file: &Path, json: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("cannot read {}", file.display()))?;
    let decoded = govsnap_provenance::decode(&content)?;

    let Some(meta) = decoded.metadata else {
        println!("{} has no provenance header", file.display());
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(());
    }

    // Re-encode to print the canonical header.
    print!("{}", govsnap_provenance::encode(&meta));
    println!("({} bytes of body)", decoded.body.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(dir: Option<PathBuf>) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => config_dir()?,
    };
    let path = init_config(&dir)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<i32> {
    let config = match resolve_config(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(EXIT_CONFIG);
        }
    };
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(0)
}
