use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gw2_achievements::app::{App, default_output_path};
use gw2_achievements::config::ConfigLoader;
use gw2_achievements::error::TrackerError;
use gw2_achievements::gw2::{DEFAULT_BASE_URL, Gw2HttpClient};
use gw2_achievements::output::{ConsoleOutput, JsonOutput, OutputMode};
use gw2_achievements::store::SnapshotStore;
use gw2_achievements::xlsx::XlsxReportWriter;

#[derive(Parser)]
#[command(name = "gw2-achievements")]
#[command(about = "Track Guild Wars 2 achievement progress for several accounts in one spreadsheet")]
#[command(version, author)]
struct Cli {
    /// Print results as JSON instead of console summaries.
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    cache: CacheArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone)]
struct CacheArgs {
    /// Directory holding the cached catalog snapshot.
    #[arg(long, global = true)]
    cache_dir: Option<Utf8PathBuf>,

    /// Also write an uncompressed snapshot.json next to the cache.
    #[arg(long, global = true)]
    debug_dump: bool,

    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    api_url: String,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Sync the catalog and write the achievements spreadsheet (default)")]
    Report(ReportArgs),
    #[command(name = "sync", about = "Sync the cached catalog with the current game build")]
    SyncCatalog,
    #[command(about = "Show what is cached")]
    Info,
    #[command(about = "Delete the cached catalog")]
    Clear,
}

#[derive(Args, Clone, Default)]
struct ReportArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long, short)]
    output: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<TrackerError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TrackerError) -> u8 {
    if error.is_config() {
        2
    } else if error.is_remote() {
        3
    } else {
        1
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };

    let store = build_store(&cli.cache)?;
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Report(ReportArgs::default()));

    match command {
        Commands::Report(args) => run_report(args, &cli.cache, store, output_mode),
        Commands::SyncCatalog => {
            let app = App::new(build_client(&cli.cache)?, store);
            match output_mode {
                OutputMode::Json => {
                    let result = app.sync(&JsonOutput)?;
                    JsonOutput::print_sync(&result).into_diagnostic()
                }
                OutputMode::Console => {
                    let result = app.sync(&ConsoleOutput)?;
                    ConsoleOutput::print_sync(&result);
                    Ok(())
                }
            }
        }
        Commands::Info => {
            let app = App::offline(store);
            match output_mode {
                OutputMode::Json => {
                    let result = app.info(&JsonOutput)?;
                    JsonOutput::print_info(&result).into_diagnostic()
                }
                OutputMode::Console => {
                    let result = app.info(&ConsoleOutput)?;
                    ConsoleOutput::print_info(&result);
                    Ok(())
                }
            }
        }
        Commands::Clear => {
            let app = App::offline(store);
            match output_mode {
                OutputMode::Json => {
                    let result = app.clear(&JsonOutput)?;
                    JsonOutput::print_clear(&result).into_diagnostic()
                }
                OutputMode::Console => {
                    let result = app.clear(&ConsoleOutput)?;
                    ConsoleOutput::print_clear(&result);
                    Ok(())
                }
            }
        }
    }
}

fn run_report(
    args: ReportArgs,
    cache: &CacheArgs,
    store: SnapshotStore,
    output_mode: OutputMode,
) -> miette::Result<()> {
    // config problems must surface before any request is made
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let output = args.output.unwrap_or_else(default_output_path);

    let client = build_client(cache)?;
    let accounts = client.clone();
    let app = App::new(client, store);
    let writer = XlsxReportWriter::new();

    match output_mode {
        OutputMode::Json => {
            let result = app.report(&config, &accounts, &writer, &output, &JsonOutput)?;
            JsonOutput::print_report(&result).into_diagnostic()
        }
        OutputMode::Console => {
            let result = app.report(&config, &accounts, &writer, &output, &ConsoleOutput)?;
            ConsoleOutput::print_report(&result);
            Ok(())
        }
    }
}

fn build_store(cache: &CacheArgs) -> miette::Result<SnapshotStore> {
    let store = match &cache.cache_dir {
        Some(dir) => SnapshotStore::new_with_root(dir.clone()),
        None => SnapshotStore::new()?,
    };
    Ok(store.with_debug_dump(cache.debug_dump))
}

fn build_client(cache: &CacheArgs) -> miette::Result<Gw2HttpClient> {
    Ok(Gw2HttpClient::with_base_url(cache.api_url.as_str())?)
}
