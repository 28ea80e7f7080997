use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fsbc::adapters;
use fsbc::config::AppConfig;
use fsbc::context::AppContext;
use fsbc::core::hasher::{self, HashAlgorithm};
use fsbc::core::transfer_engine::CopyEngineType;
use fsbc::core::{Orchestrator, SelectionSet, SystemInfo, sizing};
use fsbc::logging::{self, LogConfig, RunLog};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fsbc")]
#[command(about = "Forensic Sparsebundle Creator", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the filesystem-backed container driver instead of hdiutil
    #[arg(long, global = true)]
    simulation: bool,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the selection into a new encrypted sparsebundle and verify it
    Collect(CollectArgs),
    /// Print the container size a selection would need
    Estimate { paths: Vec<PathBuf> },
    /// Print file digests
    Hash {
        #[arg(long)]
        algorithm: Option<HashAlgorithm>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the system information recorded in reports
    Sysinfo,
}

impl Commands {
    /// Only evidence runs write a log file
    fn keeps_run_log(&self) -> bool {
        matches!(self, Self::Collect(_))
    }
}

#[derive(Args)]
struct CollectArgs {
    /// Directory the sparsebundle is created in
    #[arg(long)]
    destination: PathBuf,

    #[arg(long)]
    hash_algorithm: Option<HashAlgorithm>,

    #[arg(long)]
    copy_engine: Option<CopyEngineType>,

    #[arg(long)]
    mount_point: Option<PathBuf>,

    /// Files and folders to collect
    paths: Vec<PathBuf>,
}

/// CLI values layered over the config file and environment
#[derive(Serialize, Default)]
struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    simulation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    json_logs: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    hash_algorithm: Option<HashAlgorithm>,

    #[serde(skip_serializing_if = "Option::is_none")]
    copy_engine: Option<CopyEngineType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    mount_point: Option<PathBuf>,
}

impl ConfigOverrides {
    fn from_cli(cli: &Cli) -> Self {
        let mut overrides = Self {
            simulation: cli.simulation.then_some(true),
            verbose: cli.verbose.then_some(true),
            json_logs: cli.json_logs.then_some(true),
            ..Default::default()
        };

        match &cli.command {
            Commands::Collect(args) => {
                overrides.hash_algorithm = args.hash_algorithm;
                overrides.copy_engine = args.copy_engine;
                overrides.mount_point = args.mount_point.clone();
            }
            Commands::Hash { algorithm, .. } => overrides.hash_algorithm = *algorithm,
            _ => {}
        }
        overrides
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::new(cli.config.as_deref(), Some(&ConfigOverrides::from_cli(&cli)))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_config = LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
    };
    let run_log = if cli.command.keeps_run_log() {
        logging::init(log_config, &config.log_directory).map(|l| Some(Arc::new(l)))
    } else {
        logging::init_console(log_config).map(|_| None)
    };
    let run_log = match run_log {
        Ok(run_log) => run_log,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match run(cli.command, config, run_log.clone()).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };

    if let Some(run_log) = &run_log {
        run_log.finish(code == 0);
    }
    ExitCode::from(code)
}

async fn run(command: Commands, config: AppConfig, run_log: Option<Arc<RunLog>>) -> Result<u8> {
    match command {
        Commands::Collect(args) => run_collect(args, config, run_log).await,
        Commands::Estimate { paths } => run_estimate(paths, &config).await,
        Commands::Hash { files, .. } => run_hash(files, config.hash_algorithm).await,
        Commands::Sysinfo => run_sysinfo().await,
    }
}

async fn run_collect(
    args: CollectArgs,
    config: AppConfig,
    run_log: Option<Arc<RunLog>>,
) -> Result<u8> {
    let driver = adapters::get_driver(config.simulation).context("Platform check failed")?;
    info!(driver = driver.name(), "Volume driver selected");

    let selection = SelectionSet::new(&args.paths).context("Failed to resolve selected paths")?;
    let mut ctx = AppContext::new(config, Arc::from(driver));
    if let Some(run_log) = run_log {
        ctx = ctx.with_run_log(run_log);
    }

    let summary = Orchestrator::new(ctx)
        .run(&selection, &args.destination)
        .await?;

    println!("Sparsebundle: {}", summary.container_path.display());
    println!(
        "Records: {} ({} failed)",
        summary.hash_log.len(),
        summary.hash_log.failure_count()
    );
    if let Some(report) = &summary.report {
        println!("Report: {}", report.json.display());
    }

    Ok(summary.exit_code())
}

async fn run_estimate(paths: Vec<PathBuf>, config: &AppConfig) -> Result<u8> {
    let selection = SelectionSet::new(&paths).context("Failed to resolve selected paths")?;
    let estimate = sizing::estimate_async(&selection, &config.size_policy()).await?;

    println!("Total bytes: {}", estimate.total_bytes);
    println!("Container size: {} MB", estimate.size_mb);
    Ok(0)
}

async fn run_hash(files: Vec<PathBuf>, algorithm: HashAlgorithm) -> Result<u8> {
    let mut code = 0;
    for file in &files {
        match hasher::digest_file(file, algorithm).await {
            Ok(hex) => println!("{}  {}", hex, file.display()),
            // Already logged by the hasher
            Err(_) => code = 1,
        }
    }
    Ok(code)
}

async fn run_sysinfo() -> Result<u8> {
    let info = SystemInfo::collect().await;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn test_only_collect_keeps_a_run_log() {
        assert!(
            parse(&["fsbc", "collect", "--destination", "/cases", "/evidence/a.txt"])
                .command
                .keeps_run_log()
        );
        assert!(!parse(&["fsbc", "estimate", "/evidence"]).command.keeps_run_log());
        assert!(!parse(&["fsbc", "hash", "/evidence/a.txt"]).command.keeps_run_log());
        assert!(!parse(&["fsbc", "sysinfo"]).command.keeps_run_log());
    }

    #[test]
    fn test_collect_flags_become_overrides() {
        let cli = parse(&[
            "fsbc",
            "--simulation",
            "collect",
            "--destination",
            "/cases",
            "--hash-algorithm",
            "blake3",
            "/evidence/a.txt",
        ]);
        let overrides = ConfigOverrides::from_cli(&cli);

        assert_eq!(overrides.simulation, Some(true));
        assert_eq!(overrides.verbose, None);
        assert_eq!(overrides.hash_algorithm, Some(HashAlgorithm::Blake3));
    }
}
