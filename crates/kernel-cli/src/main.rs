use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use contracts::RunConfig;
use kernel_api::{load_run_config, render_toml, EpisodeApi, ScriptedPolicy};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SQLITE_PATH: &str = "commons_runs.sqlite";

/// Drive and inspect single commons episodes
#[derive(Parser)]
#[command(name = "commons-cli")]
#[command(about = "Run the commons environment with a scripted policy", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug diagnostics (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one episode until every agent is terminated and persist its records
    Simulate {
        /// TOML or JSON run configuration
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long, env = "COMMONS_SQLITE_PATH", default_value = DEFAULT_SQLITE_PATH)]
        sqlite: PathBuf,
        /// Request this quantity every harvest instead of the threshold
        #[arg(long)]
        fixed_harvest: Option<u64>,
    },
    /// Load and validate a configuration file
    ValidateConfig { path: PathBuf },
    /// Print the default configuration as TOML
    DefaultConfig,
    /// Print stored records of a run as JSON lines
    ReplayLog {
        #[arg(long, env = "COMMONS_SQLITE_PATH", default_value = DEFAULT_SQLITE_PATH)]
        sqlite: PathBuf,
        #[arg(long)]
        run_id: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run_simulation(
    config_path: Option<&Path>,
    seed: Option<u64>,
    run_id: Option<String>,
    sqlite_path: &Path,
    fixed_harvest: Option<u64>,
) -> Result<(), String> {
    let mut config = match config_path {
        Some(path) => load_run_config(path).map_err(|err| err.to_string())?,
        None => RunConfig::default(),
    };
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(run_id) = run_id {
        config.run_id = run_id;
    }
    let run_id = config.run_id.clone();
    let seed = config.seed;

    let mut api = EpisodeApi::from_config(config).map_err(|err| err.to_string())?;
    api.attach_sqlite_store(sqlite_path)
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;
    api.initialize_run_storage(true)
        .map_err(|err| format!("failed to initialize run storage: {err}"))?;

    let policy = match fixed_harvest {
        Some(quantity) => ScriptedPolicy::with_fixed_harvest(quantity),
        None => ScriptedPolicy::new(),
    };
    info!(run_id = %run_id, seed, "simulating episode");
    let rounds = api
        .run_scripted_episode(&policy, None)
        .map_err(|err| format!("episode failed: {err}"))?;
    api.flush_persistence_checked()
        .map_err(|err| format!("failed to flush records: {err}"))?;
    if let Some(error) = api.last_persistence_error() {
        return Err(format!("persistence error after simulation: {error}"));
    }

    for round in &rounds {
        let suspended = round.suspended.iter().cloned().collect::<Vec<_>>().join(",");
        println!(
            "round={} harvested={} pool={} threshold={} suspended=[{}] terminated={}",
            round.round,
            round.harvested,
            round.pool_after_growth,
            round.threshold,
            suspended,
            round.terminated
        );
    }
    let rewards = api.environment().rewards();
    println!(
        "simulated run_id={} seed={} rounds={} total_harvested={} records={} sqlite={}",
        run_id,
        seed,
        rounds.len(),
        rewards.values().sum::<u64>(),
        api.records().len(),
        sqlite_path.display()
    );
    Ok(())
}

fn validate_config(path: &Path) -> Result<(), String> {
    let config = load_run_config(path).map_err(|err| err.to_string())?;
    println!(
        "valid config run_id={} agents={} pool={} strategy={} order={} max_rounds={}",
        config.run_id,
        config.num_agents,
        config.initial_resource_in_pool,
        config.assign_resource_strategy,
        config.harvesting_order,
        config.max_num_rounds
    );
    Ok(())
}

fn print_default_config() -> Result<(), String> {
    let rendered = render_toml(&RunConfig::default()).map_err(|err| err.to_string())?;
    print!("{rendered}");
    Ok(())
}

fn replay_log(sqlite_path: &Path, run_id: &str) -> Result<(), String> {
    let config = RunConfig {
        run_id: run_id.to_string(),
        ..RunConfig::default()
    };
    let mut api = EpisodeApi::from_config(config).map_err(|err| err.to_string())?;
    api.attach_sqlite_store(sqlite_path)
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;
    let summary = api
        .run_summary(run_id)
        .map_err(|err| err.to_string())?
        .ok_or_else(|| format!("run {run_id} not found in {}", sqlite_path.display()))?;
    info!(
        run_id = %summary.run_id,
        rounds = summary.rounds_completed,
        records = summary.record_count,
        "replaying stored run"
    );
    for record in api.load_records(run_id).map_err(|err| err.to_string())? {
        let line = serde_json::to_string(&record).map_err(|err| err.to_string())?;
        println!("{line}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Simulate {
            config,
            seed,
            run_id,
            sqlite,
            fixed_harvest,
        } => run_simulation(config.as_deref(), seed, run_id, &sqlite, fixed_harvest),
        Commands::ValidateConfig { path } => validate_config(&path),
        Commands::DefaultConfig => print_default_config(),
        Commands::ReplayLog { sqlite, run_id } => replay_log(&sqlite, &run_id),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
