use anyhow::{Context, Result};
use clap::Parser;
use perfcache::cache_store::CacheStore;
use perfcache::cli::{Cli, Command, InspectArgs, OutputFormat, ProfileArgs};
use perfcache::config::ProfileConfig;
use perfcache::instrumentation::ExecutionContext;
use perfcache::report;
use perfcache::session::ProfileSession;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `--debug` raises the level to TRACE
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<ProfileConfig> {
    match &cli.config {
        Some(path) => Ok(ProfileConfig::from_file(path)?),
        None => Ok(ProfileConfig::default()),
    }
}

/// Run one profiling session; session failures map to a non-zero exit code
fn run_profile(mut config: ProfileConfig, args: ProfileArgs) -> Result<ExitCode> {
    if !args.runner.is_empty() {
        config.runner = args.runner;
    }
    if let Some(cache) = args.cache {
        config.cache_path = cache;
    }
    if args.all_units {
        config.scope_to_target = false;
    }
    if config.runner.is_empty() {
        anyhow::bail!("No instrumentation runner configured. Pass --runner or set `runner` in the config file.");
    }

    let context = ExecutionContext::new().with_args(args.args);
    let mut session = ProfileSession::from_config(&config, context)?;

    match session.run(&args.target, &config.cache_path) {
        Ok(profile) => {
            match args.format {
                OutputFormat::Text => print!("{}", report::render_text(&profile)),
                OutputFormat::Json => println!("{}", report::render_json(&profile)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("error: {}", err);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_inspect(config: ProfileConfig, args: InspectArgs) -> Result<ExitCode> {
    let path = args.cache.unwrap_or(config.cache_path);
    let store = CacheStore::load(&path).with_context(|| format!("StorageError: cannot inspect {}", path.display()))?;

    match args.format {
        OutputFormat::Text => print!("{}", report::render_cache_text(&store, args.function.as_deref())),
        OutputFormat::Json => println!("{}", report::render_cache_json(&store, args.function.as_deref())?),
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(cli.debug);

    let config = load_config(&cli)?;

    match cli.command {
        Command::Profile(args) => run_profile(config, args),
        Command::Inspect(args) => run_inspect(config, args),
    }
}
