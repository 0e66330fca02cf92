pub mod aggregate;
pub mod cli;
pub mod config;
pub mod data;
pub mod derive;
pub mod error;
pub mod io_utils;
pub mod join;
pub mod pipeline;
pub mod plugin;
pub mod schema;
pub mod storage;
pub mod table;
pub mod transform;
pub mod versioning;

use std::{env, fs::OpenOptions, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, error, info};

use crate::{
    cli::Cli,
    config::{ProcessConfig, split_process},
    pipeline::Pipeline,
};

static LOGGER: OnceLock<()> = OnceLock::new();

/// Initialises `env_logger` once per process; later calls are no-ops.
///
/// With `log_path`, records are appended to that file instead of stderr.
pub fn init_logging(log_path: Option<&Path>) -> Result<()> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let target = match log_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Opening log file {path:?}"))?;
            Some(env_logger::Target::Pipe(Box::new(file)))
        }
        None => None,
    };
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("etl_data", LevelFilter::Info);
        }
        if let Some(target) = target {
            builder.target(target);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref())?;
    info!("Entering EtlData utility");
    match execute(&cli) {
        Ok(()) => {
            info!("Leaving EtlData utility");
            Ok(())
        }
        Err(err) => {
            error!("{err:#}");
            error!("Leaving EtlData utility incomplete with errors");
            Err(err)
        }
    }
}

fn execute(cli: &Cli) -> Result<()> {
    let (name, kind) = split_process(&cli.process)?;
    let config_path = cli.config_dir.join(format!("{name}.json"));
    debug!("Loading {kind} configuration from {config_path:?}");
    let config = ProcessConfig::load(&config_path)
        .with_context(|| format!("Loading process '{}'", cli.process))?;

    let args = cli.to_arg_map();
    config.validate_args(&args)?;
    let section = config.feature(kind)?;

    let table = Pipeline::default().run(kind, &args, &section)?;
    info!(
        "Process '{}' finished; final table has {} row(s) and {} column(s)",
        cli.process,
        table.row_count(),
        table.columns().len()
    );
    Ok(())
}
