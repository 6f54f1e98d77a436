use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tokio::runtime::Runtime;

use rust_carver::cli::{Args, Commands};
use rust_carver::config::{load_config, CarverConfig};
use rust_carver::dispatch::Dispatcher;
use rust_carver::models::CarveStatus;
use rust_carver::store::{list_records, load_record, FileStore};

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.verbose)?;

    match &args.command {
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            CarverConfig::create_default_config_file(path)?;
            info!("Configuration created successfully");
            Ok(())
        }
        Commands::Status { guid } => show_status(&args, guid.as_deref()),
        Commands::Carve {
            patterns,
            request_id,
        } => carve(&args, patterns, request_id.as_deref()),
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

/// Load the configuration file and apply command-line overrides
fn effective_config(args: &Args) -> Result<CarverConfig> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn carve(args: &Args, patterns: &[String], request_id: Option<&str>) -> Result<()> {
    let config = effective_config(args)?;
    let store_path = config.store_path.clone();
    let runtime = Runtime::new().context("Failed to create Tokio runtime")?;

    let (guid, status) = runtime.block_on(async {
        let dispatcher = Dispatcher::from_config(config).context("Failed to set up carver")?;
        let ticket = match request_id {
            Some(request_id) => dispatcher.carve_paths_for_request(patterns, request_id),
            None => dispatcher.carve_paths(patterns),
        }
        .context("Failed to schedule carve")?;

        info!("Started carve {}", ticket.guid);
        let guid = ticket.guid.clone();
        let status = ticket.wait().await?;
        Ok::<_, anyhow::Error>((guid, status))
    })?;

    let store = FileStore::open(&store_path)?;
    let record = load_record(&store, &guid)?
        .ok_or_else(|| anyhow!("Carve {} has no stored record", guid))?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    if status == CarveStatus::Succeeded {
        info!("Carve {} completed successfully", guid);
        Ok(())
    } else {
        Err(anyhow!(
            "Carve {} finished as {}: {}",
            guid,
            status,
            record.error.unwrap_or_default()
        ))
    }
}

fn show_status(args: &Args, guid: Option<&str>) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let store = FileStore::open(&config.store_path)
        .with_context(|| format!("Failed to open carve store {}", config.store_path.display()))?;

    let json = match guid {
        Some(guid) => {
            let record = load_record(&store, guid)?
                .ok_or_else(|| anyhow!("No carve with GUID {}", guid))?;
            serde_json::to_string_pretty(&record)?
        }
        None => serde_json::to_string_pretty(&list_records(&store)?)?,
    };
    println!("{}", json);
    Ok(())
}
