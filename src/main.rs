use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glacier_extract::catalog::{join, CatalogIndex};
use glacier_extract::config::{template, RunConfig};
use glacier_extract::drive::{DriveFolders, FolderDirectory};
use glacier_extract::extraction_log::ExtractionLog;
use glacier_extract::imagery::{Dispatcher, EarthEngineExports, StacCatalog};
use glacier_extract::pipeline::{Pipeline, RunSettings};
use glacier_extract::s3::{S3Object, S3Store};
use glacier_extract::session::Session;

/// Export Landsat scenes and elevation rasters for glaciers to Google Drive
#[derive(Parser, Debug)]
#[command(name = "glacier-extract", version)]
struct Cli {
    /// Run configuration
    #[arg(short, long, default_value = "config/all-params.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline for every configured identifier
    All,

    /// Print one catalog record as JSON
    Query { id: String },

    /// Build the joined dataset from glacier outlines and inventory points
    Join {
        /// GeoJSON outlines, one feature per observation
        #[arg(long)]
        outlines: PathBuf,
        /// Inventory CSV with LATITUDE, LONGITUDE and PRIM_CLASSIFIC columns
        #[arg(long)]
        points: PathBuf,
        #[arg(long, default_value = "data/joined/joined.geojson")]
        output: PathBuf,
        #[arg(long, default_value = "glac_id")]
        id_column: String,
    },

    /// Write a configuration template
    Template {
        #[arg(long, default_value = "config/all-params.toml")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn read_config(path: &Path) -> Result<RunConfig> {
    RunConfig::read(path).with_context(|| format!("reading {}", path.display()))
}

async fn load_catalog(config: &RunConfig) -> Result<CatalogIndex> {
    let catalog = if S3Object::is_s3_url(&config.catalog.dataset) {
        let object = S3Object::from_url(&config.catalog.dataset)?;
        let region = object.client_region(config.endpoints.aws_region.as_deref());
        let store = match &config.endpoints.aws_profile {
            Some(profile) => S3Store::from_profile(profile, region).await,
            None => S3Store::anonymous(region).await,
        };
        CatalogIndex::fetch(&store, &config.catalog).await?
    } else {
        CatalogIndex::read(&config.data_dir, &config.catalog)?
    };
    Ok(catalog)
}

async fn run_all(config: &RunConfig) -> Result<()> {
    if config.endpoints.project.is_empty() {
        bail!("endpoints.project must name the Earth Engine cloud project");
    }
    // Authenticate before touching any glacier
    let session = Session::from_token_file(&config.token_path)?;

    let ids = config.identifier_source().load()?;
    let catalog = load_catalog(config).await?.subset(&ids);
    log::info!(
        "{} of {} identifiers found in the catalog",
        catalog.len(),
        ids.len()
    );

    let directory = FolderDirectory::new(DriveFolders::new(&session, &config.endpoints.drive)?);
    let dispatcher = Dispatcher::new(
        StacCatalog::new(session.http(), &config.endpoints.stac_search)?,
        EarthEngineExports::new(
            &session,
            &config.endpoints.earth_engine,
            &config.endpoints.project,
        )?,
        config.endpoints.collection.as_str(),
    );
    let extraction_log = ExtractionLog::new(&config.log_path);
    let pipeline = Pipeline::new(
        &catalog,
        &directory,
        &dispatcher,
        &extraction_log,
        RunSettings::from_config(config)?,
    );

    let summary = pipeline.run(&ids).await?;
    for outcome in summary.failed() {
        let reason = outcome
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        log::warn!("{} stopped at {}: {}", outcome.id, outcome.state, reason);
    }
    log::info!("Rows appended to {}", extraction_log.path().display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::All => {
            let config = read_config(&cli.config)?;
            run_all(&config).await?;
        }

        Command::Query { id } => {
            let config = read_config(&cli.config)?;
            let record = load_catalog(&config).await?.query(&id)?;
            println!("{}", serde_json::to_string_pretty(&record.to_json())?);
        }

        Command::Join {
            outlines,
            points,
            output,
            id_column,
        } => {
            let count = join::build_joined(&outlines, &points, &output, &id_column)?;
            log::info!("Joined {count} glaciers");
        }

        Command::Template { output } => {
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            RunConfig::from_template(&template())?.write(&output)?;
            log::info!("Template written to {}", output.display());
        }
    }

    Ok(())
}
