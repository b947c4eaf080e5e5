//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use geoasset_core::{
    EnrichTableConfig, ProgressReporter, ReconcileOptions, build_index, enrich_table, reconcile,
};
use geoasset_runner::{CallbackClient, Redactor, RunnerSettings, StepRunner, WorkItem};
use geoasset_shared::{AppConfig, GeoAssetError, JobId, env_value, expand_home, load_config, load_config_from};
use geoasset_storage::Storage;
use geoasset_tiles::{BucketResolver, LocalBuckets, RasterUri, S3Buckets, S3Options};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// geoasset: build steps for spatial tables and tiled rasters.
#[derive(Parser)]
#[command(
    name = "geoasset",
    version,
    about = "Supervise pipeline steps, enrich spatial tables and reconcile tiled rasters.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.geoasset/geoasset.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

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
    /// Run a worker command and report its outcome to the status service.
    Run {
        /// Job identifier (defaults to the configured job id variable).
        #[arg(long)]
        job_id: Option<String>,

        /// Scratch directory for the command (defaults to <work_root>/<job_id>).
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Command and arguments to run.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Enrich a staging table into an enriched target table.
    Enrich {
        /// Staging table holding the source geometries.
        #[arg(long)]
        staging: String,

        /// Target table to merge into.
        #[arg(long)]
        target: String,

        /// Geometry column name in the target table.
        #[arg(long, default_value = "geom")]
        geometry_column: String,

        /// Synthesize point geometries from longitude/latitude first.
        #[arg(long)]
        points: bool,
    },

    /// Copy tiles the target raster lacks and update its indices.
    Reconcile {
        /// Source raster URI.
        #[arg(long)]
        source: String,

        /// Target raster URI.
        #[arg(long)]
        target: String,

        /// Sibling pixel meaning that also receives overlap/nonoverlap.
        #[arg(long)]
        companion: Option<String>,

        /// Maximum concurrent tile copies.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Build tiles.geojson and extent.geojson for a grid raster.
    Index {
        /// Raster URI.
        #[arg(long)]
        raster: String,
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
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "geoasset=info",
        1 => "geoasset=debug",
        _ => "geoasset=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            job_id,
            work_dir,
            command,
        } => cmd_run(config_path, job_id, work_dir, command).await,
        Command::Enrich {
            staging,
            target,
            geometry_column,
            points,
        } => cmd_enrich(config_path, staging, target, geometry_column, points).await,
        Command::Reconcile {
            source,
            target,
            companion,
            concurrency,
        } => cmd_reconcile(config_path, &source, &target, companion, concurrency).await,
        Command::Index { raster } => cmd_index(config_path, &raster).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path).await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    job_id: Option<String>,
    work_dir: Option<PathBuf>,
    command: Vec<String>,
) -> Result<ExitCode> {
    let config = resolve_config(config_path)?;

    let job_id = job_id
        .or_else(|| env_value(&config.callback.job_id_env))
        .map(JobId)
        .unwrap_or_else(JobId::generate);
    let work_dir = work_dir
        .unwrap_or_else(|| expand_home(&config.runner.work_root).join(job_id.as_str()));

    let callback = match (
        env_value(&config.callback.status_url_env),
        env_value(&config.callback.token_env),
    ) {
        (Some(url), Some(token)) => Some(CallbackClient::new(
            url,
            token,
            Duration::from_secs(config.callback.timeout_secs),
        )?),
        _ => {
            warn!(
                url_env = %config.callback.status_url_env,
                token_env = %config.callback.token_env,
                "status callback variables not set"
            );
            None
        }
    };

    let settings = RunnerSettings {
        detail_limit_bytes: config.runner.detail_limit_bytes,
        log_dir: expand_home(&config.runner.log_dir),
        redactor: Redactor::from_config(&config.runner.redact_variables, &config.runner.redact_patterns)?,
        callback,
    };

    info!(job_id = %job_id, "running step");
    let item = WorkItem {
        job_id,
        command,
        work_dir,
    };
    let report = StepRunner::new(settings).run(&item).await?;

    eprintln!("{}", report.change_log.message);
    Ok(ExitCode::from(report.process_exit_code()))
}

async fn cmd_enrich(
    config_path: Option<&Path>,
    staging: String,
    target: String,
    geometry_column: String,
    points: bool,
) -> Result<ExitCode> {
    let config = resolve_config(config_path)?;
    let db_path = expand_home(&config.database.path);
    let storage = Storage::open(&db_path).await?;

    let enrich_config = EnrichTableConfig {
        staging_table: staging,
        target_table: target,
        geometry_column,
        points,
    };

    let reporter = CliProgress::new();
    let result = enrich_table(&storage, &enrich_config, &reporter).await;
    reporter.finish();
    let result = result?;

    println!();
    println!("  Enrichment complete");
    println!("  Run:       {}", result.run_id);
    println!("  Rows:      {}", result.rows);
    if enrich_config.points {
        println!("  Points:    {}", result.points_synthesized);
    }
    println!("  Inserted:  {}", result.stats.inserted);
    println!("  Updated:   {}", result.stats.updated);
    println!("  Unchanged: {}", result.stats.unchanged);
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(ExitCode::SUCCESS)
}

async fn cmd_reconcile(
    config_path: Option<&Path>,
    source: &str,
    target: &str,
    companion: Option<String>,
    concurrency: Option<usize>,
) -> Result<ExitCode> {
    let config = resolve_config(config_path)?;
    let source = RasterUri::parse(source)?;
    let target = RasterUri::parse(target)?;

    let mut options = ReconcileOptions::new(source, target);
    options.companion_pixel_meaning = companion;
    options.concurrency = concurrency.unwrap_or(config.reconcile.concurrency);
    options.tile_extension = config.reconcile.tile_extension.clone();
    if options.concurrency == 0 {
        return Err(eyre!("concurrency must be at least 1"));
    }

    let reporter = CliProgress::new();
    let outcome = reconcile(bucket_resolver(&config), &options, &reporter).await;
    reporter.finish();
    let outcome = outcome?;

    println!("copied: {}", outcome.copied);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_index(config_path: Option<&Path>, raster: &str) -> Result<ExitCode> {
    let config = resolve_config(config_path)?;
    let raster = RasterUri::parse(raster)?;
    let resolver = bucket_resolver(&config);

    let reporter = CliProgress::new();
    let result = build_index(
        resolver.as_ref(),
        &raster,
        &config.reconcile.tile_extension,
        &reporter,
    )
    .await;
    reporter.finish();
    let result = result?;

    println!("tiles: {}", result.tiles);
    for uri in &result.written {
        println!("wrote: {uri}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Local directories when `local_root` is configured, S3 otherwise.
fn bucket_resolver(config: &AppConfig) -> Arc<dyn BucketResolver> {
    match &config.object_store.local_root {
        Some(root) => Arc::new(LocalBuckets::new(expand_home(root))),
        None => Arc::new(S3Buckets::new(S3Options {
            region: env_value(&config.object_store.region_env),
            endpoint: env_value(&config.object_store.endpoint_env),
        })),
    }
}

async fn cmd_config_init(config_path: Option<&Path>) -> Result<ExitCode> {
    let path = match config_path {
        Some(p) => {
            if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|e| GeoAssetError::io(dir, e))?;
            }
            let content = toml::to_string_pretty(&AppConfig::default())?;
            std::fs::write(p, content).map_err(|e| GeoAssetError::io(p, e))?;
            p.to_path_buf()
        }
        None => geoasset_shared::init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<ExitCode> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
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
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn tile_copied(&self, tile_id: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("Copying [{current}/{total}] {tile_id}"));
    }

    fn row_enriched(&self, id: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("Enriching [{current}/{total}] {id}"));
    }
}
