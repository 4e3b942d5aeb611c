//! RUL-Sentinel - bearing remaining-useful-life monitoring
//!
//! # Usage
//!
//! ```bash
//! # Bulk run over a CSV export
//! rul-sentinel run --csv bearing1.csv --asset-id bearing-1
//!
//! # One prediction over the most recent 50 readings
//! rul-sentinel predict --csv bearing1.csv --asset-id bearing-1
//!
//! # HTTP API for uploads and polling
//! rul-sentinel serve --addr 0.0.0.0:8080
//!
//! # Validate a config file
//! rul-sentinel check-config --config rul_sentinel.toml --print
//! ```
//!
//! # Environment Variables
//!
//! - `RUL_SENTINEL_CONFIG`: Path to the TOML config file
//! - `RUL_SERVICE_URL`: Prediction service base URL
//! - `RUL_ASSET_ID`: Default asset id
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rul_sentinel::api::{create_app, ApiState};
use rul_sentinel::config::{self, ConfigProvenance, PipelineConfig, CONFIG_ENV_VAR, LOCAL_CONFIG_FILE};
use rul_sentinel::ingest::{parse_csv_path, FieldAliasTable};
use rul_sentinel::orchestrator::{BatchOrchestrator, OrchestratorSettings, RunPhase, RunRequest, RunSnapshot};
use rul_sentinel::prediction::{HttpPredictionClient, PredictionService, ProcessingMode};
use rul_sentinel::storage::{MemoryRecordStore, RecordStore, SledRecordStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "rul-sentinel")]
#[command(about = "Bearing RUL ingestion, batch prediction and alerting")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config file (otherwise ./rul_sentinel.toml, then defaults)
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Override the prediction service base URL
    #[arg(long, global = true, env = "RUL_SERVICE_URL")]
    service_url: Option<String>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Validate, window and batch-predict every sequence of a CSV file
    Run {
        /// CSV file with sensor readings
        #[arg(long)]
        csv: PathBuf,
        /// Subject (asset) id
        #[arg(long, env = "RUL_ASSET_ID")]
        asset_id: Option<String>,
        /// Sequences per bulk request
        #[arg(long)]
        batch_size: Option<usize>,
        /// Bulk endpoint: standard or fast
        #[arg(long)]
        mode: Option<ProcessingMode>,
        /// Print the final summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Predict once over the most recent 50 valid readings
    Predict {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, env = "RUL_ASSET_ID")]
        asset_id: Option<String>,
    },
    /// Serve the HTTP API
    Serve {
        /// Override the bind address
        #[arg(short, long)]
        addr: Option<String>,
    },
    /// Load and validate configuration, then exit
    CheckConfig {
        /// Print the effective configuration as TOML
        #[arg(long)]
        print: bool,
    },
}

// ============================================================================
// Startup helpers
// ============================================================================

/// Explicit path (flag or env) is strict; the search order is lenient.
fn load_config(path: Option<&Path>) -> Result<(PipelineConfig, ConfigProvenance)> {
    match path {
        Some(p) => PipelineConfig::load_from_file_with_provenance(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => Ok(PipelineConfig::load_with_provenance()),
    }
}

/// Log the thresholds in use. The two presets differ by orders of magnitude,
/// so an implicit choice is worth a warning.
fn log_threshold_scale(config: &PipelineConfig, provenance: &ConfigProvenance) {
    let t = config.alerts.thresholds();
    info!(
        scale = %config.alerts.scale,
        critical = t.critical,
        warning = t.warning,
        adjustment_factor = config.alerts.adjustment_factor,
        "Alert thresholds"
    );

    let explicit_scale = provenance.is_user_set("alerts.scale");
    let explicit_values = provenance.is_user_set("alerts.critical_threshold")
        && provenance.is_user_set("alerts.warning_threshold");
    if !explicit_scale && !explicit_values {
        warn!(
            "alerts.scale not set; using the '{}' preset ({} / {}). Set it to match the model's RUL units",
            config.alerts.scale, t.critical, t.warning
        );
    }
}

fn open_store(config: &PipelineConfig) -> Result<Arc<dyn RecordStore>> {
    if config.storage.enabled {
        if let Some(parent) = Path::new(&config.storage.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let store = SledRecordStore::open(&config.storage.path)
            .with_context(|| format!("Failed to open record store at {}", config.storage.path))?;
        Ok(Arc::new(store))
    } else {
        info!("Record store disabled; predictions kept in memory only");
        Ok(Arc::new(MemoryRecordStore::new()))
    }
}

fn build_orchestrator(config: &PipelineConfig, store: Arc<dyn RecordStore>) -> Result<BatchOrchestrator> {
    let client = HttpPredictionClient::from_config(&config.service)
        .context("Failed to configure prediction client")?;
    info!(url = %client.base_url(), timeout_secs = config.service.timeout_secs, "Prediction service");

    let aliases = FieldAliasTable::with_extra(config.extra_aliases());
    Ok(BatchOrchestrator::new(
        Arc::new(client),
        Arc::new(aliases),
        OrchestratorSettings::from(config),
    )
    .with_store(store))
}

/// Pre-flight check; never fatal.
async fn check_service(service: &Arc<dyn PredictionService>) {
    match service.health().await {
        Ok(status) => info!(status = %status, "Prediction service reachable"),
        Err(e) => warn!(error = %e, "Prediction service health check failed; continuing"),
    }
}

fn resolve_asset_id(cli: Option<String>, config: &PipelineConfig) -> String {
    cli.unwrap_or_else(|| config.subject.asset_id.clone())
}

fn shutdown_token() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, cancelling at the next batch boundary...");
        shutdown.cancel();
    });
    cancel_token
}

// ============================================================================
// Subcommands
// ============================================================================

async fn cmd_run(
    orchestrator: BatchOrchestrator,
    asset_id: String,
    csv: &Path,
    json: bool,
) -> Result<()> {
    let input = parse_csv_path(csv).with_context(|| format!("Failed to read {}", csv.display()))?;
    check_service(orchestrator.service()).await;

    let (tx, _rx) = watch::channel(RunSnapshot::default());
    let summary = orchestrator
        .run(RunRequest::new(asset_id, input), shutdown_token(), tx)
        .await
        .context("Run rejected")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
        for rejection in summary.rejections.iter().take(20) {
            println!("  rejected: {}", rejection.reason);
        }
        if summary.rejections.len() > 20 {
            println!("  ... and {} more rejected rows", summary.rejections.len() - 20);
        }
    }

    if let Some(store) = orchestrator.store() {
        if let Err(e) = store.flush() {
            warn!(error = %e, "Failed to flush record store");
        }
    }

    if summary.phase == RunPhase::Failed {
        anyhow::bail!("run failed: {}", summary.status_message);
    }
    Ok(())
}

async fn cmd_predict(orchestrator: BatchOrchestrator, asset_id: String, csv: &Path) -> Result<()> {
    let input = parse_csv_path(csv).with_context(|| format!("Failed to read {}", csv.display()))?;
    let prediction = orchestrator
        .predict_single(&asset_id, &input)
        .await
        .context("Single prediction failed")?;

    println!(
        "asset {}: predicted RUL {:.1} ({}) from rows {}..={}",
        prediction.asset_id,
        prediction.predicted_rul,
        prediction.severity,
        prediction.first_row,
        prediction.last_row
    );
    if let Some(alert) = &prediction.alert {
        println!("  {}", alert.message);
    }
    if let Some(store) = orchestrator.store() {
        if let Err(e) = store.flush() {
            warn!(error = %e, "Failed to flush record store");
        }
    }
    Ok(())
}

async fn cmd_serve(orchestrator: BatchOrchestrator, config: &PipelineConfig, addr: String) -> Result<()> {
    check_service(orchestrator.service()).await;

    let state = ApiState::new(orchestrator.clone()).with_default_asset(config.subject.asset_id.clone());
    let current_run = Arc::clone(&state.current_run);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("HTTP API listening on http://{}/api/v2", addr);

    let cancel_token = shutdown_token();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            if let Some(handle) = current_run.read().await.as_ref() {
                handle.cancel();
            }
            info!("[HttpServer] Received shutdown signal");
        })
        .await;

    if let Some(store) = orchestrator.store() {
        if let Err(e) = store.flush() {
            warn!(error = %e, "Failed to flush record store");
        }
    }

    match result {
        Ok(()) => {
            info!("[HttpServer] Graceful shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("[HttpServer] Server error: {}", e);
            Err(anyhow::anyhow!("HTTP server error: {}", e))
        }
    }
}

fn cmd_check_config(explicit: Option<&Path>, print: bool) -> Result<()> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    let path = explicit.map(Path::to_path_buf).or_else(|| local.exists().then_some(local));

    let (config, provenance) = match &path {
        Some(p) => {
            let loaded = PipelineConfig::load_from_file_with_provenance(p)
                .with_context(|| format!("Invalid config {}", p.display()))?;
            info!(path = %p.display(), keys = loaded.1.explicit_keys.len(), "Config is valid");
            loaded
        }
        None => {
            info!("No config file found; built-in defaults are valid");
            (PipelineConfig::default(), ConfigProvenance::default())
        }
    };
    log_threshold_scale(&config, &provenance);

    if print {
        println!("{}", config.to_toml()?);
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    if let SubCommand::CheckConfig { print } = &args.command {
        return cmd_check_config(args.config.as_deref(), *print);
    }

    let (mut pipeline_config, provenance) = load_config(args.config.as_deref())?;
    if let Some(url) = &args.service_url {
        pipeline_config.service.base_url.clone_from(url);
    }
    if let SubCommand::Run { batch_size, mode, .. } = &args.command {
        if let Some(b) = batch_size {
            pipeline_config.batch.batch_size = *b;
        }
        if let Some(m) = mode {
            pipeline_config.service.mode = *m;
        }
    }
    pipeline_config.validate().context("Invalid configuration")?;

    log_threshold_scale(&pipeline_config, &provenance);
    config::init(pipeline_config, provenance);
    let cfg = config::get();

    let store = open_store(cfg)?;
    let orchestrator = build_orchestrator(cfg, store)?;

    match args.command {
        SubCommand::Run { csv, asset_id, json, .. } => {
            cmd_run(orchestrator, resolve_asset_id(asset_id, cfg), &csv, json).await
        }
        SubCommand::Predict { csv, asset_id } => {
            cmd_predict(orchestrator, resolve_asset_id(asset_id, cfg), &csv).await
        }
        SubCommand::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| cfg.server.addr.clone());
            cmd_serve(orchestrator, cfg, addr).await
        }
        SubCommand::CheckConfig { .. } => Ok(()),
    }
}
