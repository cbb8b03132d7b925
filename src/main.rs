//! Event Transformation Engine
//!
//! Batch pipeline over date-partitioned raw event exports:
//! - Canonicalization with field alias resolution and acquisition context
//! - Inactivity-gap sessionization per client
//! - Transaction deduplication into orders
//! - First-click and last-click attribution
//! - Reconciliation reports proving nothing was lost between stages

use anyhow::{Context, Result};
use tracing::{info, warn};

use engine_core::EngineConfig;
use pipeline::Pipeline;
use telemetry::init_tracing_from_env;
use warehouse::{PartitionReader, TableWriter, WarehouseConfig};

/// Application configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    warehouse: WarehouseConfig,

    #[serde(default)]
    engine: EngineConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Event Transformation Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        input_dir = %config.warehouse.input_dir.display(),
        output_dir = %config.warehouse.output_dir.display(),
        reports_dir = %config.warehouse.reports_dir.display(),
        session_timeout_secs = config.engine.session_timeout_secs,
        lookback_days = config.engine.lookback_days,
        "Loaded configuration"
    );

    let pipeline = Pipeline::new(config.engine.clone()).context("Invalid engine configuration")?;

    let input = PartitionReader::new(&config.warehouse.input_dir)
        .load()
        .await
        .context("Failed to load input partitions")?;

    // CPU-bound stages stay off the async workers
    let output = tokio::task::spawn_blocking(move || pipeline.run(input))
        .await
        .context("Pipeline task failed")?;

    let published = TableWriter::from_config(&config.warehouse)
        .publish(&output)
        .await
        .context("Failed to publish artifacts")?;

    for artifact in &published {
        info!(path = %artifact.path.display(), rows = artifact.rows, bytes = artifact.bytes, "Artifact written");
    }

    if output.report.is_consistent() {
        info!(
            events = output.events.len(),
            sessions = output.sessions.len(),
            orders = output.orders.len(),
            "Run complete, all reconciliation checks passed"
        );
    } else {
        warn!(
            warnings = output.report.warnings().len(),
            "Run complete with reconciliation warnings, see reconciliation.md"
        );
    }

    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables, e.g. TRANSFORM_ENGINE__LOOKBACK_DAYS
        .add_source(
            config::Environment::with_prefix("TRANSFORM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("engine.non_touchpoint_sources")
                .with_list_parse_key("engine.internal_domains"),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat overrides for the directories most runs change
    if let Ok(dir) = std::env::var("TRANSFORM_INPUT_DIR") {
        config.warehouse.input_dir = dir.into();
    }
    if let Ok(dir) = std::env::var("TRANSFORM_OUTPUT_DIR") {
        config.warehouse.output_dir = dir.into();
    }
    if let Ok(dir) = std::env::var("TRANSFORM_REPORTS_DIR") {
        config.warehouse.reports_dir = dir.into();
    }

    Ok(config)
}
