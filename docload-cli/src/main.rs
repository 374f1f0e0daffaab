use anyhow::{bail, Context, Result};
use clap::Parser;
use docload_config::{
    BatchErrorPolicyConfig, ConfigLoader, DocloadConfig, MetricsConfig, ScenarioKind,
};
use docload_core::{
    FacadeMetrics, InMemoryMetrics, MultiMetrics, Scenario, ScenarioReport,
    SharedMetrics,
};
use docload_http::{HttpDataStore, HttpStoreConfig};
use docload_logging::{init_logging_from_config, LoggingGuard};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

mod cli;
use cli::{parse_log_level, Cli, Commands, ConfigCommands, Overrides};

/// Load configuration from file or environment, then apply CLI overrides
fn load_config(config_path: Option<&PathBuf>, overrides: &Overrides) -> Result<DocloadConfig> {
    let loader = ConfigLoader::new();

    let mut config = match config_path {
        Some(path) => {
            if path.exists() {
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))?
            } else {
                bail!("Configuration file not found: {:?}", path);
            }
        }
        None => loader
            .from_env()
            .context("Failed to load configuration from environment")?,
    };

    overrides.apply(&mut config);
    config
        .validate_all()
        .context("Invalid configuration after command line overrides")?;
    Ok(config)
}

fn init_logging(config: &DocloadConfig, log_level: Option<&String>) -> Result<LoggingGuard> {
    let mut logging = config.logging.clone();
    if let Some(level) = parse_log_level(log_level) {
        logging.level = level;
    }
    init_logging_from_config(&logging).context("Failed to initialize logging")
}

/// Install the push gateway exporter when enabled
///
/// The in-memory sink is always attached so the run summary has numbers to show.
fn init_metrics(config: &MetricsConfig, summary: Arc<InMemoryMetrics>) -> Result<SharedMetrics> {
    if !config.enabled {
        debug!("Metrics export disabled");
        return Ok(summary as SharedMetrics);
    }

    PrometheusBuilder::new()
        .with_push_gateway(config.endpoint.as_str(), config.push_interval, None, None)
        .context("Invalid push gateway configuration")?
        .install()
        .context("Failed to install metrics exporter")?;

    info!(
        endpoint = %config.endpoint,
        interval_secs = config.push_interval.as_secs(),
        "Pushing metrics"
    );

    let facade: SharedMetrics = Arc::new(FacadeMetrics::new(config.prefix.clone()));
    Ok(Arc::new(MultiMetrics::new(vec![facade, summary as SharedMetrics])) as SharedMetrics)
}

async fn run_scenario(config: DocloadConfig, kind: ScenarioKind) -> Result<()> {
    let session_id = config.session_id_or_generate();
    let summary = Arc::new(InMemoryMetrics::new());
    let metrics = init_metrics(&config.metrics, summary.clone())?;

    let store = HttpDataStore::new(HttpStoreConfig::from(config.datastore.clone()))
        .context("Failed to create data store client")?;

    info!(
        scenario = %kind,
        session_id = %session_id,
        url = %config.datastore.url,
        writers = config.scenario.num_writers,
        readers = config.scenario.num_readers,
        updaters = config.scenario.num_updaters,
        docs = config.scenario.num_docs,
        "Starting run"
    );

    let scenario = Scenario::new(store, config.scenario, session_id, metrics);
    let report = scenario
        .run(kind)
        .await
        .context(format!("{} scenario failed", kind))?;

    print_summary(&report, &summary);
    Ok(())
}

fn print_summary(report: &ScenarioReport, summary: &InMemoryMetrics) {
    info!(
        scenario = %report.kind,
        session_id = %report.session_id,
        agents = report.agents,
        docs_written = report.docs_written,
        docs_read = report.docs_read,
        docs_updated = report.docs_updated,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Run complete"
    );

    println!(
        "{} run {} finished in {:.2}s: {} agents, {} written, {} read, {} updated",
        report.kind,
        report.session_id,
        report.elapsed.as_secs_f64(),
        report.agents,
        report.docs_written,
        report.docs_read,
        report.docs_updated
    );

    for (key, stats) in summary.snapshot() {
        match stats.mean_latency() {
            Some(mean) => println!(
                "  {:<28} calls={:<8} mean={:>9.2}ms max={:>9.2}ms",
                key.to_string(),
                stats.calls,
                mean.as_secs_f64() * 1000.0,
                stats.max_latency.as_secs_f64() * 1000.0
            ),
            None => println!("  {:<28} count={}", key.to_string(), stats.count),
        }
    }
}

fn handle_config_validate(config_file: &Path) -> Result<()> {
    ConfigLoader::new()
        .from_file(config_file)
        .context(format!("Configuration {:?} is invalid", config_file))?;
    println!("Configuration {:?} is valid", config_file);
    Ok(())
}

fn handle_config_sample(output: Option<&PathBuf>, force: bool) -> Result<()> {
    let sample = DocloadConfig::generate_sample();
    match output {
        Some(path) => {
            if path.exists() && !force {
                bail!("{:?} already exists, use --force to overwrite", path);
            }
            fs::write(path, sample).context(format!("Failed to write {:?}", path))?;
            println!("Sample configuration written to {:?}", path);
        }
        None => print!("{}", sample),
    }
    Ok(())
}

fn handle_config_show(config: &DocloadConfig, format: &str) -> Result<()> {
    let rendered = match format {
        "yaml" => serde_yaml::to_string(config).context("Failed to render configuration")?,
        "json" => serde_json::to_string_pretty(config).context("Failed to render configuration")?,
        other => bail!("Unknown format {:?}, expected yaml or json", other),
    };
    println!("{}", rendered);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        let mut cmd = Cli::command();
        cmd.print_help().context("Failed to print help")?;
        println!();
        return Ok(());
    };

    // Config subcommands that do not need a loaded configuration
    if let Commands::Config { config_cmd } = command {
        match config_cmd {
            ConfigCommands::Validate { config_file } => return handle_config_validate(config_file),
            ConfigCommands::Sample { output, force } => {
                return handle_config_sample(output.as_ref(), *force)
            }
            ConfigCommands::Show { .. } => {}
        }
    }

    let config = load_config(cli.config.as_ref(), &cli.overrides)?;

    let kind = match command {
        Commands::Config {
            config_cmd: ConfigCommands::Show { format },
        } => return handle_config_show(&config, format),
        other => match other.scenario() {
            Some(kind) => kind,
            None => return Ok(()),
        },
    };

    let _guard = init_logging(&config, cli.log_level.as_ref())?;
    if config.scenario.batch_error_policy == BatchErrorPolicyConfig::Skip
        && config.scenario.num_readers > 0
        && matches!(kind, ScenarioKind::Read | ScenarioKind::Gateload)
    {
        warn!("Skip policy with readers: a skipped write batch leaves readers waiting forever");
    }

    let result = run_scenario(config, kind).await;
    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "Run failed");
    }
    result
}
