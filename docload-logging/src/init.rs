use anyhow::{Context, Result};
use docload_config::{LogFormat, LogTarget, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Keeps file writers flushing until dropped
#[must_use = "dropping the guard stops file logging"]
#[derive(Default)]
pub struct LoggingGuard {
    workers: Vec<WorkerGuard>,
}

impl LoggingGuard {
    /// Number of file targets being written in the background
    pub fn file_targets(&self) -> usize {
        self.workers.len()
    }
}

/// Initialize logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<LoggingGuard> {
    // Plain console output needs no layering
    if config.targets.is_empty()
        || (config.targets == [LogTarget::Console] && config.format == LogFormat::Text && !config.include_location)
    {
        init_simple_tracing(&config.level.to_string())?;
        return Ok(LoggingGuard::default());
    }

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(config.targets.len());
    let mut workers = Vec::new();

    for target in &config.targets {
        match target {
            LogTarget::Console => {
                layers.push(format_layer(
                    config.format,
                    std::io::stderr,
                    true,
                    config.include_location,
                ));
            }
            LogTarget::File {
                directory,
                file_prefix,
            } => {
                let appender = RollingFileAppender::builder()
                    .rotation(Rotation::DAILY)
                    .filename_prefix(file_prefix)
                    .build(directory)
                    .with_context(|| format!("Failed to open log directory {}", directory))?;
                let (writer, guard) = tracing_appender::non_blocking(appender);
                workers.push(guard);
                layers.push(format_layer(
                    config.format,
                    writer,
                    false,
                    config.include_location,
                ));
            }
        }
    }

    // Use try_init to avoid panic if global subscriber already set
    if tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(&config.level.to_string()))
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(LoggingGuard { workers })
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool, location: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(location)
        .with_line_number(location);

    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Text => layer.boxed(),
    }
}
