//! CLI argument parsing definitions

use clap::{Args, Parser, Subcommand};
use docload_config::{DocloadConfig, LogLevel, ScenarioKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Settings that take precedence over the file and environment
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Session identifier scoping user and channel names
    #[arg(long, value_name = "ID", global = true)]
    pub session_id: Option<String>,

    /// Public database endpoint
    #[arg(long, value_name = "URL", global = true)]
    pub url: Option<String>,

    /// Admin database endpoint
    #[arg(long, value_name = "URL", global = true)]
    pub admin_url: Option<String>,

    /// Total number of documents to write
    #[arg(long, value_name = "N", global = true)]
    pub num_docs: Option<usize>,

    /// Documents per insert, update or read call
    #[arg(long, value_name = "N", global = true)]
    pub batch_size: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, config: &mut DocloadConfig) {
        if let Some(session_id) = &self.session_id {
            config.session_id = Some(session_id.clone());
        }
        if let Some(url) = &self.url {
            config.datastore.url = url.clone();
        }
        if let Some(admin_url) = &self.admin_url {
            config.datastore.admin_url = admin_url.clone();
        }
        if let Some(num_docs) = self.num_docs {
            config.scenario.num_docs = num_docs;
        }
        if let Some(batch_size) = self.batch_size {
            config.scenario.batch_size = batch_size;
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Insert documents with the configured writers
    Write,

    /// Insert documents, then follow the changes feed with readers
    Read,

    /// Insert documents and push new revisions to them with updaters
    Update,

    /// Run writers, readers and updaters concurrently
    Gateload,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

impl Commands {
    /// Scenario driven by this command, if any
    pub fn scenario(&self) -> Option<ScenarioKind> {
        match self {
            Commands::Write => Some(ScenarioKind::Write),
            Commands::Read => Some(ScenarioKind::Read),
            Commands::Update => Some(ScenarioKind::Update),
            Commands::Gateload => Some(ScenarioKind::Gateload),
            Commands::Config { .. } => None,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Print or write a sample configuration
    Sample {
        /// Output file path, stdout when omitted
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration after env and CLI overrides
    Show {
        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}

/// Parse `--log-level`, ignoring values that are not a level
pub fn parse_log_level(value: Option<&String>) -> Option<LogLevel> {
    value.and_then(|level| level.parse().ok())
}
