//! Scenario configuration
//!
//! The scenario domain is the immutable description of one load run: how many
//! agents of each role, how much data, and how the traffic is paced. It is
//! validated once, before any concurrent work starts, and is read-only after.

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which traffic shape a run drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    /// Writers only
    Write,
    /// Writers first, then readers following the changes feed
    Read,
    /// Writers feeding updaters through insert notifications
    Update,
    /// Writers, readers and updaters running together
    Gateload,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioKind::Write => write!(f, "write"),
            ScenarioKind::Read => write!(f, "read"),
            ScenarioKind::Update => write!(f, "update"),
            ScenarioKind::Gateload => write!(f, "gateload"),
        }
    }
}

/// Changes feed mode used by readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Normal,
    #[default]
    Longpoll,
}

impl FeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Normal => "normal",
            FeedType::Longpoll => "longpoll",
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(FeedType::Normal),
            "longpoll" => Ok(FeedType::Longpoll),
            _ => Err(format!("Invalid feed type: {}", s)),
        }
    }
}

/// Pre-existing user credentials, used when user creation is disabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredConfig {
    pub username: String,
    pub password: String,
}

/// What the scenario runner does when a steady-state batch call fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum BatchErrorPolicyConfig {
    /// First failed batch is fatal
    Abort,
    /// Log the failure and move on to the next batch
    Skip,
    /// Retry with exponential backoff, abort once attempts are exhausted
    Retry {
        #[serde(default = "default_retry_attempts")]
        max_attempts: u32,
        #[serde(
            with = "crate::domains::utils::serde_duration_ms",
            default = "default_retry_initial_delay"
        )]
        initial_delay_ms: Duration,
        #[serde(
            with = "crate::domains::utils::serde_duration_ms",
            default = "default_retry_max_delay"
        )]
        max_delay_ms: Duration,
    },
}

impl Default for BatchErrorPolicyConfig {
    fn default() -> Self {
        BatchErrorPolicyConfig::Retry {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_retry_initial_delay(),
            max_delay_ms: default_retry_max_delay(),
        }
    }
}

/// Scenario configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Number of concurrent writer agents
    pub num_writers: usize,

    /// Number of concurrent reader agents
    pub num_readers: usize,

    /// Number of concurrent updater agents
    pub num_updaters: usize,

    /// Number of distinct channels documents are spread across
    pub num_channels: usize,

    /// Total number of documents to generate
    pub num_docs: usize,

    /// Approximate size of each document body in bytes
    pub doc_size_bytes: usize,

    /// Documents per bulk call (1 = unbatched)
    pub batch_size: usize,

    /// Think time between consecutive operations of one agent
    #[serde(with = "crate::domains::utils::serde_duration_ms")]
    pub delay_between_ops_ms: Duration,

    /// Changes feed mode
    pub feed_type: FeedType,

    /// Channels each reader subscribes to (0 = all channels, unfiltered)
    pub num_chans_per_reader: usize,

    /// `limit` parameter of each changes request
    pub changes_limit: usize,

    /// Whether readers bulk-fetch the revisions they observe
    pub reader_fetch_docs: bool,

    pub create_writers: bool,
    pub create_readers: bool,
    pub create_updaters: bool,

    pub writer_creds: Vec<UserCredConfig>,
    pub reader_creds: Vec<UserCredConfig>,
    pub updater_creds: Vec<UserCredConfig>,

    /// Revisions pushed per document in each update
    pub num_revs_per_update: usize,

    /// Updates applied to each document before an updater is done with it
    pub num_updates_per_doc: usize,

    /// Maximum simultaneous create-user calls across all agents
    pub max_concurrent_create_user: usize,

    /// Capacity of each writer->updater notification queue
    pub notification_queue_capacity: usize,

    /// Handling of failed steady-state batch calls
    pub batch_error_policy: BatchErrorPolicyConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            num_writers: 10,
            num_readers: 10,
            num_updaters: 10,
            num_channels: 10,
            num_docs: 1000,
            doc_size_bytes: 1024,
            batch_size: 1,
            delay_between_ops_ms: Duration::ZERO,
            feed_type: FeedType::default(),
            num_chans_per_reader: 1,
            changes_limit: 100,
            reader_fetch_docs: true,
            create_writers: true,
            create_readers: true,
            create_updaters: true,
            writer_creds: Vec::new(),
            reader_creds: Vec::new(),
            updater_creds: Vec::new(),
            num_revs_per_update: 1,
            num_updates_per_doc: 1,
            max_concurrent_create_user: 100,
            notification_queue_capacity: 1024,
            batch_error_policy: BatchErrorPolicyConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Validate the settings a particular scenario kind depends on.
    ///
    /// `validate` covers everything that must hold regardless of the kind;
    /// this adds the per-role agent counts and credential lists.
    pub fn validate_for(&self, kind: ScenarioKind) -> ConfigResult<()> {
        self.validate()?;

        let (writers, readers, updaters) = match kind {
            ScenarioKind::Write => (true, false, false),
            ScenarioKind::Read => (true, true, false),
            ScenarioKind::Update => (true, false, true),
            ScenarioKind::Gateload => (true, self.num_readers > 0, self.num_updaters > 0),
        };

        if writers {
            validate_positive(self.num_writers, "num_writers", self.domain_name())?;
            self.validate_creds("writer", self.num_writers, self.create_writers, &self.writer_creds)?;
        }
        if readers {
            validate_positive(self.num_readers, "num_readers", self.domain_name())?;
            self.validate_creds("reader", self.num_readers, self.create_readers, &self.reader_creds)?;
        }
        if updaters {
            validate_positive(self.num_updaters, "num_updaters", self.domain_name())?;
            self.validate_creds(
                "updater",
                self.num_updaters,
                self.create_updaters,
                &self.updater_creds,
            )?;
        }

        Ok(())
    }

    fn validate_creds(
        &self,
        role: &str,
        agents: usize,
        create: bool,
        creds: &[UserCredConfig],
    ) -> ConfigResult<()> {
        if create {
            return Ok(());
        }
        if creds.len() != agents {
            return Err(self.validation_error(format!(
                "{} user creation is disabled but {} credentials were supplied for {} {}s",
                role,
                creds.len(),
                agents,
                role
            )));
        }
        for cred in creds {
            validate_required_string(&cred.username, "username", self.domain_name())?;
            validate_required_string(&cred.password, "password", self.domain_name())?;
        }
        Ok(())
    }
}

impl Validatable for ScenarioConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();

        validate_positive(self.num_docs, "num_docs", domain)?;
        validate_positive(self.num_channels, "num_channels", domain)?;
        validate_positive(self.doc_size_bytes, "doc_size_bytes", domain)?;
        validate_positive(self.batch_size, "batch_size", domain)?;
        validate_positive(self.changes_limit, "changes_limit", domain)?;
        validate_positive(self.num_revs_per_update, "num_revs_per_update", domain)?;
        validate_positive(self.num_updates_per_doc, "num_updates_per_doc", domain)?;
        validate_positive(
            self.max_concurrent_create_user,
            "max_concurrent_create_user",
            domain,
        )?;
        validate_positive(
            self.notification_queue_capacity,
            "notification_queue_capacity",
            domain,
        )?;

        if self.num_channels > self.num_docs {
            return Err(self.validation_error(format!(
                "num_channels ({}) cannot exceed num_docs ({})",
                self.num_channels, self.num_docs
            )));
        }

        if self.num_chans_per_reader > self.num_channels {
            return Err(self.validation_error(format!(
                "num_chans_per_reader ({}) cannot exceed num_channels ({})",
                self.num_chans_per_reader, self.num_channels
            )));
        }

        if let BatchErrorPolicyConfig::Retry { max_attempts, .. } = &self.batch_error_policy {
            if *max_attempts == 0 {
                return Err(ConfigError::ValidationError(
                    "batch_error_policy.max_attempts must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "scenario"
    }
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_retry_max_delay() -> Duration {
    Duration::from_secs(5)
}
