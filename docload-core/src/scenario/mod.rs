//! Scenario runners
//!
//! A [`Scenario`] owns the run-wide pieces: the prototype store handle every
//! agent clones, the validated configuration, the session id, the metrics sink
//! and the provisioning throttle. Each scenario kind lives in its own module
//! and composes the same phases:
//!
//! - `write`: writers fed by per-writer feeders
//! - `read`: a nested write, then readers following the changes feed
//! - `update`: updaters launched first, then a write phase feeding them
//! - `gateload`: writers, readers and updaters on one barrier

mod gateload;
mod launch;
mod read;
mod update;
mod write;

use crate::agent::{
    AgentIdentity, AgentRole, AgentShared, DocumentFeeder, Notification, Reader, UpdateNotifier,
    Updater, Writer,
};
use crate::distributor::{
    assign_channels_to_reader, channel_names, distribute, expected_for_channels, share, Assignment,
};
use crate::error::EngineResult;
use crate::metrics::SharedMetrics;
use crate::policy::BatchErrorPolicy;
use crate::throttle::ProvisioningThrottle;
use docload_config::{ScenarioConfig, ScenarioKind, UserCredConfig};
use docload_interfaces::{DataStore, UserCred};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;

const PASSWORD_LEN: usize = 16;

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    pub kind: ScenarioKind,
    pub session_id: String,
    /// Agents that ran to completion, across all phases
    pub agents: usize,
    pub docs_written: usize,
    pub docs_read: usize,
    pub docs_updated: usize,
    pub elapsed: Duration,
}

/// Channel names and the documents dealt to each writer
struct Plan {
    channels: Vec<String>,
    assignment: Assignment,
}

/// Per-role shared resources of one run
struct Roles {
    writers: AgentShared,
    readers: AgentShared,
    updaters: AgentShared,
}

/// Runs load scenarios against a data store
pub struct Scenario<S> {
    store: S,
    config: ScenarioConfig,
    session_id: String,
    metrics: SharedMetrics,
    policy: BatchErrorPolicy,
    throttle: ProvisioningThrottle,
    password: String,
}

impl<S> Scenario<S>
where
    S: DataStore + Clone + 'static,
{
    /// `store` is the prototype handle cloned for every agent
    pub fn new(
        store: S,
        config: ScenarioConfig,
        session_id: impl Into<String>,
        metrics: SharedMetrics,
    ) -> Self {
        let policy = BatchErrorPolicy::from_config(&config.batch_error_policy);
        let throttle = ProvisioningThrottle::new(config.max_concurrent_create_user);
        let password = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LEN)
            .map(char::from)
            .collect();

        Self {
            store,
            config,
            session_id: session_id.into(),
            metrics,
            policy,
            throttle,
            password,
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run the given scenario kind to completion
    pub async fn run(&self, kind: ScenarioKind) -> EngineResult<ScenarioReport> {
        self.config.validate_for(kind)?;
        match kind {
            ScenarioKind::Write => self.run_write().await,
            ScenarioKind::Read => self.run_read().await,
            ScenarioKind::Update => self.run_update().await,
            ScenarioKind::Gateload => self.run_gateload().await,
        }
    }

    fn plan(&self) -> EngineResult<Plan> {
        let channels = channel_names(self.config.num_channels, &self.session_id);
        let assignment = distribute(
            self.config.num_writers,
            &channels,
            self.config.num_docs,
            self.config.doc_size_bytes,
            &self.session_id,
        )?;
        Ok(Plan {
            channels,
            assignment,
        })
    }

    fn roles(&self) -> Roles {
        let shared = |create: bool| {
            AgentShared::new(self.metrics.clone())
                .with_policy(self.policy.clone())
                .with_throttle(create.then(|| self.throttle.clone()))
                .with_delay(self.config.delay_between_ops_ms)
        };
        Roles {
            writers: shared(self.config.create_writers),
            readers: shared(self.config.create_readers),
            updaters: shared(self.config.create_updaters),
        }
    }

    /// Generated `{role}-{index}-{session}` users, or the configured ones
    /// when user creation is disabled
    fn credentials(&self, role: AgentRole, count: usize, create: bool, supplied: &[UserCredConfig]) -> Vec<UserCred> {
        if create {
            (0..count)
                .map(|i| {
                    UserCred::new(
                        format!("{}-{}-{}", role, i, self.session_id),
                        self.password.clone(),
                    )
                })
                .collect()
        } else {
            supplied.iter().cloned().map(UserCred::from).collect()
        }
    }

    fn identity(
        &self,
        role: AgentRole,
        id: usize,
        cred: UserCred,
        shared: &AgentShared,
    ) -> EngineResult<AgentIdentity<S>> {
        Ok(AgentIdentity::new(
            role,
            id,
            cred,
            self.store.clone(),
            self.config.batch_size,
            shared.clone(),
        )?)
    }

    fn writers(
        &self,
        assignment: Assignment,
        notifier: &UpdateNotifier,
        shared: &AgentShared,
    ) -> EngineResult<(Vec<Writer<S>>, Vec<DocumentFeeder>)> {
        let creds = self.credentials(
            AgentRole::Writer,
            assignment.len(),
            self.config.create_writers,
            &self.config.writer_creds,
        );

        let mut writers = Vec::with_capacity(assignment.len());
        let mut feeders = Vec::with_capacity(assignment.len());
        for (id, (docs, cred)) in assignment.into_iter().zip(creds).enumerate() {
            let channels: Vec<String> = docs
                .iter()
                .flat_map(|doc| doc.channels())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let expected = docs.len();
            let (feeder, batches) = DocumentFeeder::new(docs, self.config.batch_size);

            let identity = self.identity(AgentRole::Writer, id, cred, shared)?;
            writers.push(Writer::new(identity, channels, expected, batches, notifier.clone()));
            feeders.push(feeder);
        }
        Ok((writers, feeders))
    }

    fn readers(&self, channels: &[String], shared: &AgentShared) -> EngineResult<Vec<Reader<S>>> {
        let creds = self.credentials(
            AgentRole::Reader,
            self.config.num_readers,
            self.config.create_readers,
            &self.config.reader_creds,
        );

        creds
            .into_iter()
            .enumerate()
            .map(|(id, cred)| -> EngineResult<Reader<S>> {
                // An unfiltered feed still needs a grant for every channel
                let (followed, grants, expected) = match self.config.num_chans_per_reader {
                    0 => (Vec::new(), channels.to_vec(), self.config.num_docs),
                    k => {
                        let picked = assign_channels_to_reader(k, channels);
                        let expected = expected_for_channels(self.config.num_docs, channels, &picked);
                        (picked.clone(), picked, expected)
                    }
                };
                let identity = self.identity(AgentRole::Reader, id, cred, shared)?;
                Ok(Reader::new(identity, followed, self.config.feed_type, expected)
                    .with_grants(grants)
                    .with_limit(self.config.changes_limit)
                    .with_fetch_docs(self.config.reader_fetch_docs))
            })
            .collect()
    }

    fn updaters(
        &self,
        channels: &[String],
        receivers: Vec<mpsc::Receiver<Notification>>,
        shared: &AgentShared,
    ) -> EngineResult<Vec<Updater<S>>> {
        let count = receivers.len();
        let creds = self.credentials(
            AgentRole::Updater,
            count,
            self.config.create_updaters,
            &self.config.updater_creds,
        );

        receivers
            .into_iter()
            .zip(creds)
            .enumerate()
            .map(|(id, (receiver, cred))| -> EngineResult<Updater<S>> {
                let identity = self.identity(AgentRole::Updater, id, cred, shared)?;
                Ok(Updater::new(
                    identity,
                    channels.to_vec(),
                    receiver,
                    share(self.config.num_docs, count, id),
                    self.config.num_updates_per_doc,
                    self.config.num_revs_per_update,
                ))
            })
            .collect()
    }

    fn report(&self, kind: ScenarioKind, roles: &Roles, agents: usize, elapsed: Duration) -> ScenarioReport {
        ScenarioReport {
            kind,
            session_id: self.session_id.clone(),
            agents,
            docs_written: roles.writers.completed(),
            docs_read: roles.readers.completed(),
            docs_updated: roles.updaters.completed(),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::error::EngineError;
    use crate::metrics::NoopMetrics;
    use docload_interfaces::testing::InMemoryDataStore;
    use std::sync::Arc;

    fn scenario(config: ScenarioConfig) -> Scenario<InMemoryDataStore> {
        Scenario::new(InMemoryDataStore::new(), config, "sess", Arc::new(NoopMetrics))
    }

    #[test]
    fn test_generated_credentials_follow_naming() {
        let scenario = scenario(ScenarioConfig::default());
        let creds = scenario.credentials(AgentRole::Reader, 2, true, &[]);
        assert_eq!(creds[0].username, "reader-0-sess");
        assert_eq!(creds[1].username, "reader-1-sess");
        assert_eq!(creds[0].password.len(), PASSWORD_LEN);
        assert_eq!(creds[0].password, creds[1].password);
    }

    #[test]
    fn test_supplied_credentials_used_when_creation_disabled() {
        let scenario = scenario(ScenarioConfig::default());
        let supplied = vec![UserCredConfig {
            username: "alice".to_string(),
            password: "secret".to_string(),
        }];
        let creds = scenario.credentials(AgentRole::Writer, 1, false, &supplied);
        assert_eq!(creds, vec![UserCred::new("alice", "secret")]);
    }

    #[test]
    fn test_reader_expectations_cover_followed_channels() {
        let config = ScenarioConfig {
            num_readers: 3,
            num_channels: 4,
            num_docs: 10,
            num_chans_per_reader: 2,
            ..Default::default()
        };
        let scenario = scenario(config);
        let roles = scenario.roles();
        let channels = channel_names(4, "sess");

        for reader in scenario.readers(&channels, &roles.readers).unwrap() {
            assert_eq!(reader.role(), AgentRole::Reader);
            // Channels 0 and 1 hold 3 documents, 2 and 3 hold 2
            assert!((4..=6).contains(&reader.expected()));
        }
    }

    #[test]
    fn test_unfiltered_readers_expect_everything() {
        let config = ScenarioConfig {
            num_readers: 1,
            num_docs: 12,
            num_chans_per_reader: 0,
            ..Default::default()
        };
        let scenario = scenario(config);
        let roles = scenario.roles();
        let readers = scenario
            .readers(&channel_names(10, "sess"), &roles.readers)
            .unwrap();
        assert_eq!(readers[0].expected(), 12);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_call() {
        let store = InMemoryDataStore::new();
        let config = ScenarioConfig {
            num_channels: 20,
            num_docs: 10,
            ..Default::default()
        };
        let scenario = Scenario::new(store.clone(), config, "sess", Arc::new(NoopMetrics));

        let err = scenario.run(ScenarioKind::Write).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(store.calls(), Default::default());
    }
}
