use super::launch::Launch;
use super::{Scenario, ScenarioReport};
use crate::agent::{AgentShared, UpdateNotifier};
use crate::distributor::Assignment;
use crate::error::EngineResult;
use docload_config::ScenarioKind;
use docload_interfaces::DataStore;
use tokio::time::Instant;
use tracing::info;

impl<S> Scenario<S>
where
    S: DataStore + Clone + 'static,
{
    pub(super) async fn run_write(&self) -> EngineResult<ScenarioReport> {
        let start = Instant::now();
        let roles = self.roles();
        let plan = self.plan()?;
        info!(
            session_id = %self.session_id,
            writers = self.config.num_writers,
            docs = self.config.num_docs,
            channels = plan.channels.len(),
            batch_size = self.config.batch_size,
            "starting write scenario"
        );

        let agents = self
            .write_phase(plan.assignment, &UpdateNotifier::disabled(), &roles.writers)
            .await?;

        let report = self.report(ScenarioKind::Write, &roles, agents, start.elapsed());
        info!(written = report.docs_written, elapsed_ms = report.elapsed.as_millis() as u64, "write scenario finished");
        Ok(report)
    }

    /// Launch one writer and one feeder per assignment entry and wait for all
    /// writers
    pub(super) async fn write_phase(
        &self,
        assignment: Assignment,
        notifier: &UpdateNotifier,
        shared: &AgentShared,
    ) -> EngineResult<usize> {
        let (writers, feeders) = self.writers(assignment, notifier, shared)?;

        let mut launch = Launch::new();
        let writers = launch.arm(writers);
        launch.spawn(writers);
        launch.spawn_feeders(feeders);
        launch.wait().await
    }
}
