use super::launch::Launch;
use super::{Scenario, ScenarioReport};
use crate::agent::notification_queues;
use crate::error::EngineResult;
use docload_config::ScenarioKind;
use docload_interfaces::DataStore;
use tokio::time::Instant;
use tracing::info;

impl<S> Scenario<S>
where
    S: DataStore + Clone + 'static,
{
    /// Writers, readers and updaters together on one barrier. Writers are
    /// spawned first; readers find documents through the changes feed as
    /// they land and updaters through insert notifications.
    pub(super) async fn run_gateload(&self) -> EngineResult<ScenarioReport> {
        let start = Instant::now();
        let roles = self.roles();
        let plan = self.plan()?;
        info!(
            session_id = %self.session_id,
            writers = self.config.num_writers,
            readers = self.config.num_readers,
            updaters = self.config.num_updaters,
            docs = self.config.num_docs,
            "starting gateload scenario"
        );

        let (notifier, receivers) = notification_queues(
            self.config.num_updaters,
            self.config.notification_queue_capacity,
        );
        let (writers, feeders) = self.writers(plan.assignment, &notifier, &roles.writers)?;
        drop(notifier);

        let readers = if self.config.num_readers > 0 {
            self.readers(&plan.channels, &roles.readers)?
        } else {
            Vec::new()
        };
        let updaters = self.updaters(&plan.channels, receivers, &roles.updaters)?;

        let mut launch = Launch::new();
        let writers = launch.arm(writers);
        let readers = launch.arm(readers);
        let updaters = launch.arm(updaters);
        launch.spawn(writers);
        launch.spawn_feeders(feeders);
        launch.spawn(readers);
        launch.spawn(updaters);
        let agents = launch.wait().await?;

        let report = self.report(ScenarioKind::Gateload, &roles, agents, start.elapsed());
        info!(
            written = report.docs_written,
            read = report.docs_read,
            updated = report.docs_updated,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "gateload scenario finished"
        );
        Ok(report)
    }
}
