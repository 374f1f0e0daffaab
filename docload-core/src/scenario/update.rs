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
    /// Updaters start first so writers always have someone to notify; the
    /// write phase and the updaters are then awaited together and the first
    /// failure of either ends the run.
    pub(super) async fn run_update(&self) -> EngineResult<ScenarioReport> {
        let start = Instant::now();
        let roles = self.roles();
        let plan = self.plan()?;
        info!(
            session_id = %self.session_id,
            updaters = self.config.num_updaters,
            updates_per_doc = self.config.num_updates_per_doc,
            revs_per_update = self.config.num_revs_per_update,
            "starting update scenario"
        );

        let (notifier, receivers) = notification_queues(
            self.config.num_updaters,
            self.config.notification_queue_capacity,
        );
        let updaters = self.updaters(&plan.channels, receivers, &roles.updaters)?;

        let mut launch = Launch::new();
        let updaters = launch.arm(updaters);
        launch.spawn(updaters);

        let (written, updated) = tokio::try_join!(
            self.write_phase(plan.assignment, &notifier, &roles.writers),
            launch.wait()
        )?;

        let report = self.report(ScenarioKind::Update, &roles, written + updated, start.elapsed());
        info!(
            written = report.docs_written,
            updated = report.docs_updated,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "update scenario finished"
        );
        Ok(report)
    }
}
