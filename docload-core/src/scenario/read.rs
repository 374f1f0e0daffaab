use super::launch::Launch;
use super::{Scenario, ScenarioReport};
use crate::agent::UpdateNotifier;
use crate::error::EngineResult;
use docload_config::ScenarioKind;
use docload_interfaces::DataStore;
use tokio::time::Instant;
use tracing::info;

impl<S> Scenario<S>
where
    S: DataStore + Clone + 'static,
{
    pub(super) async fn run_read(&self) -> EngineResult<ScenarioReport> {
        let start = Instant::now();
        let roles = self.roles();
        let plan = self.plan()?;

        // Readers count documents that must already exist
        let written = self
            .write_phase(plan.assignment, &UpdateNotifier::disabled(), &roles.writers)
            .await?;
        info!(
            session_id = %self.session_id,
            readers = self.config.num_readers,
            feed = %self.config.feed_type,
            chans_per_reader = self.config.num_chans_per_reader,
            "documents written, starting readers"
        );

        let readers = self.readers(&plan.channels, &roles.readers)?;
        let mut launch = Launch::new();
        let readers = launch.arm(readers);
        launch.spawn(readers);
        let read = launch.wait().await?;

        let report = self.report(ScenarioKind::Read, &roles, written + read, start.elapsed());
        info!(
            written = report.docs_written,
            read = report.docs_read,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "read scenario finished"
        );
        Ok(report)
    }
}
