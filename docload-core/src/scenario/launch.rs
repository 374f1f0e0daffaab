use crate::agent::{Agent, DocumentFeeder};
use crate::barrier::{CompletionBarrier, CompletionToken};
use crate::error::{AgentError, AgentErrorKind, EngineResult};
use tokio::task::JoinSet;

/// A set of agents sharing one completion barrier.
///
/// Agents are registered with [`Launch::arm`] before any is spawned. Dropping
/// the launch aborts whatever is still running, which is how a fatal error in
/// one agent stops the rest.
pub(crate) struct Launch {
    barrier: CompletionBarrier,
    tasks: JoinSet<()>,
}

impl Launch {
    pub(crate) fn new() -> Self {
        Self {
            barrier: CompletionBarrier::new(),
            tasks: JoinSet::new(),
        }
    }

    pub(crate) fn arm<A: Agent>(&self, agents: Vec<A>) -> Vec<(A, CompletionToken)> {
        agents
            .into_iter()
            .map(|agent| {
                let token = self.barrier.register(agent.role(), agent.id());
                (agent, token)
            })
            .collect()
    }

    pub(crate) fn spawn<A: Agent>(&mut self, armed: Vec<(A, CompletionToken)>) {
        for (mut agent, token) in armed {
            self.tasks.spawn(async move {
                match agent.run().await {
                    Ok(()) if agent.is_done() => token.complete(),
                    Ok(()) => token.fail(AgentError::new(
                        agent.role(),
                        agent.id(),
                        "run",
                        AgentErrorKind::Incomplete,
                    )),
                    Err(error) => token.fail(error),
                }
            });
        }
    }

    pub(crate) fn spawn_feeders(&mut self, feeders: Vec<DocumentFeeder>) {
        for feeder in feeders {
            self.tasks.spawn(feeder.run());
        }
    }

    /// Wait for every armed agent, aborting the rest on the first failure
    pub(crate) async fn wait(mut self) -> EngineResult<usize> {
        let result = self.barrier.wait().await;
        if result.is_err() {
            self.tasks.abort_all();
        }
        Ok(result?)
    }
}
