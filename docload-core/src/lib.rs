//! Load generation engine
//!
//! Scenario runners partition generated documents across writer agents, run
//! writers, readers and updaters concurrently against a [`DataStore`] and wait
//! on a completion barrier that surfaces the first fatal agent error.
//!
//! [`DataStore`]: docload_interfaces::DataStore

pub mod agent;
pub mod barrier;
pub mod distributor;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod rate;
pub mod scenario;
pub mod throttle;
pub mod tracker;

pub use agent::{Agent, AgentRole};
pub use barrier::{CompletionBarrier, CompletionToken};
pub use distributor::{assign_channels_to_reader, channel_names, distribute, document_id};
pub use error::{AgentError, AgentErrorKind, EngineError, EngineResult};
pub use metrics::{
    FacadeMetrics, InMemoryMetrics, MetricKey, MetricStats, MetricsSink, MultiMetrics,
    NoopMetrics, SharedMetrics,
};
pub use policy::BatchErrorPolicy;
pub use rate::{next_delay, RateScheduler};
pub use scenario::{Scenario, ScenarioReport};
pub use throttle::ProvisioningThrottle;
pub use tracker::{select_ready, DocUpdateStatus, UpdateTracker};
