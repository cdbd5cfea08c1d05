//! Step scheduling: task contract validation and dispatch to task agents.

pub mod agent_pool;
pub mod notifier;
pub mod step_scheduler;
pub mod task_lookup;

pub use agent_pool::{ConnectionConfig, TaskAgentConnection, TaskAgentConnector, TaskAgentPool};
pub use notifier::{ErrorChannel, ExceptionNotifier};
pub use step_scheduler::StepScheduler;
pub use task_lookup::{HttpTaskMetadataLookup, TaskMetadataLookup};
