//! Shared engine state: stores, coordinator, scheduler and the message bus
//! wired together from an `EngineConfig`.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::Database;
use crate::engine::{ExecutionCoordinator, ExecutionQuery};
use crate::handlers;
use crate::scheduler::{
    ExceptionNotifier, HttpTaskMetadataLookup, StepScheduler, TaskAgentConnector, TaskAgentPool,
    TaskMetadataLookup,
};
use crate::store::{FsOutputStore, SqliteExecutionStore};
use crate::transport::{BusDispatchQueue, BusErrorChannel, MessageBus, RestProxyConnector};

pub struct EngineInner {
    pub config: EngineConfig,
    pub db: Database,
    pub store: Arc<SqliteExecutionStore>,
    pub outputs: Arc<FsOutputStore>,
    pub bus: MessageBus,
    pub coordinator: Arc<ExecutionCoordinator>,
    pub scheduler: Arc<StepScheduler>,
    pub notifier: ExceptionNotifier,
    pub query: ExecutionQuery,
}

pub type Engine = Arc<EngineInner>;

impl EngineInner {
    /// Engine talking to the task service over HTTP and to task agents
    /// through their REST proxies.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let lookup = Arc::new(HttpTaskMetadataLookup::new(
            &config.task_service_url,
            &config.task_agents_path,
        ));
        Self::with_collaborators(db, config, lookup, Arc::new(RestProxyConnector))
    }

    pub fn with_collaborators(
        db: Database,
        config: EngineConfig,
        lookup: Arc<dyn TaskMetadataLookup>,
        connector: Arc<dyn TaskAgentConnector>,
    ) -> Self {
        let store = Arc::new(SqliteExecutionStore::new(db.clone()));
        let outputs = Arc::new(FsOutputStore::new(&config.output_root));
        let bus = MessageBus::new(config.max_redeliveries);

        let queue = Arc::new(BusDispatchQueue::new(
            bus.clone(),
            config.topics.step_schedule.clone(),
        ));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            store.clone(),
            outputs.clone(),
            queue,
        ));

        let pool = TaskAgentPool::new(connector, config.client_id.clone());
        let scheduler = Arc::new(StepScheduler::new(lookup, pool));
        let notifier = ExceptionNotifier::new(Arc::new(BusErrorChannel::new(
            bus.clone(),
            config.topics.step_errors.clone(),
        )));

        Self {
            query: ExecutionQuery::new(store.clone(), outputs.clone()),
            config,
            db,
            store,
            outputs,
            bus,
            coordinator,
            scheduler,
            notifier,
        }
    }

    /// Subscribe the message handlers; the engine starts consuming.
    pub async fn start(&self) {
        handlers::register(
            &self.bus,
            &self.config.topics,
            self.coordinator.clone(),
            self.scheduler.clone(),
            self.notifier.clone(),
        )
        .await;
        tracing::info!(
            "[Engine] Consuming {}, {}, {}, {}",
            self.config.topics.executions,
            self.config.topics.step_answers,
            self.config.topics.step_errors,
            self.config.topics.step_schedule
        );
    }

    /// Drain in-flight messages and close task agent connections.
    pub async fn shutdown(&self) {
        self.bus.wait_idle().await;
        self.scheduler.pool().shutdown().await;
        tracing::info!("[Engine] Shut down");
    }
}
