//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both the CLI and
//! the internal API. Services are generic over repository and bus traits;
//! AppState pins the repositories to the SQLite implementations and leaves
//! the bus chosen by configuration.

use std::path::PathBuf;
use std::sync::Arc;

use roompurge_core::bus::{MessageBus, ROOM_PURGE_DURABLE, ROOM_PURGE_TOPIC};
use roompurge_core::service::{BackgroundTasks, ForgetService, PurgeConsumer, PurgeSweeper};
use roompurge_infra::sqlite::account_data::SqliteAccountDataRepository;
use roompurge_infra::sqlite::membership::SqliteMembershipRepository;
use roompurge_infra::sqlite::pool::DatabasePool;
use roompurge_types::config::ServiceConfig;
use tokio_util::sync::CancellationToken;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteForgetService<B> = ForgetService<SqliteMembershipRepository, B>;

pub type ConcretePurgeConsumer = PurgeConsumer<SqliteAccountDataRepository>;

pub type ConcretePurgeSweeper<B> = PurgeSweeper<SqliteMembershipRepository, B>;

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState<B> {
    pub config: Arc<ServiceConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    pub memberships: Arc<SqliteMembershipRepository>,
    pub account_data: Arc<SqliteAccountDataRepository>,
    pub bus: Arc<B>,
    pub forget_service: Arc<ConcreteForgetService<B>>,
    pub purge_consumer: Arc<ConcretePurgeConsumer>,
    /// Detached work started by requests (purge publication).
    pub tasks: BackgroundTasks,
    /// Cancelled once the process is shutting down.
    pub shutdown: CancellationToken,
}

impl<B> AppState<B>
where
    B: MessageBus + 'static,
{
    /// Wire services over an open database and a bus.
    pub fn new(data_dir: PathBuf, config: ServiceConfig, db_pool: DatabasePool, bus: B) -> Self {
        let shutdown = CancellationToken::new();
        let tasks = BackgroundTasks::new(&shutdown);

        let memberships = Arc::new(SqliteMembershipRepository::new(db_pool.clone()));
        let account_data = Arc::new(SqliteAccountDataRepository::new(db_pool.clone()));
        let bus = Arc::new(bus);

        let forget_service = ForgetService::new(
            Arc::clone(&memberships),
            Arc::clone(&bus),
            config.bus.topic_for(ROOM_PURGE_TOPIC),
            config.roomserver.clone(),
            tasks.clone(),
        );
        let purge_consumer =
            PurgeConsumer::new(Arc::clone(&account_data), config.server_name.clone());

        Self {
            config: Arc::new(config),
            data_dir,
            db_pool,
            memberships,
            account_data,
            bus,
            forget_service: Arc::new(forget_service),
            purge_consumer: Arc::new(purge_consumer),
            tasks,
            shutdown,
        }
    }

    /// Fully-qualified purge topic.
    pub fn purge_topic(&self) -> String {
        self.config.bus.topic_for(ROOM_PURGE_TOPIC)
    }

    /// Fully-qualified durable name of the purge consumer.
    pub fn purge_durable(&self) -> String {
        self.config.bus.durable(ROOM_PURGE_DURABLE)
    }

    /// The missed-purge sweeper, if purging and the sweep are both enabled.
    pub fn sweeper(&self) -> Option<(ConcretePurgeSweeper<B>, std::time::Duration)> {
        if !self.config.roomserver.purge_on_last_member {
            return None;
        }
        let interval = self.config.roomserver.sweep_interval()?;
        let sweeper = PurgeSweeper::new(
            Arc::clone(&self.memberships),
            Arc::clone(&self.bus),
            self.purge_topic(),
        );
        Some((sweeper, interval))
    }
}
