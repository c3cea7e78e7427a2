use std::sync::Arc;

use stride_db::{CommitFeed, WorkflowStore};
use stride_events::EventBus;

use crate::config::ServerConfig;
use crate::engine::{Outbox, WorkflowEngine};
use crate::notifications::Dispatcher;
use crate::ws::ConnectionRegistry;

/// Capacity of the in-process event bus.
const EVENT_BUS_CAPACITY: usize = 1024;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: every service sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend (Postgres or in-memory).
    pub store: Arc<dyn WorkflowStore>,
    pub config: Arc<ServerConfig>,
    /// Live push channels, one registry per process.
    pub registry: Arc<ConnectionRegistry>,
    /// Post-commit domain events.
    pub event_bus: Arc<EventBus>,
    pub dispatcher: Arc<Dispatcher>,
    pub engine: Arc<WorkflowEngine>,
}

impl AppState {
    /// Wire the registry, bus, dispatcher and engine around `store`.
    ///
    /// Attaches a commit feed to `store` and spawns the dispatcher task that
    /// drains it, so this must run inside a Tokio runtime.
    pub fn new(store: Arc<dyn WorkflowStore>, config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.delivery.channel_capacity));
        let event_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));

        let (feed, committed) = CommitFeed::channel();
        store.attach_feed(feed);
        tokio::spawn(Arc::clone(&dispatcher).run(committed));

        let outbox = Outbox::new(Arc::clone(&event_bus));
        let engine = Arc::new(WorkflowEngine::new(
            Arc::clone(&store),
            outbox,
            config.workflow.clone(),
        ));

        Self {
            store,
            config: Arc::new(config),
            registry,
            event_bus,
            dispatcher,
            engine,
        }
    }
}
