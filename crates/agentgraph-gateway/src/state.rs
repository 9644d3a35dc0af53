use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use agentgraph_core::{AppConfig, EventBus, GraphStore};
use agentgraph_engine::WorkerRegistry;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn GraphStore>,
    pub registry: Arc<WorkerRegistry>,
    pub events: EventBus,
    /// Parent of every run's cancellation token.
    pub shutdown: CancellationToken,
}
