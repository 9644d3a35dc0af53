use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use agentgraph_core::{AppConfig, EventBus, GraphStore};
use agentgraph_engine::WorkerRegistry;

use crate::routes;
use crate::state::AppState;

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    config: AppConfig,
    store: Arc<dyn GraphStore>,
    registry: Arc<WorkerRegistry>,
    events: EventBus,
}

impl GatewayServer {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn GraphStore>,
        registry: Arc<WorkerRegistry>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            events,
        }
    }

    /// Build the router. Runs started through it are cancelled with `shutdown`.
    pub fn router(&self, shutdown: CancellationToken) -> Router {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            store: self.store.clone(),
            registry: self.registry.clone(),
            events: self.events.clone(),
            shutdown,
        });

        Router::new()
            .route("/api/health", get(routes::health))
            .route("/api/graphs/{id}/execute", post(routes::execute_graph))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let bind = self.config.gateway.clone().unwrap_or_default().bind;
        let listener = TcpListener::bind(&bind).await?;
        info!(bind = %bind, "Gateway listening");
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = self.router(shutdown.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}
