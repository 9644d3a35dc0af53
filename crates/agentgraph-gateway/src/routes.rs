use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use agentgraph_core::{AgentGraphError, SessionId};
use agentgraph_engine::{ExecutionContext, Graph};

use crate::middleware::Authenticated;
use crate::state::AppState;

// GET /api/health, no auth required
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

// POST /api/graphs/{id}/execute
pub async fn execute_graph(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ExecuteBody>,
) -> Response {
    // Graphs are only ever looked up within the caller's tenant.
    let Some(tenant) = body.tenant_id.as_deref().filter(|t| !t.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "tenantId is required");
    };
    let tenant = Some(tenant);
    let loaded = Graph::load(
        state.store.clone(),
        state.registry.clone(),
        state.config.engine.clone(),
        &id,
        tenant,
    )
    .await;
    let mut graph = match loaded {
        Ok(graph) => graph,
        Err(AgentGraphError::GraphNotFound(_)) => {
            return error_response(StatusCode::NOT_FOUND, format!("Graph not found: {id}"));
        }
        Err(e) => {
            warn!(graph_id = %id, error = %e, "Failed to load graph");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    info!(graph_id = %id, session_id = ?body.session_id, tenant = ?tenant, "Executing graph");

    let mut ctx = ExecutionContext::new();
    if let Some(sid) = body.session_id.as_deref() {
        ctx = ctx.with_session(SessionId::from_string(sid));
    }
    let mut ctx = ctx
        .with_input(body.input)
        .with_credentials(state.config.tenant_credentials(tenant))
        .with_debug(body.debug)
        .with_events(state.events.clone())
        .with_cancel(state.shutdown.child_token())
        .with_deadline(state.config.engine.run_timeout());
    graph.execute(&mut ctx).await;

    // Null when the caller sent none, or the adopted debug session.
    let session_id = ctx.session_id.take();
    if let Some(error) = ctx.error {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": error, "sessionId": session_id })),
        )
            .into_response();
    }
    Json(json!({ "output": ctx.output, "sessionId": session_id })).into_response()
}
