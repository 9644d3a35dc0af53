//! Pull evaluation.
//!
//! [`Graph::execute`] starts at the terminal nodes. Each node, on first
//! entry in a run, executes the sources of its incoming edges, copies their
//! values onto its input ports, evaluates its gates and, if they pass, runs
//! its strategy.

use std::time::Instant;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use agentgraph_core::{AgentGraphError, EngineEvent, Edge, LogEntry, Result, SessionId};

use crate::condition;
use crate::context::ExecutionContext;
use crate::graph::Graph;
use crate::registry::WorkerScope;
use crate::value::is_truthy;

impl Graph {
    /// Run the graph once.
    ///
    /// Errors are not returned: they are recorded in `ctx.error`, appended to
    /// the store's execution log and published on the event bus. State is
    /// checkpointed for a valid session whether or not the run failed.
    pub async fn execute(&mut self, ctx: &mut ExecutionContext) {
        let start = Instant::now();
        self.reset();
        ctx.error = None;
        ctx.current_node = None;

        if ctx.is_debug && ctx.session_id.is_none() {
            ctx.session_id = self.debug_session_id.as_deref().map(SessionId::from_string);
        }

        let session = ctx.persistable_session().cloned();
        if let (Some(sid), Some(store)) = (&session, &self.store) {
            match store.load_execution_state(sid).await {
                Ok(Some(persisted)) => ctx.execution_state.merge_missing(persisted),
                Ok(None) => {}
                Err(e) => warn!(session = %sid, error = %e, "Failed to load execution state"),
            }
        }

        let terminals = self.terminal_nodes();
        if terminals.is_empty() {
            debug!(graph = ?self.id, "No terminal nodes, nothing to execute");
            return;
        }

        ctx.events.publish(EngineEvent::RunStarted {
            graph_id: self.id.clone(),
            session_id: ctx.session_id.clone(),
        });
        info!(graph = ?self.id, terminals = terminals.len(), "Executing graph");

        let owns_deadline = ctx.deadline_at.is_none();
        if owns_deadline {
            ctx.deadline_at = ctx.deadline.map(|d| tokio::time::Instant::now() + d);
        }

        let mut result = Ok(());
        for terminal in &terminals {
            result = self.execute_node(terminal, ctx).await;
            if result.is_err() {
                break;
            }
        }

        if owns_deadline {
            ctx.deadline_at = None;
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                info!(graph = ?self.id, elapsed_ms, "Graph execution complete");
                ctx.events.publish(EngineEvent::RunComplete {
                    graph_id: self.id.clone(),
                    elapsed_ms,
                });
            }
            Err(e) => {
                error!(graph = ?self.id, node = ?ctx.current_node, error = %e, "Graph execution failed");
                ctx.error = Some(e.to_string());
                self.log_failure(ctx, &e).await;
                ctx.events.publish(EngineEvent::RunError {
                    error: e.to_string(),
                });
            }
        }

        if let (Some(sid), Some(store)) = (&session, &self.store) {
            if let Err(e) = store.save_execution_state(sid, &ctx.execution_state).await {
                warn!(session = %sid, error = %e, "Failed to save execution state");
            }
        }

        ctx.current_node = None;
        self.execution_state = ctx.execution_state.clone();
    }

    async fn log_failure(&self, ctx: &ExecutionContext, err: &AgentGraphError) {
        let Some(store) = &self.store else {
            return;
        };
        let mut entry = LogEntry::error(err.to_string());
        entry.graph_id = self.id.clone();
        entry.session_id = ctx.session_id.as_ref().map(|s| s.0.clone());
        entry.node_id = ctx.current_node.clone();
        entry.detail = Some(json!({ "input": Value::Object(ctx.input.clone()) }));
        if let Err(e) = store.append_log(entry).await {
            warn!(error = %e, "Failed to append execution log");
        }
    }

    /// Execute one node, pulling its inputs first. Re-entry within a run is
    /// a no-op, as is a node id that is not in the graph.
    pub fn execute_node<'a>(
        &'a mut self,
        node_id: &'a str,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let Some(node) = self.nodes.get_mut(node_id) else {
                return Ok(());
            };
            if node.executed {
                return Ok(());
            }
            node.executed = true;
            node.state = ctx
                .execution_state
                .nodes
                .get(node_id)
                .cloned()
                .unwrap_or_else(|| json!({}));

            self.resolve_inputs(node_id, ctx).await?;

            let Some(node) = self.nodes.get(node_id) else {
                return Ok(());
            };
            let kind = node.kind.clone();

            if !condition::node_may_proceed(node) {
                debug!(node_id, kind = %kind, "Gate closed, skipping node");
                ctx.current_node = None;
                ctx.events.publish(EngineEvent::NodeSkipped {
                    node_id: node_id.to_string(),
                    kind,
                });
                return Ok(());
            }

            let Some(strategy) = self.registry.get(&kind) else {
                let err = AgentGraphError::UnknownKind(kind.clone());
                if let Some(node) = self.nodes.get_mut(node_id) {
                    node.last_error = Some(err.to_string());
                }
                error!(node_id, kind = %kind, "No worker registered for kind");
                ctx.events.publish(EngineEvent::NodeFailed {
                    node_id: node_id.to_string(),
                    kind,
                    error: err.to_string(),
                });
                return Err(err);
            };

            ctx.current_node = Some(node_id.to_string());
            ctx.events.publish(EngineEvent::NodeStarted {
                node_id: node_id.to_string(),
                kind: kind.clone(),
            });
            debug!(node_id, kind = %kind, "Executing node");

            // Checked out for the duration of the strategy so the rest of the
            // graph can be lent out read-only.
            let Some(mut node) = self.nodes.remove(node_id) else {
                return Ok(());
            };
            let cancel = ctx.cancel.clone();
            let deadline = ctx.deadline_at;
            let timeout_secs = ctx.deadline.map(|d| d.as_secs()).unwrap_or_default();
            let started = Instant::now();

            let result = {
                let scope = WorkerScope {
                    graph: &*self,
                    ctx: &mut *ctx,
                };
                tokio::select! {
                    r = strategy.execute(&mut node, scope) => r,
                    _ = cancel.cancelled() => Err(AgentGraphError::Cancelled),
                    _ = wait_until(deadline) => Err(AgentGraphError::RunTimeout(timeout_secs)),
                }
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => {
                    ctx.execution_state
                        .nodes
                        .insert(node_id.to_string(), node.state.clone());
                    ctx.current_node = None;
                    ctx.events.publish(EngineEvent::NodeCompleted {
                        node_id: node_id.to_string(),
                        kind,
                        state: node.state.clone(),
                        elapsed_ms,
                    });
                }
                Err(e) => {
                    node.last_error = Some(e.to_string());
                    error!(node_id, kind = %kind, error = %e, "Node failed");
                    ctx.events.publish(EngineEvent::NodeFailed {
                        node_id: node_id.to_string(),
                        kind,
                        error: e.to_string(),
                    });
                }
            }
            self.nodes.insert(node_id.to_string(), node);
            result
        })
    }

    /// For each incoming edge, execute its source, then fill the target port
    /// from the source port unless an earlier edge already did. A falsy
    /// source value yields the target's default.
    async fn resolve_inputs(&mut self, node_id: &str, ctx: &mut ExecutionContext) -> Result<()> {
        let incoming: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| e.target_node_id == node_id)
            .cloned()
            .collect();

        for edge in incoming {
            let live = self
                .nodes
                .get(node_id)
                .is_some_and(|n| n.port(&edge.target_port_id).is_some())
                && self.nodes.contains_key(&edge.source_node_id);
            if !live {
                debug!(edge = %edge.id, "Ignoring dangling edge");
                continue;
            }

            self.execute_node(&edge.source_node_id, ctx).await?;

            let Some(source_value) = self
                .nodes
                .get(&edge.source_node_id)
                .and_then(|n| n.port(&edge.source_port_id))
                .map(|p| p.value.clone())
            else {
                continue;
            };

            let Some(target) = self
                .nodes
                .get_mut(node_id)
                .and_then(|n| n.port_mut(&edge.target_port_id))
            else {
                continue;
            };
            if target.assigned {
                continue;
            }
            target.value = if is_truthy(&source_value) {
                source_value
            } else {
                target.default.clone()
            };
            target.assigned = true;
        }
        Ok(())
    }
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => futures::future::pending::<()>().await,
    }
}
