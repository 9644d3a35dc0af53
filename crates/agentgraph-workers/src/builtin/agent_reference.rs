use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use agentgraph_core::{AgentGraphError, ExecutionState, Result, WorkerCategory};
use agentgraph_engine::{kinds, Node, WorkerKind, WorkerScope};

/// Runs another graph as a single node.
///
/// The wrapped graph is attached when the parent is loaded; until then the
/// node has no ports and does nothing. Input ports feed the wrapped graph's
/// request node by name, and its response payload fills the output ports.
/// The wrapped graph's cross-run state is kept inside this node's state.
pub struct AgentReferenceWorker;

impl WorkerKind for AgentReferenceWorker {
    fn kind(&self) -> &str {
        kinds::AGENT_REFERENCE
    }

    fn title(&self) -> &str {
        "Agent"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Tool
    }

    fn description(&self) -> &str {
        "Runs another saved graph"
    }

    fn create(&self) -> Node {
        Node::new(kinds::AGENT_REFERENCE)
    }

    fn execute<'a>(&'a self, node: &'a mut Node, scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let input: Map<String, Value> = node
                .input_ports()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect();
            let output_names: Vec<String> = node.output_ports().map(|p| p.name.clone()).collect();
            let nested_state: ExecutionState = match serde_json::from_value(node.state.clone()) {
                Ok(state) => state,
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "Discarding malformed nested state");
                    ExecutionState::default()
                }
            };

            let node_id = node.id.clone();
            let Some(sub) = node.referenced_graph_mut() else {
                debug!(node_id = %node_id, "No referenced graph attached");
                return Ok(());
            };
            if sub.first_of_kind(kinds::REQUEST).is_none() || sub.first_of_kind(kinds::RESPONSE).is_none() {
                return Ok(());
            }

            let mut child = scope.ctx.child(input);
            child.execution_state = nested_state;
            sub.execute(&mut child).await;

            if let Some(error) = child.error {
                return Err(AgentGraphError::execution(&node_id, error));
            }

            node.state = serde_json::to_value(&child.execution_state)?;
            for name in output_names {
                let value = child.output.get(&name).cloned().unwrap_or(Value::Null);
                node.set_value(&name, value)?;
            }
            Ok(())
        })
    }
}
