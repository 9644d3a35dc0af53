//! Loading and saving graphs through a [`GraphStore`], including the
//! sub-graphs wrapped by agent-reference nodes.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use agentgraph_core::config::EngineConfig;
use agentgraph_core::{AgentGraphError, Direction, GraphStore, Port, Result};

use crate::graph::Graph;
use crate::kinds;
use crate::registry::WorkerRegistry;
use crate::value::to_text;

impl Graph {
    /// Load a graph by id and resolve its agent-reference nodes.
    pub async fn load(
        store: Arc<dyn GraphStore>,
        registry: Arc<WorkerRegistry>,
        config: EngineConfig,
        graph_id: &str,
        tenant_id: Option<&str>,
    ) -> Result<Graph> {
        load_at_depth(store, registry, config, graph_id.to_string(), tenant_id.map(String::from), 0)
            .await
    }

    /// Persist the graph's full definition and adopt the id the store
    /// assigns.
    pub async fn save(&mut self, tenant_id: Option<&str>) -> Result<String> {
        let store = self
            .store
            .clone()
            .ok_or_else(|| AgentGraphError::Config("graph has no store attached".into()))?;
        let id = store
            .save_graph_definition(tenant_id, &self.to_definition())
            .await?;
        info!(graph_id = %id, "Graph saved");
        self.id = Some(id.clone());
        Ok(id)
    }

    /// Load the graph named by each agent-reference node's `agent` parameter
    /// and attach it. `depth` is this graph's nesting level.
    pub async fn resolve_references(&mut self, tenant_id: Option<&str>, depth: usize) -> Result<()> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        let pending: Vec<(String, String)> = self
            .nodes()
            .filter(|n| n.kind == kinds::AGENT_REFERENCE)
            .filter_map(|n| {
                let target = n.param("agent").map(to_text)?;
                (!target.is_empty()).then(|| (n.id.clone(), target))
            })
            .collect();

        for (node_id, target) in pending {
            if depth >= self.config.max_reference_depth {
                return Err(AgentGraphError::ReferenceDepth(self.config.max_reference_depth));
            }
            let sub = load_at_depth(
                store.clone(),
                self.registry.clone(),
                self.config.clone(),
                target.clone(),
                tenant_id.map(String::from),
                depth + 1,
            )
            .await?;
            if !self.attach_reference(&node_id, sub) {
                warn!(node_id = %node_id, graph_id = %target, "Referenced graph lacks request or response node");
            }
        }
        Ok(())
    }

    /// Attach `sub` to an agent-reference node. The node's ports become the
    /// sub-graph's request ports as inputs and its response ports as
    /// outputs. Returns `false`, leaving the node untouched, when `sub` has
    /// no request or no response node.
    pub fn attach_reference(&mut self, node_id: &str, sub: Graph) -> bool {
        let (Some(request), Some(response)) = (
            sub.first_of_kind(kinds::REQUEST),
            sub.first_of_kind(kinds::RESPONSE),
        ) else {
            return false;
        };

        let mut ports: Vec<Port> = request
            .user_ports()
            .map(|p| mirror(p, Direction::Input))
            .collect();
        ports.extend(response.user_ports().map(|p| mirror(p, Direction::Output)));

        let Some(node) = self.nodes.get_mut(node_id) else {
            return false;
        };
        debug!(node_id, ports = ports.len(), "Attached referenced graph");
        node.replace_ports(ports);
        node.set_referenced_graph(sub);
        true
    }
}

fn mirror(port: &Port, direction: Direction) -> Port {
    let mut port = port.clone();
    port.direction = direction;
    port.system = false;
    port.reset();
    port
}

fn load_at_depth(
    store: Arc<dyn GraphStore>,
    registry: Arc<WorkerRegistry>,
    config: EngineConfig,
    graph_id: String,
    tenant_id: Option<String>,
    depth: usize,
) -> BoxFuture<'static, Result<Graph>> {
    Box::pin(async move {
        let def = store
            .load_graph_definition(&graph_id, tenant_id.as_deref())
            .await?
            .ok_or_else(|| AgentGraphError::GraphNotFound(graph_id.clone()))?;

        let mut graph = Graph::from_definition(def, registry, config)?.with_store(store);
        if graph.id.is_none() {
            graph.id = Some(graph_id);
        }
        graph.resolve_references(tenant_id.as_deref(), depth).await?;
        Ok(graph)
    })
}
