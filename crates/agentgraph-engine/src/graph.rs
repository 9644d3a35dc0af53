use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use agentgraph_core::config::EngineConfig;
use agentgraph_core::{
    AgentGraphError, Edge, ExecutionState, GraphDefinition, GraphKind, GraphStore, NodeDefinition,
    Result, VersionSnapshot,
};

use crate::kinds;
use crate::node::{Layout, Node};
use crate::registry::WorkerRegistry;

/// A set of nodes wired by edges, plus its version history.
///
/// Nodes are kept in insertion order so that terminal selection and
/// serialization are stable.
#[derive(Clone)]
pub struct Graph {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub kind: GraphKind,
    /// Session adopted by debug runs that do not name one.
    pub debug_session_id: Option<String>,
    /// State produced by the most recent run.
    pub execution_state: ExecutionState,
    pub(crate) nodes: HashMap<String, Node>,
    pub(crate) order: Vec<String>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) versions: Vec<VersionSnapshot>,
    pub(crate) registry: Arc<WorkerRegistry>,
    pub(crate) store: Option<Arc<dyn GraphStore>>,
    pub(crate) config: EngineConfig,
}

impl Graph {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            id: None,
            title: String::new(),
            description: String::new(),
            kind: GraphKind::default(),
            debug_session_id: None,
            execution_state: ExecutionState::default(),
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
            versions: Vec::new(),
            registry,
            store: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> Option<&Arc<dyn GraphStore>> {
        self.store.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Nodes ───────────────────────────────────────────────────

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Create a node of `kind` from the registry, merge `parameters` over the
    /// kind's defaults, and return the new node's id.
    pub fn add_node(&mut self, kind: &str, parameters: Value) -> Result<String> {
        let node = self.registry.create_with(kind, parameters)?;
        Ok(self.insert_node(node))
    }

    /// Insert a prepared node. A node without an id gets one; a node whose id
    /// is taken replaces the existing node in place.
    pub fn insert_node(&mut self, mut node: Node) -> String {
        if node.id.is_empty() {
            node.id = format!("{}_{}", node.kind, Uuid::new_v4().simple());
        }
        let id = node.id.clone();
        if self.nodes.insert(id.clone(), node).is_none() {
            self.order.push(id.clone());
        }
        debug!(node_id = %id, "Node added");
        id
    }

    /// Remove a node. Edges that referenced it are left in place and are
    /// ignored during execution.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        self.order.retain(|n| n != id);
        Some(node)
    }

    /// First node of the given kind in insertion order.
    pub fn first_of_kind(&self, kind: &str) -> Option<&Node> {
        self.nodes().find(|n| n.kind == kind)
    }

    // ── Edges ───────────────────────────────────────────────────

    /// Edges in declaration order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Wire an output port to an input port. Ports may be named by id or by
    /// name. Returns the new edge's id.
    pub fn connect(
        &mut self,
        source_node: &str,
        source_port: &str,
        target_node: &str,
        target_port: &str,
    ) -> Result<String> {
        let source_port_id = self.resolve_port(source_node, source_port)?;
        let target_port_id = self.resolve_port(target_node, target_port)?;
        let edge = Edge::new(
            Uuid::new_v4().to_string(),
            source_node,
            source_port_id,
            target_node,
            target_port_id,
        );
        let id = edge.id.clone();
        self.add_edge(edge)?;
        Ok(id)
    }

    /// Append an edge as-is. Endpoints are not required to exist. When cycle
    /// rejection is on, an edge closing a cycle is refused.
    pub fn add_edge(&mut self, mut edge: Edge) -> Result<()> {
        if self.config.reject_cycles
            && self.would_create_cycle(&edge.source_node_id, &edge.target_node_id)
        {
            return Err(AgentGraphError::CycleDetected {
                from: edge.source_node_id,
                to: edge.target_node_id,
            });
        }
        if edge.id.is_empty() {
            edge.id = Uuid::new_v4().to_string();
        }
        self.edges.push(edge);
        Ok(())
    }

    pub fn disconnect(&mut self, edge_id: &str) -> Option<Edge> {
        let index = self.edges.iter().position(|e| e.id == edge_id)?;
        Some(self.edges.remove(index))
    }

    /// Whether adding `from -> to` would close a cycle.
    pub fn would_create_cycle(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([to]);
        while let Some(current) = queue.pop_front() {
            if current == from {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            for edge in self.edges.iter().filter(|e| e.source_node_id == current) {
                queue.push_back(edge.target_node_id.as_str());
            }
        }
        false
    }

    /// Nodes at the other end of every edge touching `port_id` on `node_id`,
    /// in edge order, without duplicates.
    pub fn connected_nodes(&self, node_id: &str, port_id: &str) -> Vec<&Node> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|e| e.touches(node_id, port_id))
            .map(|e| {
                if e.source_node_id == node_id && e.source_port_id == port_id {
                    e.target_node_id.as_str()
                } else {
                    e.source_node_id.as_str()
                }
            })
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    fn resolve_port(&self, node_id: &str, port: &str) -> Result<String> {
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| AgentGraphError::NodeNotFound(node_id.to_string()))?;
        node.find_port(port)
            .map(|p| p.id.clone())
            .ok_or_else(|| AgentGraphError::PortNotFound {
                node: node_id.to_string(),
                port: port.to_string(),
            })
    }

    // ── Execution roots ─────────────────────────────────────────

    /// Nodes execution starts from: the first response node, then every
    /// api-call node that has an output port and a live incoming edge.
    pub fn terminal_nodes(&self) -> Vec<String> {
        let mut terminals = Vec::new();
        if let Some(response) = self.first_of_kind(kinds::RESPONSE) {
            terminals.push(response.id.clone());
        }
        terminals.extend(
            self.nodes()
                .filter(|n| n.kind == kinds::API_CALL)
                .filter(|n| n.output_ports().next().is_some())
                .filter(|n| self.has_live_input(n))
                .map(|n| n.id.clone()),
        );
        terminals
    }

    fn has_live_input(&self, node: &Node) -> bool {
        self.edges.iter().any(|e| {
            e.target_node_id == node.id
                && node.port(&e.target_port_id).is_some()
                && self
                    .nodes
                    .get(&e.source_node_id)
                    .is_some_and(|s| s.port(&e.source_port_id).is_some())
        })
    }

    /// Clear every node's run bookkeeping and the last run's state.
    pub fn reset(&mut self) {
        for node in self.nodes.values_mut() {
            node.reset();
        }
        self.execution_state = ExecutionState::default();
    }

    // ── Serialization ───────────────────────────────────────────

    /// Full serialized form, including version history.
    pub fn to_definition(&self) -> GraphDefinition {
        let mut def = self.export_shape();
        def.versions = self.versions.clone();
        def
    }

    /// Serialized form without version history.
    pub fn export_shape(&self) -> GraphDefinition {
        GraphDefinition {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            kind: self.kind,
            debug_session_id: self.debug_session_id.clone(),
            edges: self.edges.clone(),
            nodes: self.nodes().map(Node::to_definition).collect(),
            versions: Vec::new(),
        }
    }

    /// Rebuild a graph from its serialized form.
    ///
    /// Nodes of unregistered kinds are skipped. Saved ports that share a name
    /// with one of the kind's factory ports lend it their id, default and
    /// gate settings; other saved ports are kept as user ports.
    pub fn from_definition(
        def: GraphDefinition,
        registry: Arc<WorkerRegistry>,
        config: EngineConfig,
    ) -> Result<Self> {
        let mut graph = Graph::new(registry).with_config(config);
        graph.id = def.id;
        graph.title = def.title;
        graph.description = def.description;
        graph.kind = def.kind;
        graph.debug_session_id = def.debug_session_id;
        graph.versions = def.versions;

        for node_def in def.nodes {
            if !graph.registry.contains(&node_def.kind) {
                warn!(node_id = %node_def.id, kind = %node_def.kind, "Skipping node of unknown kind");
                continue;
            }
            let node = graph.build_node(node_def)?;
            graph.insert_node(node);
        }

        for edge in def.edges {
            graph.add_edge(edge)?;
        }

        Ok(graph)
    }

    fn build_node(&self, def: NodeDefinition) -> Result<Node> {
        let mut node = self.registry.create_with(&def.kind, def.parameters)?;
        node.id = def.id;
        node.layout = Layout {
            x: def.x,
            y: def.y,
            width: def.width,
            height: def.height,
        };
        node.gating_rule = def.gating_rule;

        for saved in def.ports {
            match node.port_named(&saved.name).map(|p| p.id.clone()) {
                Some(factory_id) => {
                    node.update_port(&factory_id, |port| {
                        port.default = saved.default.clone();
                        port.is_condition_gate = saved.is_condition_gate;
                        port.operator = saved.operator;
                        port.condition_operand1 = saved.condition_operand1.clone();
                        port.condition_operand2 = saved.condition_operand2.clone();
                        if saved.enum_values.is_some() {
                            port.enum_values = saved.enum_values.clone();
                        }
                    })?;
                    if !saved.id.is_empty() {
                        if let Some(port) = node.port_mut(&factory_id) {
                            port.id = saved.id;
                        }
                    }
                }
                None => {
                    node.add_port(saved);
                }
            }
        }
        node.reset();
        Ok(node)
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("nodes", &self.order)
            .field("edges", &self.edges.len())
            .field("versions", &self.versions.len())
            .finish_non_exhaustive()
    }
}
