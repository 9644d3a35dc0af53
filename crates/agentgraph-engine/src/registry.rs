use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use agentgraph_core::{AgentGraphError, Result, WorkerCategory};

use crate::context::ExecutionContext;
use crate::graph::Graph;
use crate::node::Node;

/// Behavior shared by every node of one kind.
///
/// `create` builds a node carrying the kind's fixed ports and default
/// parameters. `execute` reads the node's input ports and writes its output
/// ports; the engine has already pulled inputs and checked gates.
pub trait WorkerKind: Send + Sync + 'static {
    /// Registry key and serialized `kind` of nodes built by this strategy.
    fn kind(&self) -> &str;

    /// Human-readable label.
    fn title(&self) -> &str;

    fn category(&self) -> WorkerCategory;

    fn description(&self) -> &str {
        ""
    }

    /// A fresh node of this kind. The graph assigns the id.
    fn create(&self) -> Node;

    /// Adjust ports after the node's parameters are set.
    fn configure(&self, _node: &mut Node) {}

    /// Run the node once.
    fn execute<'a>(&'a self, node: &'a mut Node, scope: WorkerScope<'a>)
        -> BoxFuture<'a, Result<()>>;
}

/// What a strategy may see while it runs: the rest of the graph, read-only,
/// and the run context.
pub struct WorkerScope<'a> {
    pub graph: &'a Graph,
    pub ctx: &'a mut ExecutionContext,
}

impl WorkerScope<'_> {
    /// Nodes wired to `port_id` on `node_id`, in edge order.
    pub fn connected_nodes(&self, node_id: &str, port_id: &str) -> Vec<&Node> {
        self.graph.connected_nodes(node_id, port_id)
    }
}

/// Palette entry describing a registered kind.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerDescriptor {
    pub kind: String,
    pub title: String,
    pub category: WorkerCategory,
    pub description: String,
}

/// Registry of node kinds.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    kinds: HashMap<String, Arc<dyn WorkerKind>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind, replacing any kind of the same name.
    pub fn register(&mut self, worker: impl WorkerKind) {
        let kind = worker.kind().to_string();
        self.kinds.insert(kind, Arc::new(worker));
    }

    pub fn unregister(&mut self, kind: &str) -> bool {
        self.kinds.remove(kind).is_some()
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn WorkerKind>> {
        self.kinds.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kind names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.kinds.keys().map(|s| s.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Descriptors for every registered kind, sorted by kind.
    pub fn descriptors(&self) -> Vec<WorkerDescriptor> {
        let mut out: Vec<WorkerDescriptor> = self
            .kinds
            .values()
            .map(|w| WorkerDescriptor {
                kind: w.kind().to_string(),
                title: w.title().to_string(),
                category: w.category(),
                description: w.description().to_string(),
            })
            .collect();
        out.sort_by(|a, b| a.kind.cmp(&b.kind));
        out
    }

    /// A fresh node of `kind` with its factory ports and parameters.
    pub fn create(&self, kind: &str) -> Result<Node> {
        let worker = self
            .get(kind)
            .ok_or_else(|| AgentGraphError::UnknownKind(kind.to_string()))?;
        let mut node = worker.create();
        node.kind = kind.to_string();
        Ok(node)
    }

    /// Like [`WorkerRegistry::create`], with `parameters` merged over the
    /// kind's defaults before the kind adjusts its ports.
    pub fn create_with(&self, kind: &str, parameters: Value) -> Result<Node> {
        let worker = self
            .get(kind)
            .ok_or_else(|| AgentGraphError::UnknownKind(kind.to_string()))?;
        let mut node = worker.create().with_parameters(parameters);
        node.kind = kind.to_string();
        worker.configure(&mut node);
        Ok(node)
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("kinds", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgraph_core::{Port, ValueType};

    struct Noop;

    impl WorkerKind for Noop {
        fn kind(&self) -> &str {
            "noop"
        }

        fn title(&self) -> &str {
            "No-op"
        }

        fn category(&self) -> WorkerCategory {
            WorkerCategory::Debug
        }

        fn create(&self) -> Node {
            Node::new("noop").with_port(Port::output("output", ValueType::Unknown).system())
        }

        fn execute<'a>(
            &'a self,
            _node: &'a mut Node,
            _scope: WorkerScope<'a>,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = WorkerRegistry::new();
        registry.register(Noop);
        assert!(registry.contains("noop"));
        assert_eq!(registry.list(), vec!["noop"]);

        let node = registry.create("noop").unwrap();
        assert_eq!(node.kind, "noop");
        assert!(node.port_named("output").is_some());
    }

    #[test]
    fn test_unknown_kind() {
        let registry = WorkerRegistry::new();
        let err = registry.create("missing").unwrap_err();
        assert!(matches!(err, AgentGraphError::UnknownKind(k) if k == "missing"));
    }

    #[test]
    fn test_unregister() {
        let mut registry = WorkerRegistry::new();
        registry.register(Noop);
        assert!(registry.unregister("noop"));
        assert!(!registry.unregister("noop"));
    }

    #[test]
    fn test_descriptors() {
        let mut registry = WorkerRegistry::new();
        registry.register(Noop);
        let descriptors = registry.descriptors();
        assert_eq!(descriptors[0].title, "No-op");
        assert_eq!(descriptors[0].category, WorkerCategory::Debug);
    }
}
