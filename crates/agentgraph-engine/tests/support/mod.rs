#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use agentgraph_core::{AgentGraphError, Port, Result, ValueType, WorkerCategory};
use agentgraph_engine::{kinds, Graph, Node, WorkerKind, WorkerRegistry, WorkerScope};

/// Emits its `value` parameter and counts how often it ran.
pub struct Source {
    pub runs: Arc<AtomicUsize>,
}

impl WorkerKind for Source {
    fn kind(&self) -> &str {
        "source"
    }

    fn title(&self) -> &str {
        "Source"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Generator
    }

    fn create(&self) -> Node {
        Node::new("source").with_port(Port::output("output", ValueType::Unknown).system())
    }

    fn execute<'a>(&'a self, node: &'a mut Node, _scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let value = node.param("value").cloned().unwrap_or(Value::Null);
            node.set_value("output", value)
        })
    }
}

/// Copies `input` to `output`, or writes "ran" when `input` is absent.
pub struct Relay;

impl WorkerKind for Relay {
    fn kind(&self) -> &str {
        "relay"
    }

    fn title(&self) -> &str {
        "Relay"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Tool
    }

    fn create(&self) -> Node {
        Node::new("relay")
            .with_port(Port::input("input", ValueType::Unknown).system())
            .with_port(Port::output("output", ValueType::Unknown).system())
    }

    fn execute<'a>(&'a self, node: &'a mut Node, _scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let value = match node.value("input") {
                Value::Null => json!("ran"),
                v => v.clone(),
            };
            node.set_value("output", value)
        })
    }
}

/// Increments a counter kept in its cross-run state.
pub struct Counter;

impl WorkerKind for Counter {
    fn kind(&self) -> &str {
        "counter"
    }

    fn title(&self) -> &str {
        "Counter"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Tool
    }

    fn create(&self) -> Node {
        Node::new("counter").with_port(Port::output("count", ValueType::Number).system())
    }

    fn execute<'a>(&'a self, node: &'a mut Node, _scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let count = node.state.get("count").and_then(Value::as_u64).unwrap_or(0) + 1;
            node.state = json!({ "count": count });
            node.set_value("count", json!(count))
        })
    }
}

pub struct Fail;

impl WorkerKind for Fail {
    fn kind(&self) -> &str {
        "fail"
    }

    fn title(&self) -> &str {
        "Fail"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Debug
    }

    fn create(&self) -> Node {
        Node::new("fail").with_port(Port::output("output", ValueType::Unknown).system())
    }

    fn execute<'a>(&'a self, node: &'a mut Node, _scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { Err(AgentGraphError::execution(&node.id, "exploded")) })
    }
}

pub struct Slow;

impl WorkerKind for Slow {
    fn kind(&self) -> &str {
        "slow"
    }

    fn title(&self) -> &str {
        "Slow"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Debug
    }

    fn create(&self) -> Node {
        Node::new("slow").with_port(Port::output("output", ValueType::Unknown).system())
    }

    fn execute<'a>(&'a self, node: &'a mut Node, _scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            node.set_value("output", json!("late"))
        })
    }
}

/// Copies every input port into the output payload.
pub struct Collect;

impl WorkerKind for Collect {
    fn kind(&self) -> &str {
        kinds::RESPONSE
    }

    fn title(&self) -> &str {
        "Response"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Io
    }

    fn create(&self) -> Node {
        Node::new(kinds::RESPONSE)
    }

    fn execute<'a>(&'a self, node: &'a mut Node, scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for port in node.input_ports() {
                scope.ctx.output.insert(port.name.clone(), port.value.clone());
            }
            Ok(())
        })
    }
}

/// Kind with no behavior, standing in for kinds the engine only needs to
/// recognize.
pub struct Inert(pub &'static str);

impl WorkerKind for Inert {
    fn kind(&self) -> &str {
        self.0
    }

    fn title(&self) -> &str {
        self.0
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Io
    }

    fn create(&self) -> Node {
        Node::new(self.0)
    }

    fn execute<'a>(&'a self, _node: &'a mut Node, _scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

pub fn registry(runs: Arc<AtomicUsize>) -> Arc<WorkerRegistry> {
    let mut registry = WorkerRegistry::new();
    registry.register(Source { runs });
    registry.register(Relay);
    registry.register(Counter);
    registry.register(Fail);
    registry.register(Slow);
    registry.register(Collect);
    registry.register(Inert(kinds::REQUEST));
    registry.register(Inert(kinds::AGENT_REFERENCE));
    Arc::new(registry)
}

pub fn source(graph: &mut Graph, value: Value) -> String {
    graph.add_node("source", json!({ "value": value })).unwrap()
}

/// A response node with one input port per name.
pub fn response(graph: &mut Graph, names: &[&str]) -> String {
    let id = graph.add_node(kinds::RESPONSE, json!({})).unwrap();
    let node = graph.node_mut(&id).unwrap();
    for name in names {
        node.add_port(Port::input(*name, ValueType::Unknown));
    }
    id
}
