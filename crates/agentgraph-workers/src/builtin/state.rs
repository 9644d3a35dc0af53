use futures::future::BoxFuture;
use serde_json::{json, Value};

use agentgraph_core::{Port, Result, ValueType, WorkerCategory};
use agentgraph_engine::{Node, WorkerKind, WorkerScope};

/// Remembers the last non-null value it received within a session and
/// republishes it on every run.
pub struct StateWorker;

impl WorkerKind for StateWorker {
    fn kind(&self) -> &str {
        "state"
    }

    fn title(&self) -> &str {
        "Persist"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Tool
    }

    fn description(&self) -> &str {
        "Persists data for later runs of the same session"
    }

    fn create(&self) -> Node {
        Node::new("state")
            .with_port(Port::input("input", ValueType::Unknown).system())
            .with_port(Port::output("output", ValueType::Unknown).system())
    }

    fn execute<'a>(&'a self, node: &'a mut Node, _scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let input = node.value("input").clone();
            if !input.is_null() {
                node.state = json!({ "value": input });
            }
            let stored = node.state.get("value").cloned().unwrap_or(Value::Null);
            node.set_value("output", stored)
        })
    }
}
