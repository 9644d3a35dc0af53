use futures::future::BoxFuture;
use serde_json::Value;

use agentgraph_core::{Result, WorkerCategory};
use agentgraph_engine::value::is_truthy;
use agentgraph_engine::{kinds, Node, WorkerKind, WorkerScope};

/// Publishes the graph's input payload. Each port takes the payload entry
/// sharing its name.
pub struct RequestWorker;

impl WorkerKind for RequestWorker {
    fn kind(&self) -> &str {
        kinds::REQUEST
    }

    fn title(&self) -> &str {
        "Input"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Io
    }

    fn description(&self) -> &str {
        "Exposes the values passed to the graph by its caller"
    }

    fn create(&self) -> Node {
        Node::new(kinds::REQUEST)
    }

    fn execute<'a>(&'a self, node: &'a mut Node, scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let names: Vec<String> = node.ports().iter().map(|p| p.name.clone()).collect();
            for name in names {
                let value = scope.ctx.input.get(&name).cloned().unwrap_or(Value::Null);
                node.set_value(&name, value)?;
            }
            Ok(())
        })
    }
}

/// Collects the graph's output payload from its input ports. Falsy values
/// are left out.
pub struct ResponseWorker;

impl WorkerKind for ResponseWorker {
    fn kind(&self) -> &str {
        kinds::RESPONSE
    }

    fn title(&self) -> &str {
        "Response"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Io
    }

    fn description(&self) -> &str {
        "Returns values to the graph's caller"
    }

    fn create(&self) -> Node {
        Node::new(kinds::RESPONSE)
    }

    fn execute<'a>(&'a self, node: &'a mut Node, scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for port in node.input_ports().filter(|p| is_truthy(&p.value)) {
                scope.ctx.output.insert(port.name.clone(), port.value.clone());
            }
            Ok(())
        })
    }
}
