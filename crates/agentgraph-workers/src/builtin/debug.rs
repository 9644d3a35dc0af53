use futures::future::BoxFuture;

use agentgraph_core::{Port, Result, ValueType, WorkerCategory};
use agentgraph_engine::{Node, WorkerKind, WorkerScope};

fn passthrough(kind: &str) -> Node {
    Node::new(kind)
        .with_port(Port::input("input", ValueType::Unknown).system())
        .with_port(Port::output("output", ValueType::Unknown).system())
}

fn copy_input(node: &mut Node) -> Result<()> {
    let value = node.value("input").clone();
    node.set_value("output", value)
}

/// Shows whatever reaches it and passes it on unchanged.
pub struct DisplayWorker;

impl WorkerKind for DisplayWorker {
    fn kind(&self) -> &str {
        "display"
    }

    fn title(&self) -> &str {
        "Display"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Debug
    }

    fn description(&self) -> &str {
        "Displays its input in the editor"
    }

    fn create(&self) -> Node {
        passthrough("display")
    }

    fn execute<'a>(&'a self, node: &'a mut Node, _scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { copy_input(node) })
    }
}

/// Passes its input through outside debug runs. In debug runs the output
/// keeps its default, so editors can pin a mocked value there.
pub struct MockWorker;

impl WorkerKind for MockWorker {
    fn kind(&self) -> &str {
        "mock"
    }

    fn title(&self) -> &str {
        "Mock"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Debug
    }

    fn description(&self) -> &str {
        "Replaces its input with a fixed value while debugging"
    }

    fn create(&self) -> Node {
        passthrough("mock")
    }

    fn execute<'a>(&'a self, node: &'a mut Node, scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if scope.ctx.is_debug {
                return Ok(());
            }
            copy_input(node)
        })
    }
}
