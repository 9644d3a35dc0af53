use futures::future::BoxFuture;
use serde_json::{json, Value};

use agentgraph_core::{Port, Result, ValueType, WorkerCategory};
use agentgraph_engine::{Node, WorkerKind, WorkerScope};

/// Static content: text, a number, or a media URI.
pub struct TextWorker;

impl WorkerKind for TextWorker {
    fn kind(&self) -> &str {
        "text"
    }

    fn title(&self) -> &str {
        "Content"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Generator
    }

    fn description(&self) -> &str {
        "Generates static content (text, numbers, audio, images, files)"
    }

    fn create(&self) -> Node {
        Node::new("text")
            .with_parameters(json!({ "contentType": "text" }))
            .with_port(Port::output("output", ValueType::String).system())
    }

    fn execute<'a>(&'a self, node: &'a mut Node, _scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let value = content(node);
            node.set_value("output", value)
        })
    }
}

fn content(node: &Node) -> Value {
    match node.param_str("contentType").unwrap_or("text") {
        "number" => node.param("numberValue").cloned().unwrap_or(json!(0)),
        "audio" | "image" | "file" => json!(node.param_str("contentUri").unwrap_or_default()),
        _ => json!(node.param_str("text").unwrap_or_default()),
    }
}
