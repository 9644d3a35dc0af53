use futures::future::BoxFuture;
use serde_json::{json, Value};

use agentgraph_core::{Port, Result, ValueType, WorkerCategory};
use agentgraph_engine::value::{is_truthy, to_text};
use agentgraph_engine::{Node, WorkerKind, WorkerScope};

const DEFAULT_INPUTS: u64 = 2;

/// Merges `input1..inputN` into `output`.
///
/// `nonempty` mode picks the first input holding a non-empty value; `concat`
/// mode joins strings or flattens arrays, depending on the first input.
pub struct CombineWorker;

impl WorkerKind for CombineWorker {
    fn kind(&self) -> &str {
        "combine"
    }

    fn title(&self) -> &str {
        "Combine"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Tool
    }

    fn description(&self) -> &str {
        "Combines multiple inputs into one output"
    }

    fn create(&self) -> Node {
        Node::new("combine")
            .with_parameters(json!({ "mode": "nonempty", "inputCount": DEFAULT_INPUTS }))
            .with_port(Port::input("input1", ValueType::Unknown).system())
            .with_port(Port::input("input2", ValueType::Unknown).system())
            .with_port(Port::output("output", ValueType::Unknown).system())
    }

    fn configure(&self, node: &mut Node) {
        let count = node
            .param("inputCount")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_INPUTS);
        for k in 1..=count {
            let name = format!("input{k}");
            if node.port_named(&name).is_none() {
                node.add_port(Port::input(name, ValueType::Unknown));
            }
        }
    }

    fn execute<'a>(&'a self, node: &'a mut Node, _scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let inputs = ordered_inputs(node);
            let combined = match node.param_str("mode").unwrap_or("nonempty") {
                "concat" => concat(&inputs),
                _ => Some(first_nonempty(&inputs)),
            };
            match combined {
                Some(value) => node.set_value("output", value),
                None => Ok(()),
            }
        })
    }
}

/// Values of the `inputK` ports, ordered by K.
fn ordered_inputs(node: &Node) -> Vec<Value> {
    let mut inputs: Vec<(u64, Value)> = node
        .input_ports()
        .filter_map(|p| {
            let k = p.name.strip_prefix("input")?;
            Some((k.parse().unwrap_or(0), p.value.clone()))
        })
        .collect();
    inputs.sort_by_key(|(k, _)| *k);
    inputs.into_iter().map(|(_, v)| v).collect()
}

fn first_nonempty(inputs: &[Value]) -> Value {
    let found = inputs.iter().find(|v| match v {
        Value::Array(items) => !items.is_empty(),
        other => is_truthy(other),
    });
    match found {
        Some(v) => v.clone(),
        None => inputs
            .last()
            .filter(|v| is_truthy(v))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

/// `None` when the first input is neither a string nor an array.
fn concat(inputs: &[Value]) -> Option<Value> {
    match inputs.first()? {
        Value::String(_) => Some(Value::String(
            inputs
                .iter()
                .filter(|v| is_truthy(v))
                .map(to_text)
                .collect::<String>(),
        )),
        Value::Array(_) => Some(Value::Array(
            inputs
                .iter()
                .filter_map(Value::as_array)
                .flatten()
                .cloned()
                .collect(),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_nonempty() {
        assert_eq!(
            first_nonempty(&[json!(""), json!([]), json!("b"), json!("c")]),
            json!("b")
        );
        assert_eq!(first_nonempty(&[json!(null), json!([1])]), json!([1]));
        assert_eq!(first_nonempty(&[json!(""), json!(0)]), Value::Null);
        assert_eq!(first_nonempty(&[json!(""), json!([])]), json!([]));
    }

    #[test]
    fn test_concat_strings_and_arrays() {
        assert_eq!(
            concat(&[json!("a"), json!(null), json!("c")]),
            Some(json!("ac"))
        );
        assert_eq!(
            concat(&[json!([1]), json!("x"), json!([2, 3])]),
            Some(json!([1, 2, 3]))
        );
        assert_eq!(concat(&[json!(5), json!("x")]), None);
        assert_eq!(concat(&[]), None);
    }

    #[test]
    fn test_input_count_adds_ports() {
        let mut node = CombineWorker.create().with_parameters(json!({ "inputCount": 4 }));
        CombineWorker.configure(&mut node);
        assert!(node.port_named("input3").is_some());
        assert!(node.port_named("input4").is_some());
        assert_eq!(node.input_ports().count(), 4);
    }

    #[test]
    fn test_factory_inputs_are_system_ports() {
        let mut node = CombineWorker.create().with_parameters(json!({ "inputCount": 3 }));
        CombineWorker.configure(&mut node);
        let user: Vec<&str> = node.user_ports().map(|p| p.name.as_str()).collect();
        assert_eq!(user, vec!["input3"]);
    }

    #[test]
    fn test_inputs_ordered_numerically() {
        let mut node = CombineWorker.create().with_parameters(json!({ "inputCount": 10 }));
        CombineWorker.configure(&mut node);
        node.set_value("input10", json!("ten")).unwrap();
        node.set_value("input2", json!("two")).unwrap();
        let inputs = ordered_inputs(&node);
        assert_eq!(inputs[1], json!("two"));
        assert_eq!(inputs[9], json!("ten"));
    }
}
