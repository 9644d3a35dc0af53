//! Gate evaluation.
//!
//! A node may carry any number of gate ports. Each gate compares its current
//! value against operands using an operator chosen by the port's declared
//! type. The node proceeds when it has no gates or when at least one gate
//! passes.

use serde_json::Value;
use tracing::debug;

use agentgraph_core::{GatingRule, Operator, Port, ValueType};

use crate::node::Node;
use crate::value::{is_truthy, to_number, to_text};

/// Whether the node's gates allow its strategy to run.
pub fn node_may_proceed(node: &Node) -> bool {
    let mut gates = node.ports().iter().filter(|p| p.is_condition_gate).peekable();
    if gates.peek().is_none() {
        return true;
    }
    gates.any(|gate| evaluate_gate(gate, node.gating_rule.as_ref()))
}

/// Evaluate one gate port. A gate without an operator of its own falls back
/// to the node's gating rule, then to `equals`.
pub fn evaluate_gate(port: &Port, rule: Option<&GatingRule>) -> bool {
    let (operator, operand1, operand2) = match (port.operator, rule) {
        (Some(op), _) => (op, &port.condition_operand1, &port.condition_operand2),
        (None, Some(rule)) => (
            rule.operator.unwrap_or(Operator::Equals),
            &rule.operand1,
            &rule.operand2,
        ),
        (None, None) => (
            Operator::Equals,
            &port.condition_operand1,
            &port.condition_operand2,
        ),
    };

    let passed = evaluate(port.value_type, operator, &port.value, operand1, operand2);
    debug!(
        port = %port.name,
        ?operator,
        value = %port.value,
        passed,
        "Evaluated gate"
    );
    passed
}

/// Apply `operator` to `value` under the rules for `value_type`. Operators
/// a type does not support evaluate to `false`.
pub fn evaluate(
    value_type: ValueType,
    operator: Operator,
    value: &Value,
    operand1: &Value,
    operand2: &Value,
) -> bool {
    match value_type {
        ValueType::String | ValueType::Enum => compare_text(operator, value, operand1),
        ValueType::Number => compare_number(operator, value, operand1, operand2),
        _ => compare_truthiness(operator, value, operand1),
    }
}

fn compare_truthiness(operator: Operator, value: &Value, operand: &Value) -> bool {
    match operator {
        Operator::Equals => is_truthy(value) == is_truthy(operand),
        Operator::NotEquals => is_truthy(value) != is_truthy(operand),
        _ => false,
    }
}

fn compare_text(operator: Operator, value: &Value, operand: &Value) -> bool {
    let value = to_text(value);
    let operand = to_text(operand);
    match operator {
        Operator::Equals => value == operand,
        Operator::NotEquals => value != operand,
        // The operand is the haystack.
        Operator::Contains => operand.contains(&value),
        Operator::NotContains => !operand.contains(&value),
        Operator::IsEmpty => value.is_empty(),
        Operator::IsNotEmpty => !value.is_empty(),
        _ => false,
    }
}

fn compare_number(operator: Operator, value: &Value, operand1: &Value, operand2: &Value) -> bool {
    let Some(v) = to_number(value) else {
        return matches!(operator, Operator::NotEquals);
    };
    let a = to_number(operand1);
    match operator {
        Operator::Equals => a == Some(v),
        Operator::NotEquals => a != Some(v),
        Operator::Gt => a.is_some_and(|a| v > a),
        Operator::Lt => a.is_some_and(|a| v < a),
        Operator::Gte => a.is_some_and(|a| v >= a),
        Operator::Lte => a.is_some_and(|a| v <= a),
        Operator::Between => match (a, to_number(operand2)) {
            (Some(lo), Some(hi)) => v >= lo && v <= hi,
            _ => false,
        },
        _ => false,
    }
}
