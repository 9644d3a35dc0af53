//! Shared data model: ports, edges, execution state and the serialized graph
//! format exchanged with the persistent store.
//!
//! Port values are transient. They are never serialized and are reset at the
//! start of every run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Direction, GraphKind, Operator, ValueType};

/// Items stored in the serialized format as `{ id: item }` maps.
pub trait Keyed {
    fn key(&self) -> &str;
    fn set_key(&mut self, key: String);
}

/// A named, typed, directional attachment point on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Stable id used for edge wiring.
    #[serde(default)]
    pub id: String,
    /// Unique within the node; strategies look ports up by name.
    pub name: String,
    pub direction: Direction,
    #[serde(default, alias = "type")]
    pub value_type: ValueType,
    /// Current run value. Never serialized.
    #[serde(skip)]
    pub value: Value,
    /// Set once an incoming edge has written this port during the current run.
    #[serde(skip)]
    pub assigned: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub default: Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
    #[serde(default, alias = "condition", skip_serializing_if = "is_false")]
    pub is_condition_gate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub condition_operand1: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub condition_operand2: Value,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Port {
    fn new(name: impl Into<String>, direction: Direction, value_type: ValueType) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            direction,
            value_type,
            value: Value::Null,
            assigned: false,
            default: Value::Null,
            system: false,
            is_condition_gate: false,
            enum_values: None,
            operator: None,
            condition_operand1: Value::Null,
            condition_operand2: Value::Null,
        }
    }

    pub fn input(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, Direction::Input, value_type)
    }

    pub fn output(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, Direction::Output, value_type)
    }

    /// Mark as a gate port feeding the condition evaluator.
    pub fn gate(mut self) -> Self {
        self.is_condition_gate = true;
        self
    }

    /// Mark as part of the kind's fixed port set.
    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn with_enum_values(mut self, values: Vec<String>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Attach a gate predicate. Operands are compared against `value`.
    pub fn with_condition(mut self, operator: Operator, operand1: Value, operand2: Value) -> Self {
        self.operator = Some(operator);
        self.condition_operand1 = operand1;
        self.condition_operand2 = operand2;
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    /// Restore the value to `default` and forget any edge assignment.
    pub fn reset(&mut self) {
        self.value = self.default.clone();
        self.assigned = false;
    }
}

impl Keyed for Port {
    fn key(&self) -> &str {
        &self.id
    }

    fn set_key(&mut self, key: String) {
        self.id = key;
    }
}

/// Directed connection from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "source")]
    pub source_node_id: String,
    #[serde(alias = "sourceHandle")]
    pub source_port_id: String,
    #[serde(alias = "target")]
    pub target_node_id: String,
    #[serde(alias = "targetHandle")]
    pub target_port_id: String,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source_node_id: impl Into<String>,
        source_port_id: impl Into<String>,
        target_node_id: impl Into<String>,
        target_port_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source_node_id.into(),
            source_port_id: source_port_id.into(),
            target_node_id: target_node_id.into(),
            target_port_id: target_port_id.into(),
        }
    }

    /// Whether `port_id` on `node_id` is either endpoint of this edge.
    pub fn touches(&self, node_id: &str, port_id: &str) -> bool {
        (self.source_node_id == node_id && self.source_port_id == port_id)
            || (self.target_node_id == node_id && self.target_port_id == port_id)
    }
}

impl Keyed for Edge {
    fn key(&self) -> &str {
        &self.id
    }

    fn set_key(&mut self, key: String) {
        self.id = key;
    }
}

/// Per-session payload checkpointed to the store between runs.
///
/// `nodes[node_id]` holds each node's private cross-run state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(default)]
    pub graph: Map<String, Value>,
    #[serde(default, alias = "workers")]
    pub nodes: Map<String, Value>,
}

impl ExecutionState {
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty() && self.nodes.is_empty()
    }

    /// Fill in entries from `other` that this state does not already hold.
    pub fn merge_missing(&mut self, other: ExecutionState) {
        for (k, v) in other.graph {
            self.graph.entry(k).or_insert(v);
        }
        for (k, v) in other.nodes {
            self.nodes.entry(k).or_insert(v);
        }
    }
}

/// Node-level default predicate for gate ports that carry no operator of
/// their own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatingRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    #[serde(default, alias = "value", skip_serializing_if = "Value::is_null")]
    pub operand1: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub operand2: Value,
}

/// Serialized node: kind, parameters, layout and ports without values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    pub id: String,
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    #[serde(default, alias = "condition", skip_serializing_if = "Option::is_none")]
    pub gating_rule: Option<GatingRule>,
    #[serde(default, alias = "handles", with = "keyed_map")]
    pub ports: Vec<Port>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Serialized graph as exchanged with the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "type")]
    pub kind: GraphKind,
    #[serde(default, alias = "debuguuid", skip_serializing_if = "Option::is_none")]
    pub debug_session_id: Option<String>,
    #[serde(default, with = "keyed_map")]
    pub edges: Vec<Edge>,
    #[serde(default, alias = "workers")]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<VersionSnapshot>,
}

/// A saved copy of a graph's exportable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub serialized_graph: GraphDefinition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One execution log record appended to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl LogEntry {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            graph_id: None,
            session_id: None,
            node_id: None,
            message: message.into(),
            detail: None,
        }
    }
}

/// `{ id: item }` maps that keep document order and fill missing ids from
/// the map key. Lists are accepted on input as well.
mod keyed_map {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
    use serde::ser::{SerializeMap, Serializer};
    use serde::Serialize;

    use super::Keyed;

    pub fn serialize<S, T>(items: &[T], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Keyed + Serialize,
    {
        let mut map = serializer.serialize_map(Some(items.len()))?;
        for item in items {
            map.serialize_entry(item.key(), item)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Keyed + Deserialize<'de>,
    {
        struct KeyedVisitor<T>(PhantomData<T>);

        impl<'de, T> Visitor<'de> for KeyedVisitor<T>
        where
            T: Keyed + Deserialize<'de>,
        {
            type Value = Vec<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map or list of keyed entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Vec<T>, A::Error> {
                let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, mut item)) = access.next_entry::<String, T>()? {
                    if item.key().is_empty() {
                        item.set_key(key);
                    }
                    items.push(item);
                }
                Ok(items)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Vec<T>, A::Error> {
                let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(item) = access.next_element::<T>()? {
                    items.push(item);
                }
                Ok(items)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Vec<T>, E> {
                Ok(Vec::new())
            }
        }

        deserializer.deserialize_any(KeyedVisitor(PhantomData))
    }
}
