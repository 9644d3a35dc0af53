use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

use agentgraph_core::{AgentGraphError, GatingRule, NodeDefinition, Port, Result};

use crate::graph::Graph;

static NULL: Value = Value::Null;

/// Canvas placement, carried through for editors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Layout {
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// A unit of computation inside a [`Graph`].
///
/// A node owns its ports and parameters. Its behavior comes from the
/// [`crate::WorkerKind`] registered under `kind`.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub kind: String,
    ports: Vec<Port>,
    /// Kind-specific configuration.
    pub parameters: Value,
    /// Fallback predicate for gate ports without their own operator.
    pub gating_rule: Option<GatingRule>,
    /// Private state persisted across runs of the same session.
    pub state: Value,
    pub layout: Layout,
    /// Set on first entry in a run; guards against re-execution.
    pub executed: bool,
    /// Message of the last strategy failure in this run.
    pub last_error: Option<String>,
    revision: u64,
    referenced: Option<Box<Graph>>,
}

impl Node {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind: kind.into(),
            ports: Vec::new(),
            parameters: Value::Object(Map::new()),
            gating_rule: None,
            state: Value::Object(Map::new()),
            layout: Layout::default(),
            executed: false,
            last_error: None,
            revision: 0,
            referenced: None,
        }
    }

    /// Builder form of [`Node::add_port`].
    pub fn with_port(mut self, port: Port) -> Self {
        self.add_port(port);
        self
    }

    /// Builder form of [`Node::merge_parameters`].
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.merge_parameters(parameters);
        self
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, id: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == id)
    }

    pub fn port_mut(&mut self, id: &str) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.id == id)
    }

    pub fn port_named(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn port_named_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.name == name)
    }

    /// Look a port up by id, then by name.
    pub fn find_port(&self, id_or_name: &str) -> Option<&Port> {
        self.port(id_or_name).or_else(|| self.port_named(id_or_name))
    }

    pub fn input_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_input())
    }

    pub fn output_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_output())
    }

    /// Ports added by the user rather than declared by the kind.
    pub fn user_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| !p.system)
    }

    /// Add a port and return its id. A port without an id gets a fresh one.
    /// Adding a port whose name is taken replaces that port's definition and
    /// keeps the existing id.
    pub fn add_port(&mut self, mut port: Port) -> String {
        self.revision += 1;
        if let Some(existing) = self.ports.iter_mut().find(|p| p.name == port.name) {
            port.id = existing.id.clone();
            *existing = port;
            return existing.id.clone();
        }
        if port.id.is_empty() {
            port.id = Uuid::new_v4().to_string();
        }
        let id = port.id.clone();
        self.ports.push(port);
        id
    }

    /// Edit a port in place. Renaming onto another port's name is refused.
    pub fn update_port(&mut self, id: &str, edit: impl FnOnce(&mut Port)) -> Result<()> {
        let index = self
            .ports
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| self.port_not_found(id))?;

        let mut port = self.ports[index].clone();
        edit(&mut port);
        port.id = id.to_string();
        if self
            .ports
            .iter()
            .enumerate()
            .any(|(i, p)| i != index && p.name == port.name)
        {
            return Err(AgentGraphError::config(
                &self.id,
                format!("port name '{}' already in use", port.name),
            ));
        }
        self.ports[index] = port;
        self.revision += 1;
        Ok(())
    }

    pub fn remove_port(&mut self, id: &str) -> Option<Port> {
        let index = self.ports.iter().position(|p| p.id == id)?;
        self.revision += 1;
        Some(self.ports.remove(index))
    }

    /// Replace every port at once.
    pub fn replace_ports(&mut self, ports: Vec<Port>) {
        self.revision += 1;
        self.ports = ports;
    }

    /// Bumped on every port mutation so editors can refresh.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Current value of the named port, `null` when absent.
    pub fn value(&self, name: &str) -> &Value {
        self.port_named(name).map(|p| &p.value).unwrap_or(&NULL)
    }

    pub fn set_value(&mut self, name: &str, value: Value) -> Result<()> {
        match self.port_named_mut(name) {
            Some(port) => {
                port.value = value;
                Ok(())
            }
            None => Err(self.port_not_found(name)),
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key).filter(|v| !v.is_null())
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }

    pub fn param_bool(&self, key: &str) -> bool {
        self.param(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Deserialize one parameter into a typed value.
    pub fn param_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.param(key)
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| {
                    AgentGraphError::config(&self.id, format!("parameter '{key}': {e}"))
                })
            })
            .transpose()
    }

    /// Shallow-merge `extra` into the parameters object.
    pub fn merge_parameters(&mut self, extra: Value) {
        let Value::Object(extra) = extra else {
            return;
        };
        if !self.parameters.is_object() {
            self.parameters = Value::Object(Map::new());
        }
        if let Value::Object(params) = &mut self.parameters {
            params.extend(extra);
        }
    }

    /// Clear per-run bookkeeping and restore every port to its default.
    pub fn reset(&mut self) {
        self.executed = false;
        self.last_error = None;
        self.state = Value::Object(Map::new());
        for port in &mut self.ports {
            port.reset();
        }
    }

    /// The graph an agent-reference node wraps, once resolved.
    pub fn referenced_graph(&self) -> Option<&Graph> {
        self.referenced.as_deref()
    }

    pub fn referenced_graph_mut(&mut self) -> Option<&mut Graph> {
        self.referenced.as_deref_mut()
    }

    pub(crate) fn set_referenced_graph(&mut self, graph: Graph) {
        self.referenced = Some(Box::new(graph));
    }

    pub fn to_definition(&self) -> NodeDefinition {
        NodeDefinition {
            id: self.id.clone(),
            kind: self.kind.clone(),
            x: self.layout.x,
            y: self.layout.y,
            width: self.layout.width,
            height: self.layout.height,
            parameters: self.parameters.clone(),
            gating_rule: self.gating_rule.clone(),
            ports: self.ports.clone(),
        }
    }

    fn port_not_found(&self, port: &str) -> AgentGraphError {
        AgentGraphError::PortNotFound {
            node: self.id.clone(),
            port: port.to_string(),
        }
    }
}
