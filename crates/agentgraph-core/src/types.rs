use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session identifier supplied by the caller.
///
/// Only syntactically valid UUIDs take part in state persistence; any other
/// string is carried along but never used as a store key.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.trim().to_string())
    }

    /// Whether this id is a syntactically valid UUID.
    pub fn is_valid(&self) -> bool {
        Uuid::parse_str(&self.0).is_ok()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider name → secret, resolved per tenant.
pub type Credentials = HashMap<String, String>;

/// Port direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

/// Declared type of the payload a port carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueType {
    String,
    StringList,
    Number,
    NumberList,
    Enum,
    Boolean,
    #[default]
    #[serde(alias = "execute")]
    Unknown,
    #[serde(alias = "doc")]
    DocumentSet,
    #[serde(alias = "references")]
    ReferenceSet,
    #[serde(alias = "chat")]
    ChatHistory,
    Json,
    Audio,
    Handoff,
}

/// Comparison operator used by gate ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    IsEmpty,
    IsNotEmpty,
    Gt,
    Lt,
    Gte,
    Lte,
    Between,
}

/// What a graph is used for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphKind {
    #[default]
    Conversational,
    Data,
}

/// Grouping of worker kinds, used by editors to build palettes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerCategory {
    Io,
    Generator,
    Debug,
    Tool,
}

/// Events published on the execution log sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Graph execution started.
    RunStarted {
        graph_id: Option<String>,
        session_id: Option<SessionId>,
    },
    /// A node passed its gate and its strategy is about to run.
    NodeStarted { node_id: String, kind: String },
    /// A node's gate evaluated false; its strategy did not run.
    NodeSkipped { node_id: String, kind: String },
    /// A node's strategy finished. Carries the node's cross-run state.
    NodeCompleted {
        node_id: String,
        kind: String,
        state: serde_json::Value,
        elapsed_ms: u64,
    },
    /// A node's strategy returned an error.
    NodeFailed {
        node_id: String,
        kind: String,
        error: String,
    },
    /// Graph execution finished without error.
    RunComplete {
        graph_id: Option<String>,
        elapsed_ms: u64,
    },
    /// Graph execution finished with an error.
    RunError { error: String },
}
