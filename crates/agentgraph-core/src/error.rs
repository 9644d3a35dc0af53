use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentGraphError {
    // Graph structure errors
    #[error("Unknown worker kind: {0}")]
    UnknownKind(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Port not found: {node}.{port}")]
    PortNotFound { node: String, port: String },

    #[error("Edge would create a cycle: {from} -> {to}")]
    CycleDetected { from: String, to: String },

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Agent reference nesting exceeds {0} levels")]
    ReferenceDepth(usize),

    #[error("Version snapshot not found: {0}")]
    VersionNotFound(usize),

    // Worker errors
    #[error("Worker misconfigured: {node}: {message}")]
    WorkerConfig { node: String, message: String },

    #[error("Worker failed: {node}: {message}")]
    WorkerExecution { node: String, message: String },

    // Run errors
    #[error("Run exceeded deadline ({0}s)")]
    RunTimeout(u64),

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // Outbound HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentGraphError {
    /// Configuration error attributed to a node.
    pub fn config(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WorkerConfig {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Runtime error attributed to a node.
    pub fn execution(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WorkerExecution {
            node: node.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentGraphError>;
