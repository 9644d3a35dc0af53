//! Pull-evaluated node graphs.
//!
//! A [`Graph`] owns a set of [`Node`]s wired by edges from output ports to
//! input ports. Execution starts at the terminal nodes and pulls: before a
//! node runs its strategy it executes every node feeding its input ports,
//! copies their values across, and evaluates its gate ports. Each node runs
//! at most once per [`Graph::execute`] call.
//!
//! Node behavior lives behind the [`WorkerKind`] trait and is looked up by
//! kind name in a [`WorkerRegistry`]. Cross-run state is checkpointed through
//! an optional [`agentgraph_core::GraphStore`] keyed by session id.

pub mod condition;
pub mod context;
pub mod executor;
pub mod graph;
pub mod node;
pub mod reference;
pub mod registry;
pub mod value;
pub mod version;

pub use context::ExecutionContext;
pub use graph::Graph;
pub use node::{Layout, Node};
pub use registry::{WorkerKind, WorkerRegistry, WorkerScope};

/// Kind names the engine itself gives meaning to.
pub mod kinds {
    /// Supplies the graph's input payload.
    pub const REQUEST: &str = "request";
    /// Collects the graph's output payload. Always a terminal.
    pub const RESPONSE: &str = "response";
    /// Outbound call. A terminal when wired.
    pub const API_CALL: &str = "api-call";
    /// Wraps another persisted graph.
    pub const AGENT_REFERENCE: &str = "agent-reference";
}
