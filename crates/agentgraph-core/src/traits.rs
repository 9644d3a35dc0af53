use futures::future::BoxFuture;

use crate::error::Result;
use crate::model::{ExecutionState, GraphDefinition, LogEntry};
use crate::types::SessionId;

/// Persistence backend for session state, execution logs and graph
/// definitions.
///
/// Implementations must make a single session's load-then-save atomic with
/// respect to other writers of the same session; last writer wins.
pub trait GraphStore: Send + Sync + 'static {
    /// Load the checkpointed state for a session, if any.
    fn load_execution_state(&self, sid: &SessionId)
        -> BoxFuture<'_, Result<Option<ExecutionState>>>;

    /// Replace the checkpointed state for a session.
    fn save_execution_state(
        &self,
        sid: &SessionId,
        state: &ExecutionState,
    ) -> BoxFuture<'_, Result<()>>;

    /// Append one record to the execution log.
    fn append_log(&self, entry: LogEntry) -> BoxFuture<'_, Result<()>>;

    /// Load a graph definition. With a tenant, only that tenant's graphs match.
    fn load_graph_definition(
        &self,
        graph_id: &str,
        tenant_id: Option<&str>,
    ) -> BoxFuture<'_, Result<Option<GraphDefinition>>>;

    /// Insert or update a definition, returning its id. A definition without
    /// an id is assigned a fresh one.
    fn save_graph_definition(
        &self,
        tenant_id: Option<&str>,
        definition: &GraphDefinition,
    ) -> BoxFuture<'_, Result<String>>;
}
