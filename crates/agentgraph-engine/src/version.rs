use chrono::Utc;
use tracing::info;

use agentgraph_core::{AgentGraphError, Result, VersionSnapshot};

use crate::graph::Graph;

impl Graph {
    /// Snapshot the graph's current shape as the newest version.
    pub fn save_version(&mut self, title: impl Into<String>) {
        let snapshot = VersionSnapshot {
            title: title.into(),
            timestamp: Utc::now(),
            serialized_graph: self.export_shape(),
        };
        info!(graph = ?self.id, version = %snapshot.title, "Version saved");
        self.versions.insert(0, snapshot);
    }

    /// Saved versions, newest first.
    pub fn versions(&self) -> &[VersionSnapshot] {
        &self.versions
    }

    /// Rebuild the graph as it was at version `index` (0 is newest). The
    /// result keeps this graph's id, store and full version list.
    pub fn load_version(&self, index: usize) -> Result<Graph> {
        let snapshot = self
            .versions
            .get(index)
            .ok_or(AgentGraphError::VersionNotFound(index))?;

        let mut def = snapshot.serialized_graph.clone();
        def.id = self.id.clone();
        def.versions = self.versions.clone();

        let mut graph = Graph::from_definition(def, self.registry.clone(), self.config.clone())?;
        graph.store = self.store.clone();
        Ok(graph)
    }
}
