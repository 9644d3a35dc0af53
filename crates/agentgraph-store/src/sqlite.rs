use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use agentgraph_core::error::{AgentGraphError, Result};
use agentgraph_core::traits::GraphStore;
use agentgraph_core::{ExecutionState, GraphDefinition, LogEntry, LogLevel, SessionId};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS execution_states (
        session_id TEXT PRIMARY KEY,
        state TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS execution_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        level TEXT NOT NULL,
        graph_id TEXT,
        session_id TEXT,
        node_id TEXT,
        message TEXT NOT NULL,
        detail TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_logs_graph ON execution_logs(graph_id, id);

    CREATE TABLE IF NOT EXISTS graphs (
        id TEXT PRIMARY KEY,
        tenant_id TEXT,
        title TEXT NOT NULL,
        definition TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_graphs_tenant ON graphs(tenant_id);";

/// One row of the graph listing.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    pub id: String,
    pub tenant_id: Option<String>,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed store for session state, execution logs and graphs.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AgentGraphError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Graphs visible to a tenant, most recently updated first. Without a
    /// tenant every graph is listed.
    pub fn list_graphs(&self, tenant_id: Option<&str>) -> Result<Vec<GraphSummary>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, tenant_id, title, updated_at FROM graphs
                 WHERE ?1 IS NULL OR tenant_id = ?1
                 ORDER BY updated_at DESC, id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![tenant_id], |row| {
                let ts: String = row.get(3)?;
                Ok(GraphSummary {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    title: row.get(2)?,
                    updated_at: parse_ts(&ts),
                })
            })
            .map_err(db_err)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    /// Delete a graph. Returns whether a row was removed.
    pub fn delete_graph(&self, graph_id: &str, tenant_id: Option<&str>) -> Result<bool> {
        let conn = self.conn.lock().map_err(db_err)?;
        let deleted = conn
            .execute(
                "DELETE FROM graphs WHERE id = ?1 AND (?2 IS NULL OR tenant_id = ?2)",
                params![graph_id, tenant_id],
            )
            .map_err(db_err)?;
        Ok(deleted > 0)
    }

    /// Most recent log entries, newest first, optionally for one graph.
    pub fn recent_logs(&self, graph_id: Option<&str>, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, level, graph_id, session_id, node_id, message, detail
                 FROM execution_logs
                 WHERE ?1 IS NULL OR graph_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![graph_id, limit as i64], |row| {
                let ts: String = row.get(0)?;
                let level: String = row.get(1)?;
                let detail: Option<String> = row.get(6)?;
                Ok(LogEntry {
                    timestamp: parse_ts(&ts),
                    level: parse_level(&level),
                    graph_id: row.get(2)?,
                    session_id: row.get(3)?,
                    node_id: row.get(4)?,
                    message: row.get(5)?,
                    detail: detail.and_then(|d| serde_json::from_str(&d).ok()),
                })
            })
            .map_err(db_err)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    /// Drop a session's checkpointed state.
    pub fn delete_execution_state(&self, sid: &SessionId) -> Result<bool> {
        let conn = self.conn.lock().map_err(db_err)?;
        let deleted = conn
            .execute(
                "DELETE FROM execution_states WHERE session_id = ?1",
                params![sid.0],
            )
            .map_err(db_err)?;
        Ok(deleted > 0)
    }
}

impl GraphStore for SqliteStore {
    fn load_execution_state(
        &self,
        sid: &SessionId,
    ) -> BoxFuture<'_, Result<Option<ExecutionState>>> {
        let sid = sid.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let raw: Option<String> = conn
                .query_row(
                    "SELECT state FROM execution_states WHERE session_id = ?1",
                    params![sid],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;

            raw.map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(AgentGraphError::from)
        })
    }

    fn save_execution_state(
        &self,
        sid: &SessionId,
        state: &ExecutionState,
    ) -> BoxFuture<'_, Result<()>> {
        let sid = sid.0.clone();
        let state = serde_json::to_string(state);

        Box::pin(async move {
            let state = state?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO execution_states (session_id, state, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id) DO UPDATE SET
                     state = excluded.state,
                     updated_at = excluded.updated_at",
                params![sid, state, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
            debug!(session = %sid, "Execution state saved");
            Ok(())
        })
    }

    fn append_log(&self, entry: LogEntry) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let detail = entry
                .detail
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO execution_logs
                     (timestamp, level, graph_id, session_id, node_id, message, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.timestamp.to_rfc3339(),
                    level_str(entry.level),
                    entry.graph_id,
                    entry.session_id,
                    entry.node_id,
                    entry.message,
                    detail,
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn load_graph_definition(
        &self,
        graph_id: &str,
        tenant_id: Option<&str>,
    ) -> BoxFuture<'_, Result<Option<GraphDefinition>>> {
        let graph_id = graph_id.to_string();
        let tenant_id = tenant_id.map(String::from);

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let raw: Option<String> = conn
                .query_row(
                    "SELECT definition FROM graphs
                     WHERE id = ?1 AND (?2 IS NULL OR tenant_id = ?2)",
                    params![graph_id, tenant_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;

            let Some(raw) = raw else {
                return Ok(None);
            };
            // Parsed from text so edge order follows the stored document.
            let mut def: GraphDefinition = serde_json::from_str(&raw)?;
            def.id = Some(graph_id);
            Ok(Some(def))
        })
    }

    fn save_graph_definition(
        &self,
        tenant_id: Option<&str>,
        definition: &GraphDefinition,
    ) -> BoxFuture<'_, Result<String>> {
        let tenant_id = tenant_id.map(String::from);
        let mut definition = definition.clone();

        Box::pin(async move {
            let id = definition
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            definition.id = Some(id.clone());
            let raw = serde_json::to_string(&definition)?;

            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO graphs (id, tenant_id, title, definition, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     tenant_id = excluded.tenant_id,
                     title = excluded.title,
                     definition = excluded.definition,
                     updated_at = excluded.updated_at",
                params![id, tenant_id, definition.title, raw, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
            debug!(graph_id = %id, "Graph definition saved");
            Ok(id)
        })
    }
}

fn db_err(e: impl std::fmt::Display) -> AgentGraphError {
    AgentGraphError::Database(e.to_string())
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn level_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn parse_level(s: &str) -> LogLevel {
    match s {
        "debug" => LogLevel::Debug,
        "info" => LogLevel::Info,
        "warn" => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}
