use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use agentgraph_core::{Credentials, EventBus, ExecutionState, SessionId};

/// Per-run execution context.
///
/// Callers fill in the input payload, session and credentials; the engine
/// fills in the output payload, state and error. One context is used for
/// one [`crate::Graph::execute`] call at a time.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Named inputs read by request nodes.
    pub input: Map<String, Value>,
    /// Named outputs written by response nodes.
    pub output: Map<String, Value>,
    /// Provider secrets for the calling tenant.
    pub credentials: Credentials,
    /// Cross-run state for this session.
    pub execution_state: ExecutionState,
    pub session_id: Option<SessionId>,
    /// Debug runs let debug-only kinds such as `mock` act.
    pub is_debug: bool,
    /// Log sink for run and node events.
    pub events: EventBus,
    /// Node whose strategy is running, for diagnostics.
    pub current_node: Option<String>,
    /// Set when the run failed.
    pub error: Option<String>,
    pub cancel: CancellationToken,
    /// Wall-clock limit for one run.
    pub deadline: Option<Duration>,
    pub(crate) deadline_at: Option<Instant>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `input` as the input payload. Non-object values are ignored.
    pub fn with_input(mut self, input: Value) -> Self {
        if let Value::Object(map) = input {
            self.input = map;
        }
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_debug(mut self, is_debug: bool) -> Self {
        self.is_debug = is_debug;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn credential(&self, name: &str) -> Option<&str> {
        self.credentials.get(name).map(String::as_str)
    }

    /// The session id, if it may be used as a store key.
    pub fn persistable_session(&self) -> Option<&SessionId> {
        self.session_id.as_ref().filter(|s| s.is_valid())
    }

    /// Time left before the run deadline, if one is running.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// A context for a nested run sharing this run's credentials,
    /// cancellation and remaining time.
    pub fn child(&self, input: Map<String, Value>) -> Self {
        Self {
            input,
            credentials: self.credentials.clone(),
            events: self.events.clone(),
            cancel: self.cancel.child_token(),
            deadline: self.remaining().or(self.deadline),
            ..Self::default()
        }
    }
}
