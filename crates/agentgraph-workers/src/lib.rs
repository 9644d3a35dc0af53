//! Built-in node kinds.
//!
//! These are the kinds every AgentGraph process registers at startup:
//! request and response endpoints, static content, combining, debugging
//! aids, per-session persistence, outbound HTTP and sub-graph references.

pub mod builtin;

use agentgraph_engine::WorkerRegistry;

/// Register every built-in kind.
pub fn register_builtins(registry: &mut WorkerRegistry) {
    // ── Endpoints ───────────────────────────────────────────────
    registry.register(builtin::io::RequestWorker);
    registry.register(builtin::io::ResponseWorker);

    // ── Content & shaping ───────────────────────────────────────
    registry.register(builtin::text::TextWorker);
    registry.register(builtin::combine::CombineWorker);
    registry.register(builtin::state::StateWorker);

    // ── Debugging ───────────────────────────────────────────────
    registry.register(builtin::debug::DisplayWorker);
    registry.register(builtin::debug::MockWorker);

    // ── External ────────────────────────────────────────────────
    registry.register(builtin::api_call::ApiCallWorker::new());
    registry.register(builtin::agent_reference::AgentReferenceWorker);
}

/// A registry holding every built-in kind.
pub fn builtin_registry() -> WorkerRegistry {
    let mut registry = WorkerRegistry::new();
    register_builtins(&mut registry);
    registry
}
