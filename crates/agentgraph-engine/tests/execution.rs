mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use agentgraph_core::{
    AgentGraphError, EngineEvent, GraphStore, Operator, Port, SessionId, ValueType,
};
use agentgraph_engine::{ExecutionContext, Graph, Node};
use agentgraph_store::SqliteStore;

use support::{registry, response, source};

fn graph() -> (Graph, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    (Graph::new(registry(runs.clone())), runs)
}

#[tokio::test]
async fn test_simple_pull_to_response() {
    let (mut graph, _) = graph();
    let src = source(&mut graph, json!("hello"));
    let out = response(&mut graph, &["answer"]);
    graph.connect(&src, "output", &out, "answer").unwrap();

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    assert!(ctx.error.is_none());
    assert_eq!(ctx.output["answer"], "hello");
}

#[tokio::test]
async fn test_shared_source_runs_once() {
    let (mut graph, runs) = graph();
    let src = source(&mut graph, json!("x"));
    let left = graph.add_node("relay", json!({})).unwrap();
    let right = graph.add_node("relay", json!({})).unwrap();
    let out = response(&mut graph, &["l", "r"]);
    graph.connect(&src, "output", &left, "input").unwrap();
    graph.connect(&src, "output", &right, "input").unwrap();
    graph.connect(&left, "output", &out, "l").unwrap();
    graph.connect(&right, "output", &out, "r").unwrap();

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.output["l"], "x");
    assert_eq!(ctx.output["r"], "x");
}

#[tokio::test]
async fn test_first_edge_wins_target_port() {
    let (mut graph, runs) = graph();
    let first = source(&mut graph, json!("first"));
    let second = source(&mut graph, json!("second"));
    let out = response(&mut graph, &["answer"]);
    graph.connect(&first, "output", &out, "answer").unwrap();
    graph.connect(&second, "output", &out, "answer").unwrap();

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    assert_eq!(ctx.output["answer"], "first");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_falsy_source_falls_back_to_default() {
    let (mut graph, _) = graph();
    let src = source(&mut graph, json!(""));
    let out = graph.add_node("response", json!({})).unwrap();
    graph
        .node_mut(&out)
        .unwrap()
        .add_port(Port::input("answer", ValueType::String).with_default(json!("fallback")));
    graph.connect(&src, "output", &out, "answer").unwrap();

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    assert_eq!(ctx.output["answer"], "fallback");
}

#[tokio::test]
async fn test_closed_gate_skips_node() {
    let (mut graph, _) = graph();
    let flag = source(&mut graph, json!(false));
    let relay = graph.add_node("relay", json!({})).unwrap();
    graph.node_mut(&relay).unwrap().add_port(
        Port::input("go", ValueType::Boolean)
            .gate()
            .with_condition(Operator::Equals, json!(true), Value::Null),
    );
    let out = graph.add_node("response", json!({})).unwrap();
    graph
        .node_mut(&out)
        .unwrap()
        .add_port(Port::input("answer", ValueType::String).with_default(json!("skipped")));
    graph.connect(&flag, "output", &relay, "go").unwrap();
    graph.connect(&relay, "output", &out, "answer").unwrap();

    let mut ctx = ExecutionContext::new();
    let mut rx = ctx.events.subscribe();
    graph.execute(&mut ctx).await;
    assert_eq!(ctx.output["answer"], "skipped");

    let mut skipped = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::NodeSkipped { node_id, .. } = event {
            skipped.push(node_id);
        }
    }
    assert_eq!(skipped, vec![relay.clone()]);

    graph
        .node_mut(&flag)
        .unwrap()
        .merge_parameters(json!({ "value": true }));
    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;
    assert_eq!(ctx.output["answer"], "ran");
}

#[tokio::test]
async fn test_unregistered_kind_fails_node() {
    let (mut graph, _) = graph();
    let ghost = graph.insert_node(
        Node::new("ghost").with_port(Port::output("output", ValueType::Unknown).system()),
    );
    let out = response(&mut graph, &["answer"]);
    graph.connect(&ghost, "output", &out, "answer").unwrap();

    let mut ctx = ExecutionContext::new();
    let mut rx = ctx.events.subscribe();
    graph.execute(&mut ctx).await;

    let error = ctx.error.expect("run should fail");
    assert!(error.contains("ghost"), "{error}");
    assert_eq!(graph.node(&ghost).unwrap().last_error.as_deref(), Some(error.as_str()));

    let mut failed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::NodeFailed { node_id, kind, .. } = event {
            failed.push((node_id, kind));
        }
    }
    assert_eq!(failed, vec![(ghost.clone(), "ghost".to_string())]);
}

#[tokio::test]
async fn test_repeated_runs_are_independent() {
    let (mut graph, runs) = graph();
    let src = source(&mut graph, json!("same"));
    let out = response(&mut graph, &["answer"]);
    graph.connect(&src, "output", &out, "answer").unwrap();

    let mut first = ExecutionContext::new();
    graph.execute(&mut first).await;
    let mut second = ExecutionContext::new();
    graph.execute(&mut second).await;

    assert_eq!(first.output, second.output);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_no_terminals_is_a_noop() {
    let (mut graph, runs) = graph();
    source(&mut graph, json!("unused"));

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    assert!(ctx.error.is_none());
    assert!(ctx.output.is_empty());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dangling_edge_ignored() {
    let (mut graph, _) = graph();
    let src = source(&mut graph, json!("gone"));
    let out = response(&mut graph, &["answer"]);
    graph.connect(&src, "output", &out, "answer").unwrap();
    graph.remove_node(&src);

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;

    assert!(ctx.error.is_none());
    assert_eq!(ctx.output["answer"], Value::Null);
}

#[tokio::test]
async fn test_session_state_persists_between_runs() {
    let (graph, _) = graph();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut graph = graph.with_store(store.clone());
    let counter = graph.add_node("counter", json!({})).unwrap();
    let out = response(&mut graph, &["count"]);
    graph.connect(&counter, "count", &out, "count").unwrap();

    let sid = SessionId::new();
    for expected in 1..=3 {
        let mut ctx = ExecutionContext::new().with_session(sid.clone());
        graph.execute(&mut ctx).await;
        assert_eq!(ctx.output["count"], json!(expected));
    }

    let saved = store.load_execution_state(&sid).await.unwrap().unwrap();
    assert_eq!(saved.nodes[&counter], json!({ "count": 3 }));
    assert_eq!(graph.execution_state, saved);
}

#[tokio::test]
async fn test_invalid_session_is_not_persisted() {
    let (graph, _) = graph();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut graph = graph.with_store(store.clone());
    let counter = graph.add_node("counter", json!({})).unwrap();
    let out = response(&mut graph, &["count"]);
    graph.connect(&counter, "count", &out, "count").unwrap();

    let sid = SessionId::from_string("not-a-uuid");
    for _ in 0..2 {
        let mut ctx = ExecutionContext::new().with_session(sid.clone());
        graph.execute(&mut ctx).await;
        assert_eq!(ctx.output["count"], json!(1));
    }
    assert!(store.load_execution_state(&sid).await.unwrap().is_none());
}

#[tokio::test]
async fn test_caller_state_wins_over_persisted() {
    let (graph, _) = graph();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut graph = graph.with_store(store.clone());
    let counter = graph.add_node("counter", json!({})).unwrap();
    let out = response(&mut graph, &["count"]);
    graph.connect(&counter, "count", &out, "count").unwrap();

    let sid = SessionId::new();
    let mut ctx = ExecutionContext::new().with_session(sid.clone());
    graph.execute(&mut ctx).await;
    assert_eq!(ctx.output["count"], json!(1));

    let mut ctx = ExecutionContext::new().with_session(sid.clone());
    ctx.execution_state
        .nodes
        .insert(counter.clone(), json!({ "count": 10 }));
    graph.execute(&mut ctx).await;
    assert_eq!(ctx.output["count"], json!(11));
}

#[tokio::test]
async fn test_failure_is_recorded_and_state_saved() {
    let (graph, _) = graph();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut graph = graph.with_store(store.clone());
    graph.id = Some("g-fail".into());
    let counter = graph.add_node("counter", json!({})).unwrap();
    let fail = graph.add_node("fail", json!({})).unwrap();
    let out = response(&mut graph, &["count", "broken"]);
    graph.connect(&counter, "count", &out, "count").unwrap();
    graph.connect(&fail, "output", &out, "broken").unwrap();

    let sid = SessionId::new();
    let mut ctx = ExecutionContext::new()
        .with_session(sid.clone())
        .with_input(json!({ "q": "why" }));
    graph.execute(&mut ctx).await;

    let error = ctx.error.clone().unwrap();
    assert!(error.contains("exploded"), "{error}");
    assert!(ctx.current_node.is_none());
    assert!(graph.node(&fail).unwrap().last_error.is_some());

    let logs = store.recent_logs(Some("g-fail"), 10).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].node_id.as_deref(), Some(fail.as_str()));
    assert_eq!(logs[0].detail, Some(json!({ "input": { "q": "why" } })));

    let saved = store.load_execution_state(&sid).await.unwrap().unwrap();
    assert_eq!(saved.nodes[&counter], json!({ "count": 1 }));
}

#[tokio::test]
async fn test_deadline_aborts_run() {
    let (mut graph, _) = graph();
    let slow = graph.add_node("slow", json!({})).unwrap();
    let out = response(&mut graph, &["answer"]);
    graph.connect(&slow, "output", &out, "answer").unwrap();

    let mut ctx = ExecutionContext::new().with_deadline(Some(Duration::from_millis(50)));
    graph.execute(&mut ctx).await;

    let error = ctx.error.unwrap();
    assert!(error.contains("deadline"), "{error}");
    assert!(graph.node(&slow).is_some());
    assert!(ctx.output.is_empty());
}

#[tokio::test]
async fn test_cancelled_run() {
    let (mut graph, _) = graph();
    let slow = graph.add_node("slow", json!({})).unwrap();
    let out = response(&mut graph, &["answer"]);
    graph.connect(&slow, "output", &out, "answer").unwrap();

    let mut ctx = ExecutionContext::new();
    ctx.cancel.cancel();
    graph.execute(&mut ctx).await;

    assert_eq!(ctx.error.as_deref(), Some("Run cancelled"));
    assert_eq!(
        graph.node(&slow).unwrap().last_error.as_deref(),
        Some("Run cancelled")
    );
}

#[tokio::test]
async fn test_debug_run_adopts_debug_session() {
    let (graph, _) = graph();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let mut graph = graph.with_store(store.clone());
    let debug_sid = SessionId::new();
    graph.debug_session_id = Some(debug_sid.0.clone());
    let counter = graph.add_node("counter", json!({})).unwrap();
    let out = response(&mut graph, &["count"]);
    graph.connect(&counter, "count", &out, "count").unwrap();

    let mut ctx = ExecutionContext::new().with_debug(true);
    graph.execute(&mut ctx).await;
    assert_eq!(ctx.session_id.as_ref(), Some(&debug_sid));
    assert!(store.load_execution_state(&debug_sid).await.unwrap().is_some());

    let mut ctx = ExecutionContext::new();
    graph.execute(&mut ctx).await;
    assert!(ctx.session_id.is_none());
}

#[tokio::test]
async fn test_versions_restore_earlier_shape() {
    let (mut graph, _) = graph();
    graph.id = Some("g-versions".into());
    let src = source(&mut graph, json!("v1"));
    let out = response(&mut graph, &["answer"]);
    graph.connect(&src, "output", &out, "answer").unwrap();
    graph.save_version("first");

    graph
        .node_mut(&src)
        .unwrap()
        .merge_parameters(json!({ "value": "v2" }));
    graph.save_version("second");

    assert_eq!(graph.versions()[0].title, "second");
    assert_eq!(graph.versions()[1].title, "first");

    let mut old = graph.load_version(1).unwrap();
    assert_eq!(old.id.as_deref(), Some("g-versions"));
    assert_eq!(old.versions().len(), 2);

    let mut ctx = ExecutionContext::new();
    old.execute(&mut ctx).await;
    assert_eq!(ctx.output["answer"], "v1");

    let err = graph.load_version(5).unwrap_err();
    assert!(matches!(err, AgentGraphError::VersionNotFound(5)));
}
