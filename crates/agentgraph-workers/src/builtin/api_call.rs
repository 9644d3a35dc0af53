use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use agentgraph_core::{AgentGraphError, Credentials, Port, Result, ValueType, WorkerCategory};
use agentgraph_engine::value::{is_truthy, to_number, to_text};
use agentgraph_engine::{kinds, Node, WorkerKind, WorkerScope};

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Header names never taken from the `headers` parameter; credentials are
/// applied through `authType` only.
const RESERVED_HEADERS: &[&str] = &["authorization", "x-api-key"];

/// Outbound HTTP call.
///
/// Setup problems (no endpoint, malformed `params`/`headers`, missing
/// credential) fail the node. Transport failures and non-2xx statuses are
/// reported on the `error` port instead.
pub struct ApiCallWorker {
    client: reqwest::Client,
}

impl ApiCallWorker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ApiCallWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq)]
enum Auth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
    ApiKey(String),
}

#[derive(Debug)]
struct RequestPlan {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    timeout: Duration,
    auth: Auth,
}

impl WorkerKind for ApiCallWorker {
    fn kind(&self) -> &str {
        kinds::API_CALL
    }

    fn title(&self) -> &str {
        "API Call"
    }

    fn category(&self) -> WorkerCategory {
        WorkerCategory::Io
    }

    fn description(&self) -> &str {
        "Calls an external HTTP API"
    }

    fn create(&self) -> Node {
        Node::new(kinds::API_CALL)
            .with_parameters(json!({
                "endpoint": "",
                "method": "GET",
                "params": "{}",
                "headers": "{}",
                "timeout": DEFAULT_TIMEOUT_MS,
                "authType": "none",
                "username": "",
                "selectedKeyName": "",
            }))
            .with_port(Port::input("body", ValueType::String).system())
            .with_port(Port::output("response", ValueType::String).system())
            .with_port(Port::output("error", ValueType::String).system())
            .with_port(Port::input("condition", ValueType::Unknown).gate().system())
            .with_port(Port::input("endpointUrlInput", ValueType::String).system())
    }

    fn execute<'a>(&'a self, node: &'a mut Node, scope: WorkerScope<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let plan = plan_request(node, &scope.ctx.credentials)?;
            debug!(node_id = %node.id, method = %plan.method, url = %plan.url, "Calling API");

            node.set_value("error", json!(""))?;
            let outcome = tokio::select! {
                outcome = self.send(plan) => outcome,
                _ = scope.ctx.cancel.cancelled() => return Err(AgentGraphError::Cancelled),
            };
            match outcome {
                Ok(value) => node.set_value("response", value),
                Err(message) => {
                    warn!(node_id = %node.id, error = %message, "API call failed");
                    node.set_value("response", json!(""))?;
                    node.set_value("error", json!(message))
                }
            }
        })
    }
}

impl ApiCallWorker {
    async fn send(&self, plan: RequestPlan) -> std::result::Result<Value, String> {
        let has_content_type = plan
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));

        let mut req = self
            .client
            .request(plan.method, &plan.url)
            .timeout(plan.timeout);
        if !plan.query.is_empty() {
            req = req.query(&plan.query);
        }
        for (name, value) in &plan.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req = match plan.auth {
            Auth::None => req,
            Auth::Bearer(token) => req.bearer_auth(token),
            Auth::Basic { username, password } => req.basic_auth(username, Some(password)),
            Auth::ApiKey(key) => req.header("X-API-Key", key),
        };
        req = match plan.body {
            None => req,
            Some(Value::String(text)) => {
                let trimmed = text.trim_start();
                if !has_content_type && (trimmed.starts_with('{') || trimmed.starts_with('[')) {
                    req = req.header(CONTENT_TYPE, "application/json");
                }
                req.body(text)
            }
            Some(other) => req.json(&other),
        };

        let resp = req
            .send()
            .await
            .map_err(|e| format!("No response received or request setup failed: {e}"))?;

        let status = resp.status();
        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        let text = resp
            .text()
            .await
            .map_err(|e| format!("Failed to read response body: {e}"))?;
        let reason = status.canonical_reason().unwrap_or("Error");

        if !status.is_success() {
            let mut message = format!(
                "Request failed with status code {} ({})",
                status.as_u16(),
                reason
            );
            if !text.is_empty() {
                message.push_str(&format!(" (Response Data: {text})"));
            }
            return Err(message);
        }

        if text.is_empty() {
            return Ok(json!(format!(
                "Request successful: {} {}",
                status.as_u16(),
                reason
            )));
        }
        if is_json {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                return Ok(value);
            }
        }
        Ok(Value::String(text))
    }
}

fn plan_request(node: &Node, credentials: &Credentials) -> Result<RequestPlan> {
    let runtime_endpoint = to_text(node.value("endpointUrlInput"));
    let url = match runtime_endpoint.trim() {
        "" => node.param_str("endpoint").unwrap_or_default().trim().to_string(),
        url => url.to_string(),
    };
    if url.is_empty() {
        return Err(AgentGraphError::config(
            &node.id,
            "API endpoint is required, either on the endpointUrlInput port or the endpoint parameter",
        ));
    }

    let method_name = node.param_str("method").unwrap_or("GET").to_uppercase();
    let method = Method::from_bytes(method_name.as_bytes())
        .map_err(|_| AgentGraphError::config(&node.id, format!("invalid method '{method_name}'")))?;

    let query = string_pairs(node, "params")?;
    let headers = string_pairs(node, "headers")?
        .into_iter()
        .filter(|(k, _)| !RESERVED_HEADERS.contains(&k.to_ascii_lowercase().as_str()))
        .collect();

    let timeout = node
        .param("timeout")
        .and_then(to_number)
        .filter(|ms| *ms > 0.0)
        .map(|ms| ms as u64)
        .unwrap_or(DEFAULT_TIMEOUT_MS);

    let body = node.value("body");
    let body = (method != Method::GET && is_truthy(body)).then(|| body.clone());

    Ok(RequestPlan {
        method,
        url,
        query,
        headers,
        body,
        timeout: Duration::from_millis(timeout),
        auth: resolve_auth(node, credentials)?,
    })
}

/// A parameter holding a JSON object, given either as an object or as its
/// JSON text, flattened to string pairs.
fn string_pairs(node: &Node, key: &str) -> Result<Vec<(String, String)>> {
    let invalid = || AgentGraphError::config(&node.id, format!("invalid {key} JSON"));
    let object: Map<String, Value> = match node.param(key) {
        None => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(text)) if text.trim().is_empty() => Map::new(),
        Some(Value::String(text)) => match serde_json::from_str(text) {
            Ok(Value::Object(map)) => map,
            _ => return Err(invalid()),
        },
        Some(_) => return Err(invalid()),
    };
    Ok(object.into_iter().map(|(k, v)| (k, to_text(&v))).collect())
}

fn resolve_auth(node: &Node, credentials: &Credentials) -> Result<Auth> {
    let auth_type = node.param_str("authType").unwrap_or("none");
    if auth_type.is_empty() || auth_type == "none" {
        return Ok(Auth::None);
    }

    let key_name = node.param_str("selectedKeyName").unwrap_or_default();
    if key_name.is_empty() {
        return Err(AgentGraphError::config(
            &node.id,
            format!("auth type '{auth_type}' needs a selectedKeyName"),
        ));
    }
    let secret = lookup_secret(key_name, credentials).ok_or_else(|| {
        AgentGraphError::config(
            &node.id,
            format!("credential '{key_name}' not found in environment or tenant credentials"),
        )
    })?;

    match auth_type {
        "bearer" => Ok(Auth::Bearer(secret)),
        "basic" => {
            let username = node.param_str("username").unwrap_or_default();
            if username.is_empty() {
                return Err(AgentGraphError::config(&node.id, "basic auth needs a username"));
            }
            Ok(Auth::Basic {
                username: username.to_string(),
                password: secret,
            })
        }
        "apiKey" | "api_key" => Ok(Auth::ApiKey(secret)),
        other => {
            warn!(node_id = %node.id, auth_type = %other, "Unknown auth type, sending without credentials");
            Ok(Auth::None)
        }
    }
}

/// Process environment first, then the tenant's credentials.
fn lookup_secret(name: &str, credentials: &Credentials) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| credentials.get(name).cloned())
}
