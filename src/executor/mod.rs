/// Request execution: one tool invocation becomes exactly one outbound
/// HTTP transaction (two when the auth provider asks for the single
/// permitted retry after a 401/403).
///
/// Binding walks the tool's parameter metadata to place caller arguments
/// into path/query/header/cookie/body locations. Header safety is enforced
/// before anything leaves the process: CR/LF injection, system-controlled
/// headers, and collisions with provider-supplied auth headers all reject
/// the call without issuing a request.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{AuthFailure, AuthProvider};
use crate::registry::{MetaKind, ToolRegistry};
use crate::synth::{ParamLocation, ToolMeta};
use crate::toolid;
use crate::utils::http::{
    MAX_REQUEST_BYTES, MAX_RESPONSE_BYTES, REQUEST_TIMEOUT_SECS, limited_text, outbound_client,
};
use crate::utils::truncate_chars;

/// Fixed replacement for 401/403 response bodies. Auth failures routinely
/// echo tokens or account details back; callers get this marker instead.
pub const AUTH_REDACTION: &str = "[Authentication/Authorization error — details redacted]";

/// Non-auth error bodies are cut at this many characters.
const MAX_ERROR_BODY_CHARS: usize = 1000;

/// Cap on the body handed to `handle_auth_error` for context.
const MAX_AUTH_CONTEXT_BYTES: usize = 4096;

/// Headers owned by the transport layer. Letting a caller set any of these
/// opens request smuggling or host-header injection.
const SYSTEM_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "transfer-encoding",
    "connection",
    "upgrade",
    "te",
    "trailer",
    "proxy-connection",
    "keep-alive",
];

/// Methods whose undeclared arguments go to the query string rather than
/// the request body.
const QUERY_METHODS: &[&str] = &["GET", "DELETE", "HEAD", "OPTIONS"];

/// Per-call failures. All of these surface inside the MCP result with
/// `isError: true` — never as transport errors.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Missing required path parameter '{0}'")]
    MissingParameter(String),

    #[error("Header '{0}' contains CR or LF characters")]
    HeaderInjection(String),

    #[error("Header '{0}' is system-controlled and cannot be supplied by callers")]
    SystemHeaderConflict(String),

    #[error("Header '{0}' conflicts with the configured auth provider")]
    AuthHeaderConflict(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown API endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("Request body exceeds the {MAX_REQUEST_BYTES}-byte limit")]
    BodyTooLarge,

    #[error("Upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Request timed out after {0} s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// A fully bound outbound request, ready to send (and re-send on the one
/// permitted auth retry).
#[derive(Debug)]
struct BoundRequest {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Option<Value>,
}

pub struct RequestExecutor {
    client: reqwest::Client,
    base_url: Url,
    auth: Option<Arc<dyn AuthProvider>>,
    registry: Arc<ToolRegistry>,
}

impl RequestExecutor {
    pub fn new(
        base_url: Url,
        auth: Option<Arc<dyn AuthProvider>>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            client: outbound_client(),
            base_url,
            auth,
            registry,
        }
    }

    /// Execute one OpenAPI-synthesised tool call.
    pub async fn execute(&self, tool: &ToolMeta, args: &Value) -> Result<String, ExecError> {
        let bound = self.bind(tool, args)?;
        self.send(&tool.name, bound).await
    }

    /// Execute one of the dynamic-mode meta-tools.
    pub async fn execute_meta(&self, kind: MetaKind, args: &Value) -> Result<String, ExecError> {
        match kind {
            MetaKind::ListEndpoints => {
                let endpoints: Vec<Value> = self
                    .registry
                    .catalog()
                    .iter()
                    .map(|t| {
                        json!({
                            "path": t.original_path,
                            "method": t.http_method,
                            "summary": t.description,
                        })
                    })
                    .collect();
                serde_json::to_string_pretty(&endpoints)
                    .map_err(|e| ExecError::Internal(e.into()))
            }
            MetaKind::GetSchema => {
                let tool = self.resolve_endpoint(args)?;
                serde_json::to_string_pretty(&tool.input_schema)
                    .map_err(|e| ExecError::Internal(e.into()))
            }
            MetaKind::Invoke => {
                let tool = self.resolve_endpoint(args)?;
                let params = args.get("params").cloned().unwrap_or_else(|| json!({}));
                self.execute(&tool, &params).await
            }
        }
    }

    fn resolve_endpoint(&self, args: &Value) -> Result<Arc<ToolMeta>, ExecError> {
        let endpoint = args
            .get("endpoint")
            .and_then(Value::as_str)
            .ok_or_else(|| ExecError::InvalidArguments("missing 'endpoint'".into()))?;
        let method = args.get("method").and_then(Value::as_str);
        self.registry
            .find_operation(endpoint, method)
            .ok_or_else(|| ExecError::UnknownEndpoint(endpoint.to_string()))
    }

    /// Bind caller arguments into request locations. Pure — no I/O, so a
    /// rejected call provably never reaches the network.
    fn bind(&self, tool: &ToolMeta, args: &Value) -> Result<BoundRequest, ExecError> {
        // The id is authoritative for the method; it round-trips the path too
        let (method, _) = toolid::decode(&tool.id)
            .map_err(|e| ExecError::Internal(anyhow::anyhow!("bad tool id: {}", e)))?;

        let empty = Map::new();
        let args_map = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(ExecError::InvalidArguments(
                    "tool arguments must be an object".into(),
                ));
            }
        };

        let mut path = tool.original_path.clone();
        let mut query = Vec::new();
        let mut headers = Vec::new();
        let mut cookies = Vec::new();
        let mut body_map = Map::new();
        let mut body_value: Option<Value> = None;
        let mut consumed: HashSet<&str> = HashSet::new();

        for param in &tool.params {
            let value = args_map.get(&param.name).filter(|v| !v.is_null());
            match param.location {
                ParamLocation::Path => {
                    let Some(value) = value else {
                        if param.required {
                            return Err(ExecError::MissingParameter(param.name.clone()));
                        }
                        continue;
                    };
                    path = toolid::interpolate(&path, &param.name, &scalar(value));
                    consumed.insert(param.name.as_str());
                }
                ParamLocation::Query => {
                    if let Some(value) = value {
                        query.push((param.name.clone(), scalar(value)));
                        consumed.insert(param.name.as_str());
                    }
                }
                ParamLocation::Header => {
                    if let Some(value) = value {
                        headers.push((param.name.clone(), scalar(value)));
                        consumed.insert(param.name.as_str());
                    }
                }
                ParamLocation::Cookie => {
                    if let Some(value) = value {
                        cookies.push((param.name.clone(), scalar(value)));
                        consumed.insert(param.name.as_str());
                    }
                }
                ParamLocation::Body => {
                    if let Some(value) = value {
                        body_value = Some(value.clone());
                        consumed.insert(param.name.as_str());
                    }
                }
            }
        }

        for (schema_key, field) in &tool.body_fields {
            if let Some(value) = args_map.get(schema_key).filter(|v| !v.is_null()) {
                body_map.insert(field.clone(), value.clone());
                consumed.insert(schema_key.as_str());
            }
        }

        // Undeclared arguments: query for read-style methods, body otherwise.
        // A non-object body set via the synthesised `body` property cannot
        // absorb extra keys, so those spill to the query string too.
        let non_object_body = body_value.as_ref().is_some_and(|v| !v.is_object());
        for (key, value) in args_map {
            if consumed.contains(key.as_str()) || value.is_null() {
                continue;
            }
            if QUERY_METHODS.contains(&method.as_str()) || non_object_body {
                query.push((key.clone(), scalar(value)));
            } else {
                body_map.insert(key.clone(), value.clone());
            }
        }

        let body = match body_value {
            Some(Value::Object(mut obj)) => {
                for (k, v) in body_map {
                    obj.entry(k).or_insert(v);
                }
                Some(Value::Object(obj))
            }
            Some(other) => Some(other),
            None if !body_map.is_empty() => Some(Value::Object(body_map)),
            None => None,
        };

        let bound = BoundRequest {
            method,
            path,
            query,
            headers,
            cookies,
            body,
        };
        self.check_headers(&bound)?;
        Ok(bound)
    }

    /// The header-safety contract. Runs before any network activity.
    fn check_headers(&self, bound: &BoundRequest) -> Result<(), ExecError> {
        for (name, value) in bound.headers.iter().chain(bound.cookies.iter()) {
            if has_crlf(name) || has_crlf(value) {
                return Err(ExecError::HeaderInjection(name.clone()));
            }
        }
        for (name, _) in &bound.headers {
            if is_system_header(name) {
                return Err(ExecError::SystemHeaderConflict(name.clone()));
            }
            // The authorization/cookie back-door only exists without a provider
            if self.auth.is_some()
                && (name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case("cookie"))
            {
                return Err(ExecError::AuthHeaderConflict(name.clone()));
            }
        }
        Ok(())
    }

    /// Send the bound request, consulting the auth provider and retrying
    /// at most once on 401/403.
    async fn send(&self, tool_name: &str, bound: BoundRequest) -> Result<String, ExecError> {
        let mut retried = false;
        loop {
            let auth_headers = match &self.auth {
                Some(provider) => provider
                    .auth_headers()
                    .await
                    .map_err(ExecError::Internal)?,
                None => HashMap::new(),
            };

            // Provider headers vs caller headers: reject rather than guess
            for (name, _) in &bound.headers {
                if auth_headers.keys().any(|k| k.eq_ignore_ascii_case(name)) {
                    return Err(ExecError::AuthHeaderConflict(name.clone()));
                }
            }
            if !bound.cookies.is_empty()
                && auth_headers.keys().any(|k| k.eq_ignore_ascii_case("cookie"))
            {
                return Err(ExecError::AuthHeaderConflict("cookie".into()));
            }

            let resp = self.send_once(&bound, &auth_headers).await?;
            let status = resp.status().as_u16();

            if status == 401 || status == 403 {
                if !retried && let Some(provider) = &self.auth {
                    let message = limited_text(resp, MAX_AUTH_CONTEXT_BYTES)
                        .await
                        .unwrap_or_default();
                    let failure = AuthFailure { status, message };
                    let retry = provider
                        .handle_auth_error(&failure)
                        .await
                        .map_err(ExecError::Internal)?;
                    if retry {
                        debug!("tool {}: retrying once after HTTP {}", tool_name, status);
                        retried = true;
                        continue;
                    }
                }
                return Err(ExecError::Upstream {
                    status,
                    message: AUTH_REDACTION.to_string(),
                });
            }

            if !(200..300).contains(&status) {
                let text = limited_text(resp, MAX_RESPONSE_BYTES).await.unwrap_or_default();
                return Err(ExecError::Upstream {
                    status,
                    message: truncate_chars(&text, MAX_ERROR_BODY_CHARS, "… [truncated]"),
                });
            }

            debug!("tool {}: HTTP {} from upstream", tool_name, status);
            return limited_text(resp, MAX_RESPONSE_BYTES)
                .await
                .map_err(|e| ExecError::Network(e.to_string()));
        }
    }

    async fn send_once(
        &self,
        bound: &BoundRequest,
        auth_headers: &HashMap<String, String>,
    ) -> Result<reqwest::Response, ExecError> {
        let method = reqwest::Method::from_bytes(bound.method.as_bytes())
            .map_err(|e| ExecError::Internal(anyhow::anyhow!("bad method: {}", e)))?;
        let url = self.build_url(&bound.path);

        let mut req = self.client.request(method, url);
        if !bound.query.is_empty() {
            req = req.query(&bound.query);
        }
        for (name, value) in &bound.headers {
            req = req.header(name, value);
        }
        if !bound.cookies.is_empty() {
            let cookie = bound
                .cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            req = req.header("Cookie", cookie);
        }
        // Auth headers merge over the bound set; the system-controlled
        // block applies to providers too
        for (name, value) in auth_headers {
            if is_system_header(name) {
                warn!("auth provider tried to set system header '{}', skipping", name);
                continue;
            }
            req = req.header(name, value);
        }
        if let Some(body) = &bound.body {
            let bytes =
                serde_json::to_vec(body).map_err(|e| ExecError::Internal(e.into()))?;
            if bytes.len() > MAX_REQUEST_BYTES {
                return Err(ExecError::BodyTooLarge);
            }
            req = req.header("Content-Type", "application/json").body(bytes);
        }

        req.send().await.map_err(|e| {
            if e.is_timeout() {
                ExecError::Timeout(REQUEST_TIMEOUT_SECS)
            } else {
                ExecError::Network(e.to_string())
            }
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Render an argument for a path/query/header/cookie slot. Arrays are
/// comma-joined; everything else uses its JSON scalar form.
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn has_crlf(s: &str) -> bool {
    s.contains('\r') || s.contains('\n')
}

fn is_system_header(name: &str) -> bool {
    SYSTEM_HEADERS
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}
