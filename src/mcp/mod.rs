/// MCP method dispatch.
///
/// One router handles the protocol surface: `initialize`, `ping`,
/// `tools/list`, `tools/call`, and the prompt/resource methods. Everything
/// a tool does wrong is reported *inside* its `tools/call` result
/// (`isError: true`) — JSON-RPC errors are reserved for protocol-level
/// failures like unknown methods or unknown tools.
pub mod prompts;
pub mod resources;
pub mod rpc;

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::executor::RequestExecutor;
use crate::registry::{ToolKind, ToolRegistry};

pub use prompts::{Prompt, PromptArgument, PromptStore};
pub use resources::{Resource, ResourceStore};
pub use rpc::{JsonRpcRequest, JsonRpcResponse, codes};

/// Protocol revision this server speaks by default.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct McpDispatcher {
    registry: Arc<ToolRegistry>,
    executor: Arc<RequestExecutor>,
    prompts: Arc<PromptStore>,
    resources: Arc<ResourceStore>,
}

impl McpDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        executor: Arc<RequestExecutor>,
        prompts: Arc<PromptStore>,
        resources: Arc<ResourceStore>,
    ) -> Self {
        Self {
            registry,
            executor,
            prompts,
            resources,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn prompts(&self) -> &Arc<PromptStore> {
        &self.prompts
    }

    pub fn resources(&self) -> &Arc<ResourceStore> {
        &self.resources
    }

    /// Handle one frame. Returns `None` for notifications.
    pub async fn handle(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = req.id.clone() else {
            // Notifications are acknowledged by doing nothing
            debug!("notification: {}", req.method);
            return None;
        };

        if req.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                codes::INVALID_REQUEST,
                "expected jsonrpc 2.0",
            ));
        }

        debug!("dispatching {}", req.method);
        let response = match req.method.as_str() {
            "initialize" => Self::initialize(&req.params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.list() })),
            "tools/call" => return Some(self.tools_call(id, &req.params).await),
            "prompts/list" => Ok(self.prompts.list()),
            "prompts/get" => self.prompts_get(&req.params),
            "resources/list" => Ok(self.resources.list()),
            "resources/read" => self.resources_read(&req.params),
            other => {
                warn!("unknown method: {}", other);
                return Some(JsonRpcResponse::error(
                    id,
                    codes::METHOD_NOT_FOUND,
                    format!("Method '{}' not found", other),
                ));
            }
        };

        Some(match response {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err((code, message)) => JsonRpcResponse::error(id, code, message),
        })
    }

    fn initialize(params: &Value) -> Result<Value, (i64, String)> {
        // Echo a requested protocol version when the client names one
        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        Ok(json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": {},
                "prompts": {},
                "resources": {},
            },
            "serverInfo": {
                "name": crate::SERVER_NAME,
                "version": crate::VERSION,
            }
        }))
    }

    async fn tools_call(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, codes::INVALID_PARAMS, "missing tool name");
        };
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let Some(kind) = self.registry.lookup(name) else {
            return JsonRpcResponse::error(
                id,
                codes::INVALID_PARAMS,
                format!("Tool '{}' not found", name),
            );
        };

        let outcome = match kind {
            ToolKind::OpenApi(tool) => self
                .executor
                .execute(&tool, &args)
                .await
                .map_err(|e| e.to_string()),
            ToolKind::Meta(meta) => self
                .executor
                .execute_meta(meta, &args)
                .await
                .map_err(|e| e.to_string()),
            ToolKind::Custom(tool) => match tool.execute(args).await {
                Ok(result) if result.is_error => Err(result.content),
                Ok(result) => Ok(result.content),
                Err(e) => Err(e.to_string()),
            },
        };

        let result = match outcome {
            Ok(text) => json!({
                "content": [{ "type": "text", "text": text }],
            }),
            Err(message) => {
                warn!("tool {} failed: {}", name, message);
                json!({
                    "content": [{ "type": "text", "text": message }],
                    "isError": true,
                })
            }
        };
        JsonRpcResponse::success(id, result)
    }

    fn prompts_get(&self, params: &Value) -> Result<Value, (i64, String)> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or((codes::INVALID_PARAMS, "missing prompt name".to_string()))?;
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        self.prompts.get(name, &args).ok_or((
            codes::INVALID_PARAMS,
            format!("Prompt '{}' not found", name),
        ))
    }

    fn resources_read(&self, params: &Value) -> Result<Value, (i64, String)> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or((codes::INVALID_PARAMS, "missing resource uri".to_string()))?;
        self.resources.read(uri).ok_or((
            codes::INVALID_PARAMS,
            format!("Resource '{}' not found", uri),
        ))
    }
}

#[cfg(test)]
mod tests;
