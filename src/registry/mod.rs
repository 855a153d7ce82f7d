/// Tool registry: the single lookup surface the dispatcher talks to.
///
/// Three tool kinds live behind one tagged sum: OpenAPI-synthesised tools,
/// the fixed meta-tools of dynamic mode, and custom tools registered by
/// embedders. Lookup is by display name or tool id, case-insensitive,
/// preferring OpenAPI tools over custom ones.
///
/// The OpenAPI side is immutable after construction and safe for concurrent
/// reads; custom registration takes a write lock, reads are lock-free
/// clones of `Arc`s.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::warn;

use crate::synth::{ToolFilter, ToolMeta, ToolsMode, apply_filter};

/// Outcome of a tool invocation, custom or built-in.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn new(content: String) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(content: String) -> Self {
        Self {
            content,
            is_error: true,
        }
    }
}

/// A tool with embedder-supplied behaviour, registered at startup or
/// dynamically. Never overwrites an existing registration.
#[async_trait]
pub trait CustomTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult>;
}

/// The three fixed meta-tools exposed in dynamic mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    ListEndpoints,
    GetSchema,
    Invoke,
}

impl MetaKind {
    pub const ALL: [MetaKind; 3] = [Self::ListEndpoints, Self::GetSchema, Self::Invoke];

    pub fn name(self) -> &'static str {
        match self {
            Self::ListEndpoints => "list-api-endpoints",
            Self::GetSchema => "get-api-endpoint-schema",
            Self::Invoke => "invoke-api-endpoint",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ListEndpoints => "List every operation the upstream API exposes",
            Self::GetSchema => "Return the JSON input schema for one API endpoint",
            Self::Invoke => "Invoke an API endpoint with the given parameters",
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            Self::ListEndpoints => json!({
                "type": "object",
                "properties": {}
            }),
            Self::GetSchema => json!({
                "type": "object",
                "properties": {
                    "endpoint": {
                        "type": "string",
                        "description": "Endpoint path, tool name, or tool id"
                    }
                },
                "required": ["endpoint"]
            }),
            Self::Invoke => json!({
                "type": "object",
                "properties": {
                    "endpoint": {
                        "type": "string",
                        "description": "Endpoint path, tool name, or tool id"
                    },
                    "method": {
                        "type": "string",
                        "description": "HTTP method, when the path is ambiguous"
                    },
                    "params": {
                        "type": "object",
                        "description": "Arguments for the operation"
                    }
                },
                "required": ["endpoint"]
            }),
        }
    }
}

/// A resolved tool, tagged by kind. The dispatcher branches on this once.
#[derive(Clone)]
pub enum ToolKind {
    OpenApi(Arc<ToolMeta>),
    Meta(MetaKind),
    Custom(Arc<dyn CustomTool>),
}

/// What `tools/list` advertises for one tool.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub struct ToolRegistry {
    mode: ToolsMode,
    /// Tools advertised by `tools/list` (post-filter). Empty in dynamic mode.
    exposed: Vec<Arc<ToolMeta>>,
    /// Every synthesised operation, unfiltered. Dynamic-mode meta-tools
    /// resolve endpoints against this.
    catalog: Vec<Arc<ToolMeta>>,
    /// Lookup key (lowercased name or id) → index into `exposed`.
    index: HashMap<String, usize>,
    custom: RwLock<Vec<Arc<dyn CustomTool>>>,
}

impl ToolRegistry {
    /// Build the registry from the synthesised tool set.
    pub fn new(tools: Vec<ToolMeta>, mode: ToolsMode, filter: &ToolFilter) -> Self {
        let catalog: Vec<Arc<ToolMeta>> = tools.iter().cloned().map(Arc::new).collect();
        let exposed: Vec<Arc<ToolMeta>> = match mode {
            ToolsMode::Dynamic => Vec::new(),
            _ => apply_filter(tools, mode, filter)
                .into_iter()
                .map(Arc::new)
                .collect(),
        };

        let mut index = HashMap::with_capacity(exposed.len() * 2);
        for (i, tool) in exposed.iter().enumerate() {
            index.insert(tool.name.to_ascii_lowercase(), i);
            index.insert(tool.id.to_ascii_lowercase(), i);
        }

        Self {
            mode,
            exposed,
            catalog,
            index,
            custom: RwLock::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> ToolsMode {
        self.mode
    }

    /// Register a custom tool. First registration wins; a duplicate name is
    /// refused and logged.
    pub fn register_custom(&self, tool: Arc<dyn CustomTool>) -> bool {
        let mut custom = self
            .custom
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let name = tool.name().to_ascii_lowercase();
        let taken = self.index.contains_key(&name)
            || (self.mode == ToolsMode::Dynamic
                && MetaKind::ALL.iter().any(|m| m.name() == name))
            || custom.iter().any(|t| t.name().eq_ignore_ascii_case(&name));
        if taken {
            warn!("custom tool '{}' already registered, keeping the original", tool.name());
            return false;
        }
        custom.push(tool);
        true
    }

    /// Everything `tools/list` should advertise: OpenAPI tools (or the
    /// meta-tools in dynamic mode) merged with custom tools.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<ToolDescriptor> = match self.mode {
            ToolsMode::Dynamic => MetaKind::ALL
                .iter()
                .map(|m| ToolDescriptor {
                    name: m.name().to_string(),
                    description: m.description().to_string(),
                    input_schema: m.input_schema(),
                })
                .collect(),
            _ => self
                .exposed
                .iter()
                .map(|t| ToolDescriptor {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect(),
        };

        let custom = self
            .custom
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        out.extend(custom.iter().map(|t| ToolDescriptor {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        }));
        out
    }

    /// Resolve a `tools/call` target by name or id, case-insensitive.
    /// OpenAPI tools win over custom tools on a name clash.
    pub fn lookup(&self, key: &str) -> Option<ToolKind> {
        let key = key.to_ascii_lowercase();

        if let Some(&i) = self.index.get(&key) {
            return Some(ToolKind::OpenApi(self.exposed[i].clone()));
        }
        if self.mode == ToolsMode::Dynamic
            && let Some(meta) = MetaKind::ALL.iter().find(|m| m.name() == key)
        {
            return Some(ToolKind::Meta(*meta));
        }

        let custom = self
            .custom
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        custom
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(&key))
            .cloned()
            .map(ToolKind::Custom)
    }

    /// The unfiltered operation catalog (dynamic-mode meta-tools).
    pub fn catalog(&self) -> &[Arc<ToolMeta>] {
        &self.catalog
    }

    /// Resolve an endpoint reference (`/path`, tool name, or tool id)
    /// against the catalog, optionally narrowed by HTTP method.
    pub fn find_operation(&self, endpoint: &str, method: Option<&str>) -> Option<Arc<ToolMeta>> {
        let lowered = endpoint.to_ascii_lowercase();
        let path_form = if endpoint.starts_with('/') {
            endpoint.to_string()
        } else {
            format!("/{}", endpoint)
        };
        self.catalog
            .iter()
            .filter(|t| {
                method.is_none_or(|m| t.http_method.eq_ignore_ascii_case(m))
            })
            .find(|t| {
                t.id.to_ascii_lowercase() == lowered
                    || t.name == lowered
                    || t.original_path == path_form
                    || t.original_path == endpoint
            })
            .cloned()
    }
}
