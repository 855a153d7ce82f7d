/// Per-operation tool synthesis.
///
/// Walks a resolved OpenAPI document and projects every `(path, method)`
/// operation into a [`ToolMeta`]: a JSON-schema-typed tool with a stable id
/// (the [`crate::toolid`] codec), a display name (the [`crate::abbrev`]
/// pipeline), and enough parameter metadata for the executor to bind caller
/// arguments back into path/query/header/cookie/body locations.
use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::errors::{BridgeError, BridgeResult};
use crate::{abbrev, toolid};

/// HTTP methods recognised as operations in a path item.
const METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Where a parameter is bound into the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl ParamLocation {
    fn from_openapi(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Body => "body",
        }
    }
}

/// One declared parameter of a synthesised tool.
#[derive(Debug, Clone)]
pub struct ParamMeta {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
}

/// A tool synthesised from one OpenAPI operation. Immutable once built.
#[derive(Debug, Clone)]
pub struct ToolMeta {
    /// Opaque id encoding `(method, original_path)`; round-trips via
    /// [`crate::toolid::decode`].
    pub id: String,
    /// Abbreviated display name, unique across the registry.
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub http_method: String,
    pub original_path: String,
    /// Path/query/header/cookie parameters, plus at most one `body` entry
    /// for non-object request bodies.
    pub params: Vec<ParamMeta>,
    /// For object request bodies: schema property name → body field name.
    /// The two differ only when a body field collided with a parameter and
    /// was prefixed with `body_`.
    pub body_fields: IndexMap<String, String>,
    pub tag: Option<String>,
    pub resource_name: String,
}

/// Synthesiser switches.
#[derive(Debug, Clone, Default)]
pub struct SynthOptions {
    /// Skip the abbreviation stages; over-long names become a hard error.
    pub disable_abbreviation: bool,
}

/// Synthesise a tool for every operation in the document.
pub fn synthesize_tools(doc: &Value, opts: &SynthOptions) -> BridgeResult<Vec<ToolMeta>> {
    let Some(paths) = doc["paths"].as_object() else {
        return Err(BridgeError::SpecShape("spec has no 'paths' object".into()));
    };

    let mut tools = Vec::new();
    let mut used_names = HashSet::new();

    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        let path_params = item
            .get("parameters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for method in METHODS {
            let Some(op) = item.get(*method).filter(|v| v.is_object()) else {
                continue;
            };
            let tool = synthesize_operation(path, method, op, &path_params, opts, &mut used_names)?;
            debug!(
                "synthesised tool '{}' ({} {})",
                tool.name, tool.http_method, tool.original_path
            );
            tools.push(tool);
        }
    }
    Ok(tools)
}

fn synthesize_operation(
    path: &str,
    method: &str,
    op: &Value,
    path_params: &[Value],
    opts: &SynthOptions,
    used_names: &mut HashSet<String>,
) -> BridgeResult<ToolMeta> {
    let id = toolid::encode(method, path)?;
    let http_method = method.to_ascii_uppercase();

    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut params = Vec::new();
    let mut body_fields = IndexMap::new();

    for param in merged_parameters(path_params, op) {
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(location) = param
            .get("in")
            .and_then(Value::as_str)
            .and_then(ParamLocation::from_openapi)
        else {
            continue;
        };
        // Path parameters are always required; others default to optional
        let is_required = param
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(location == ParamLocation::Path);

        let mut schema = param.get("schema").cloned().unwrap_or_else(|| json!({}));
        if let Value::Object(ref mut obj) = schema {
            if let Some(desc) = param.get("description")
                && !obj.contains_key("description")
            {
                obj.insert("description".into(), desc.clone());
            }
            obj.insert(
                "x-parameter-location".into(),
                Value::String(location.as_str().into()),
            );
        }
        properties.insert(name.to_string(), schema);
        if is_required {
            required.push(name.to_string());
        }
        params.push(ParamMeta {
            name: name.to_string(),
            location,
            required: is_required,
        });
    }

    if let Some(body) = op.get("requestBody").filter(|v| v.is_object()) {
        merge_request_body(
            body,
            &mut properties,
            &mut required,
            &mut params,
            &mut body_fields,
        );
    }

    let mut input_schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        input_schema["required"] = json!(required);
    }

    let raw_name = op
        .get("operationId")
        .and_then(Value::as_str)
        .map_or_else(|| format!("{}-{}", http_method, path), ToString::to_string);
    let base_name = if opts.disable_abbreviation {
        abbrev::sanitize_only(&raw_name).map_err(BridgeError::Config)?
    } else {
        abbrev::abbreviate(&raw_name)
    };
    let name = unique_name(&base_name, used_names);

    let description = op
        .get("summary")
        .or_else(|| op.get("description"))
        .and_then(Value::as_str)
        .map_or_else(|| format!("{} {}", http_method, path), ToString::to_string);

    let tag = op["tags"]
        .as_array()
        .and_then(|t| t.first())
        .and_then(Value::as_str)
        .map(ToString::to_string);

    let resource_name = path
        .split('/')
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .trim_matches(['{', '}'])
        .to_string();

    Ok(ToolMeta {
        id,
        name,
        description,
        input_schema,
        http_method,
        original_path: path.to_string(),
        params,
        body_fields,
        tag,
        resource_name,
    })
}

/// Path-level parameters inherited by each operation; operation-level
/// entries override by `(name, in)`.
fn merged_parameters(path_params: &[Value], op: &Value) -> Vec<Value> {
    let op_params = op
        .get("parameters")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let key = |p: &Value| {
        (
            p.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            p.get("in").and_then(Value::as_str).unwrap_or_default().to_string(),
        )
    };
    let overridden: HashSet<_> = op_params.iter().map(key).collect();

    let mut merged: Vec<Value> = path_params
        .iter()
        .filter(|p| !overridden.contains(&key(p)))
        .cloned()
        .collect();
    merged.extend(op_params);
    merged
}

/// Fold the request body into the input schema.
///
/// Object bodies contribute their properties directly, with `body_`
/// prefixing on collision with an existing parameter. Anything else
/// becomes a single property literally named `body`.
fn merge_request_body(
    body: &Value,
    properties: &mut Map<String, Value>,
    required: &mut Vec<String>,
    params: &mut Vec<ParamMeta>,
    body_fields: &mut IndexMap<String, String>,
) {
    let body_required = body
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let schema = body
        .get("content")
        .and_then(Value::as_object)
        .and_then(|content| {
            content
                .get("application/json")
                .or_else(|| content.values().next())
        })
        .and_then(|media| media.get("schema"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    let is_object_body = schema.get("properties").is_some()
        || schema.get("type").and_then(Value::as_str) == Some("object");

    if is_object_body {
        let body_props = schema
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let body_required_fields: HashSet<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        for (field, mut prop_schema) in body_props {
            let key = if properties.contains_key(&field) {
                format!("body_{}", field)
            } else {
                field.clone()
            };
            if let Value::Object(ref mut obj) = prop_schema {
                obj.insert("x-parameter-location".into(), Value::String("body".into()));
            }
            if body_required && body_required_fields.contains(field.as_str()) {
                required.push(key.clone());
            }
            properties.insert(key.clone(), prop_schema);
            body_fields.insert(key, field);
        }
    } else {
        let mut body_schema = schema;
        if let Value::Object(ref mut obj) = body_schema {
            obj.insert("x-parameter-location".into(), Value::String("body".into()));
        }
        properties.insert("body".into(), body_schema);
        if body_required {
            required.push("body".into());
        }
        params.push(ParamMeta {
            name: "body".into(),
            location: ParamLocation::Body,
            required: body_required,
        });
    }
}

/// Globally unique display name: append `-2`, `-3`, … on collision, keeping
/// the result within the name limit.
fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    for n in 2.. {
        let suffix = format!("-{}", n);
        let room = abbrev::MAX_NAME_LEN - suffix.len();
        let head: String = base.chars().take(room).collect();
        let candidate = format!("{}{}", head.trim_end_matches('-'), suffix);
        if used.insert(candidate.clone()) {
            return candidate;
        }
    }
    unreachable!("name space exhausted");
}

/// Tool-exposure modes for the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolsMode {
    /// Expose every synthesised tool, subject to the include filters.
    #[default]
    All,
    /// Hide synthesised tools; expose three meta-tools that list, describe,
    /// and invoke operations dynamically.
    Dynamic,
    /// Expose only tools named in `include_tools`.
    Explicit,
}

/// Include filters applied after synthesis.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    /// Tool ids or names. Highest priority: a tool matching this list is
    /// kept without consulting the other filters.
    pub include_tools: Vec<String>,
    /// HTTP methods (case-insensitive).
    pub include_operations: Vec<String>,
    /// Matched as a prefix of `original_path` (leading slash optional).
    pub include_resources: Vec<String>,
    /// OpenAPI tags.
    pub include_tags: Vec<String>,
}

impl ToolFilter {
    pub fn is_empty(&self) -> bool {
        self.include_tools.is_empty()
            && self.include_operations.is_empty()
            && self.include_resources.is_empty()
            && self.include_tags.is_empty()
    }
}

/// Apply the filtering mode to the synthesised tool set.
///
/// `Dynamic` keeps everything: the registry hides the synthesised tools
/// behind the meta-tools, but the executor still needs the full catalog.
pub fn apply_filter(tools: Vec<ToolMeta>, mode: ToolsMode, filter: &ToolFilter) -> Vec<ToolMeta> {
    match mode {
        ToolsMode::Dynamic => tools,
        ToolsMode::Explicit => {
            let wanted = lowered(&filter.include_tools);
            tools
                .into_iter()
                .filter(|t| {
                    wanted.contains(&t.id.to_ascii_lowercase())
                        || wanted.contains(&t.name.to_ascii_lowercase())
                })
                .collect()
        }
        ToolsMode::All => {
            if filter.is_empty() {
                return tools;
            }
            let wanted_tools = lowered(&filter.include_tools);
            let wanted_ops = lowered(&filter.include_operations);
            let wanted_tags = lowered(&filter.include_tags);
            tools
                .into_iter()
                .filter(|t| {
                    if wanted_tools.contains(&t.id.to_ascii_lowercase())
                        || wanted_tools.contains(&t.name.to_ascii_lowercase())
                    {
                        return true;
                    }
                    if !wanted_ops.is_empty()
                        && !wanted_ops.contains(&t.http_method.to_ascii_lowercase())
                    {
                        return false;
                    }
                    if !filter.include_resources.is_empty()
                        && !filter.include_resources.iter().any(|r| {
                            t.original_path
                                .trim_start_matches('/')
                                .starts_with(r.trim_start_matches('/'))
                        })
                    {
                        return false;
                    }
                    if !wanted_tags.is_empty() {
                        let tag = t.tag.as_deref().unwrap_or_default().to_ascii_lowercase();
                        if !wanted_tags.contains(&tag) {
                            return false;
                        }
                    }
                    // With only include_tools configured, non-matching tools
                    // fall through to here and are dropped
                    !(wanted_ops.is_empty()
                        && filter.include_resources.is_empty()
                        && wanted_tags.is_empty())
                })
                .collect()
        }
    }
}

fn lowered(items: &[String]) -> HashSet<String> {
    items.iter().map(|s| s.to_ascii_lowercase()).collect()
}

#[cfg(test)]
mod tests;
