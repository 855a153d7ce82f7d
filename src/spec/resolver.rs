/// `$ref` and `allOf` resolution.
///
/// References into `#/components/**` are inlined recursively. The resolver
/// never builds a cyclic structure: a per-traversal visited set keyed by
/// pointer breaks cycles by substituting an empty schema on re-entry.
/// `allOf` branches are merged left-to-right (property maps merged,
/// `required` unioned); `oneOf`/`anyOf`/`not` keep their combinator shape
/// with only the refs inside them inlined.
use std::collections::HashSet;

use serde_json::{Map, Value, json};

use crate::errors::{BridgeError, BridgeResult};

/// Resolve every reference in the document's `paths` in place.
pub fn resolve_document(doc: &mut Value) -> BridgeResult<()> {
    let root = doc.clone();
    let mut visited = HashSet::new();
    let resolved = resolve_node(&doc["paths"], &root, &mut visited)?;
    doc["paths"] = resolved;
    Ok(())
}

/// Resolve one node, returning a new value with all refs inlined.
pub fn resolve_node(
    node: &Value,
    root: &Value,
    visited: &mut HashSet<String>,
) -> BridgeResult<Value> {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(pointer)) = map.get("$ref") {
                return resolve_ref(pointer, root, visited);
            }
            if let Some(Value::Array(branches)) = map.get("allOf") {
                return resolve_all_of(branches, map, root, visited);
            }
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_node(v, root, visited)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|v| resolve_node(v, root, visited))
                .collect::<BridgeResult<Vec<_>>>()?,
        )),
        other => Ok(other.clone()),
    }
}

fn resolve_ref(
    pointer: &str,
    root: &Value,
    visited: &mut HashSet<String>,
) -> BridgeResult<Value> {
    if !pointer.starts_with("#/components/") {
        return Err(BridgeError::SpecShape(format!(
            "unresolvable $ref '{}': only #/components/** references are supported",
            pointer
        )));
    }
    if visited.contains(pointer) {
        // Cycle: substitute an empty schema rather than recursing forever
        return Ok(json!({}));
    }

    let target = lookup_pointer(pointer, root).ok_or_else(|| {
        BridgeError::SpecShape(format!("unresolvable $ref '{}': target not found", pointer))
    })?;

    visited.insert(pointer.to_string());
    let resolved = resolve_node(&target, root, visited);
    visited.remove(pointer);
    resolved
}

/// JSON-pointer lookup (`#/a/b/c`), with `~0`/`~1` unescaping.
fn lookup_pointer(pointer: &str, root: &Value) -> Option<Value> {
    let mut current = root;
    for token in pointer.trim_start_matches("#/").split('/') {
        let token = token.replace("~1", "/").replace("~0", "~");
        current = current.get(&token)?;
    }
    Some(current.clone())
}

fn resolve_all_of(
    branches: &[Value],
    node: &Map<String, Value>,
    root: &Value,
    visited: &mut HashSet<String>,
) -> BridgeResult<Value> {
    let mut merged = Map::new();
    for branch in branches {
        let resolved = resolve_node(branch, root, visited)?;
        if let Value::Object(obj) = resolved {
            merge_schema(&mut merged, obj);
        }
    }
    // Sibling keys on the allOf node itself win over the branches
    for (k, v) in node {
        if k == "allOf" {
            continue;
        }
        let resolved = resolve_node(v, root, visited)?;
        merge_schema_entry(&mut merged, k.clone(), resolved);
    }
    Ok(Value::Object(merged))
}

/// Merge one resolved `allOf` branch into the accumulator.
///
/// `properties` maps are merged key-by-key (left-to-right, later branches
/// win on conflicts); `required` arrays are unioned; every other keyword
/// is overwritten by the later branch.
fn merge_schema(dst: &mut Map<String, Value>, src: Map<String, Value>) {
    for (k, v) in src {
        merge_schema_entry(dst, k, v);
    }
}

fn merge_schema_entry(dst: &mut Map<String, Value>, key: String, value: Value) {
    match key.as_str() {
        "properties" => {
            let entry = dst
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
            if let (Value::Object(existing), Value::Object(incoming)) = (entry, value) {
                for (pk, pv) in incoming {
                    existing.insert(pk, pv);
                }
            }
        }
        "required" => {
            let entry = dst
                .entry("required")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let (Value::Array(existing), Value::Array(incoming)) = (entry, value) {
                for item in incoming {
                    if !existing.contains(&item) {
                        existing.push(item);
                    }
                }
            }
        }
        _ => {
            dst.insert(key, value);
        }
    }
}
