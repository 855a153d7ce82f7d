/// Bidirectional codec between `(METHOD, path)` and a single opaque token.
///
/// The encoded form is `METHOD::path-token` where the path token survives
/// MCP name constraints while staying decodable:
///
/// - `/` separators become `__` (double underscore)
/// - `{param}` templates become `---param` (parameter names keep their
///   original case so call-time interpolation can find them)
/// - a single `:` is preserved verbatim (Google-RPC action suffix)
/// - any other character outside `[a-z0-9_:-]` is lowercased or replaced
///   by `-`, with runs of `-` collapsed
///
/// `::` inside a path is rejected outright — it collides with the method
/// separator and cannot be represented.
use regex::Regex;

use crate::errors::{BridgeError, BridgeResult};

/// Hard cap on encoded ids, matching the MCP tool-name limit.
pub const MAX_ID_LEN: usize = 64;

/// Marker prefixing an encoded path parameter.
const PARAM_MARKER: &str = "---";

/// Separator standing in for `/` inside the path token.
const SEGMENT_SEP: &str = "__";

/// Encode `(method, path)` into a tool id token.
pub fn encode(method: &str, path: &str) -> BridgeResult<String> {
    let method = method.trim();
    if method.is_empty() {
        return Err(BridgeError::ToolId("empty HTTP method".into()));
    }
    if !method.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(BridgeError::ToolId(format!(
            "HTTP method '{}' is not alphabetic",
            method
        )));
    }
    if path.contains("::") {
        return Err(BridgeError::ToolId(format!(
            "path '{}' contains '::' which collides with the method separator",
            path
        )));
    }

    let mut token = String::new();
    for (i, segment) in path.trim_start_matches('/').split('/').enumerate() {
        if i > 0 {
            token.push_str(SEGMENT_SEP);
        }
        encode_segment(segment, &mut token);
    }

    let id = format!("{}::{}", method.to_ascii_uppercase(), token);
    if id.len() > MAX_ID_LEN {
        return Err(BridgeError::ToolId(format!(
            "path '{}' encodes to {} chars, exceeding the {}-char limit",
            path,
            id.len(),
            MAX_ID_LEN
        )));
    }
    Ok(id)
}

/// Encode one `/`-delimited path segment, appending to `out`.
///
/// Literal runs are sanitised (lowercase, invalid chars to `-`, `-` runs
/// collapsed); `{param}` captures are emitted atomically as `---param` so
/// the marker never takes part in hyphen collapsing.
fn encode_segment(segment: &str, out: &mut String) {
    let mut chars = segment.chars();
    let mut last_was_hyphen = false;
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            for inner in chars.by_ref() {
                if inner == '}' {
                    break;
                }
                name.push(inner);
            }
            // A literal hyphen directly before a marker would smear into it
            if last_was_hyphen {
                out.pop();
            }
            out.push_str(PARAM_MARKER);
            out.push_str(&name);
            last_was_hyphen = false;
        } else if c == ':' || c == '_' || c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_was_hyphen = false;
        } else if c.is_ascii_uppercase() {
            out.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    // Strip a trailing sanitisation hyphen from the literal run
    if last_was_hyphen {
        out.pop();
    }
}

/// Decode a tool id back into `(METHOD, path)`.
pub fn decode(id: &str) -> BridgeResult<(String, String)> {
    let Some((method, token)) = id.split_once("::") else {
        return Err(BridgeError::ToolId(format!(
            "tool id '{}' has no method separator",
            id
        )));
    };
    if method.is_empty() {
        return Err(BridgeError::ToolId(format!(
            "tool id '{}' has an empty method",
            id
        )));
    }

    let mut path = String::new();
    for segment in token.split(SEGMENT_SEP) {
        path.push('/');
        decode_segment(segment, &mut path);
    }
    Ok((method.to_string(), path))
}

/// Decode one encoded segment, turning `---name` back into `{name}`.
fn decode_segment(segment: &str, out: &mut String) {
    let mut rest = segment;
    while let Some(pos) = rest.find(PARAM_MARKER) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + PARAM_MARKER.len()..];
        let end = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        out.push('{');
        out.push_str(&after[..end]);
        out.push('}');
        rest = &after[end..];
    }
    out.push_str(rest);
}

/// Substitute one path parameter into a template at call time.
///
/// Matches all three spellings a parameter can take: `{name}` in the
/// original path, `:name` (Express style) at a segment boundary, and the
/// encoded `---name` marker. The boundary set for `---name` includes `:`
/// so that `/x/---id:act` + `id=5` yields `/x/5:act`, not `/x/5act`.
pub fn interpolate(template: &str, name: &str, value: &str) -> String {
    let escaped = regex::escape(name);
    let pattern = format!(
        r"\{{{p}\}}|:{p}(/|$)|{marker}{p}(__|/|:|$)",
        p = escaped,
        marker = PARAM_MARKER
    );
    let Ok(re) = Regex::new(&pattern) else {
        return template.to_string();
    };
    let encoded = urlencoding::encode(value).into_owned();
    re.replace_all(template, |caps: &regex::Captures<'_>| {
        let suffix = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        format!("{}{}", encoded, suffix)
    })
    .into_owned()
}

#[cfg(test)]
mod tests;
