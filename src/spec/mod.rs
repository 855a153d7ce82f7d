/// OpenAPI spec loading and parsing.
///
/// A spec arrives from one of four sources (URL, file, stdin, inline
/// string) and in one of two syntaxes. We try JSON first, then fall back
/// to YAML under a restricted schema: custom tags are rejected outright
/// and merge-key aggregation is never applied. Both are known vectors for
/// smuggling executable or aliased content through "data" files, and an
/// OpenAPI document needs neither.
pub mod resolver;

use std::path::PathBuf;

use anyhow::Context;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::errors::{BridgeError, BridgeResult};
use crate::utils::http::{MAX_RESPONSE_BYTES, limited_body};

/// Where the OpenAPI document comes from.
#[derive(Debug, Clone)]
pub enum SpecSource {
    Url(String),
    File(PathBuf),
    Stdin,
    Inline(String),
}

impl std::fmt::Display for SpecSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecSource::Url(u) => write!(f, "url:{}", u),
            SpecSource::File(p) => write!(f, "file:{}", p.display()),
            SpecSource::Stdin => write!(f, "stdin"),
            SpecSource::Inline(_) => write!(f, "inline"),
        }
    }
}

impl SpecSource {
    /// Fetch the raw spec bytes.
    pub async fn fetch(&self, client: &reqwest::Client) -> BridgeResult<Vec<u8>> {
        match self {
            SpecSource::Url(url) => {
                debug!("fetching OpenAPI spec from {}", url);
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| BridgeError::SpecLoad(format!("fetch {}: {}", url, e)))?;
                if !resp.status().is_success() {
                    return Err(BridgeError::SpecLoad(format!(
                        "fetch {}: HTTP {}",
                        url,
                        resp.status().as_u16()
                    )));
                }
                let (bytes, truncated) = limited_body(resp, MAX_RESPONSE_BYTES)
                    .await
                    .map_err(|e| BridgeError::SpecLoad(format!("fetch {}: {}", url, e)))?;
                if truncated {
                    return Err(BridgeError::SpecLoad(format!(
                        "fetch {}: spec exceeds {} bytes",
                        url, MAX_RESPONSE_BYTES
                    )));
                }
                Ok(bytes)
            }
            SpecSource::File(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("read spec from {}", path.display()))
                .map_err(|e| BridgeError::SpecLoad(e.to_string())),
            SpecSource::Stdin => {
                let mut buf = Vec::new();
                tokio::io::stdin()
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| BridgeError::SpecLoad(format!("read spec from stdin: {}", e)))?;
                Ok(buf)
            }
            SpecSource::Inline(text) => Ok(text.clone().into_bytes()),
        }
    }
}

/// Load, parse, shape-check, and `$ref`-resolve a spec end to end.
pub async fn load_spec(source: &SpecSource, client: &reqwest::Client) -> BridgeResult<Value> {
    let bytes = source.fetch(client).await?;
    let mut doc = parse_spec(&bytes)?;

    let Some(paths) = doc.get("paths") else {
        return Err(BridgeError::SpecShape("spec has no 'paths' object".into()));
    };
    if !paths.is_object() {
        return Err(BridgeError::SpecShape("'paths' is not an object".into()));
    }

    resolver::resolve_document(&mut doc)?;
    info!(
        "loaded OpenAPI spec from {} ({} paths)",
        source,
        doc["paths"].as_object().map_or(0, serde_json::Map::len)
    );
    Ok(doc)
}

/// Parse spec bytes: JSON first, then restricted YAML.
pub fn parse_spec(bytes: &[u8]) -> BridgeResult<Value> {
    if let Ok(doc) = serde_json::from_slice::<Value>(bytes) {
        return Ok(doc);
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|e| BridgeError::SpecLoad(format!("spec is not valid UTF-8: {}", e)))?;
    let yaml: serde_yaml_ng::Value = serde_yaml_ng::from_str(text)
        .map_err(|e| BridgeError::SpecLoad(format!("spec is neither valid JSON nor YAML: {}", e)))?;
    yaml_to_json(yaml)
}

/// Convert a YAML value to JSON, rejecting constructs outside the
/// restricted schema.
///
/// Scalar mapping keys (YAML happily parses `200:` as an integer) are
/// stringified, since JSON object keys are always strings. Tagged nodes
/// are refused. Merge keys (`<<`) survive as literal keys and are never
/// aggregated.
fn yaml_to_json(yaml: serde_yaml_ng::Value) -> BridgeResult<Value> {
    use serde_yaml_ng::Value as Yaml;
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f).map(Value::Number).ok_or_else(|| {
                    BridgeError::SpecLoad("non-finite number in YAML spec".into())
                })?
            } else {
                return Err(BridgeError::SpecLoad("unrepresentable YAML number".into()));
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(seq) => Value::Array(
            seq.into_iter()
                .map(yaml_to_json)
                .collect::<BridgeResult<Vec<_>>>()?,
        ),
        Yaml::Mapping(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => {
                        return Err(BridgeError::SpecLoad(format!(
                            "unsupported YAML mapping key: {:?}",
                            other
                        )));
                    }
                };
                out.insert(key, yaml_to_json(v)?);
            }
            Value::Object(out)
        }
        Yaml::Tagged(tagged) => {
            return Err(BridgeError::SpecLoad(format!(
                "unsafe YAML construct: custom tag {}",
                tagged.tag
            )));
        }
    })
}
