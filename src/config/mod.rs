/// Runtime configuration, assembled by the CLI and passed explicitly into
/// constructors. Nothing here is global or mutable after startup.
use std::collections::HashMap;

use url::Url;

use crate::errors::{BridgeError, BridgeResult};
use crate::spec::SpecSource;
use crate::synth::{SynthOptions, ToolFilter, ToolsMode};
use crate::transport::http::HttpConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Http,
}

pub struct Config {
    pub transport: TransportKind,
    pub api_base_url: Url,
    pub spec_source: SpecSource,
    pub tools_mode: ToolsMode,
    pub filter: ToolFilter,
    pub synth: SynthOptions,
    /// Static auth headers from `--headers`; becomes a
    /// [`crate::auth::StaticAuthProvider`] when non-empty.
    pub static_headers: HashMap<String, String>,
    pub http: HttpConfig,
}

// Header values are credentials; Debug shows names only
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("transport", &self.transport)
            .field("api_base_url", &self.api_base_url.as_str())
            .field("spec_source", &self.spec_source)
            .field("tools_mode", &self.tools_mode)
            .field("filter", &self.filter)
            .field("synth", &self.synth)
            .field(
                "static_headers",
                &self.static_headers.keys().collect::<Vec<_>>(),
            )
            .field("http", &self.http)
            .finish()
    }
}

/// Parse `--headers` values: comma-separated `Name:Value` pairs, with
/// `Name=Value` accepted as well. Whitespace around names and values is
/// trimmed.
pub fn parse_headers(raw: &[String]) -> BridgeResult<HashMap<String, String>> {
    let mut headers = HashMap::new();
    for entry in raw.iter().flat_map(|v| v.split(',')) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, value) = entry
            .split_once(':')
            .or_else(|| entry.split_once('='))
            .ok_or_else(|| {
                BridgeError::Config(format!(
                    "header '{}' is not in Name:Value form",
                    entry
                ))
            })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::Config(format!("empty header name in '{}'", entry)));
        }
        headers.insert(name.to_string(), value.trim().to_string());
    }
    Ok(headers)
}
