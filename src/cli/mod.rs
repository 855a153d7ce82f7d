/// CLI surface and startup wiring.
///
/// Flag validation happens here (exactly one spec source, transport
/// compatibility); everything downstream receives a typed [`Config`].
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser, ValueEnum};
use tracing::info;
use url::Url;

use crate::auth::{AuthProvider, StaticAuthProvider};
use crate::config::{Config, TransportKind, parse_headers};
use crate::errors::BridgeError;
use crate::executor::RequestExecutor;
use crate::mcp::{McpDispatcher, PromptStore, ResourceStore};
use crate::registry::ToolRegistry;
use crate::spec::{SpecSource, load_spec};
use crate::synth::{SynthOptions, ToolFilter, ToolsMode, synthesize_tools};
use crate::transport;
use crate::transport::http::{DEFAULT_SESSION_TTL_SECS, HttpConfig, HttpTransport};
use crate::utils::http::outbound_client;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ToolsArg {
    All,
    Dynamic,
    Explicit,
}

#[derive(Parser, Debug)]
#[command(name = "apibridge", version = crate::VERSION)]
#[command(about = "Expose any OpenAPI-described REST API as MCP tools")]
pub struct Cli {
    /// Transport to serve MCP over
    #[arg(long, value_enum, default_value = "stdio")]
    transport: TransportArg,

    /// Bind host for the HTTP transport
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind port for the HTTP transport
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Request path the MCP endpoints hang off
    #[arg(long, default_value = "/mcp")]
    path: String,

    /// Extra origin hosts accepted by the HTTP transport
    #[arg(long = "allowed-origin")]
    allowed_origins: Vec<String>,

    /// Idle seconds before an HTTP session is garbage-collected
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL_SECS)]
    session_ttl_secs: u64,

    /// Base URL every tool call is issued against
    #[arg(long)]
    api_base_url: Url,

    /// OpenAPI spec location: a file path or an http(s) URL
    #[arg(long)]
    openapi_spec: Option<String>,

    /// Read the OpenAPI spec from stdin
    #[arg(long)]
    spec_from_stdin: bool,

    /// Pass the OpenAPI spec inline as a string
    #[arg(long)]
    spec_inline: Option<String>,

    /// Static auth headers, comma-separated Name:Value pairs
    #[arg(long = "headers")]
    headers: Vec<String>,

    /// Tool exposure mode
    #[arg(long = "tools", value_enum, default_value = "all")]
    tools_mode: ToolsArg,

    /// Expose only these tool ids or names (repeatable)
    #[arg(long = "tool")]
    tools: Vec<String>,

    /// Only operations carrying one of these tags (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Only operations under one of these path prefixes (repeatable)
    #[arg(long = "resource")]
    resources: Vec<String>,

    /// Only these HTTP methods (repeatable)
    #[arg(long = "operation")]
    operations: Vec<String>,

    /// Keep operation ids verbatim; over-long tool names become errors
    #[arg(long)]
    disable_abbreviation: bool,

    /// Emit shell completions and exit
    #[arg(long, value_enum, hide = true)]
    completions: Option<clap_complete::Shell>,
}

impl Cli {
    fn into_config(self) -> Result<Config, BridgeError> {
        let spec_source = match (&self.openapi_spec, self.spec_from_stdin, &self.spec_inline) {
            (Some(loc), false, None) => {
                if loc.starts_with("http://") || loc.starts_with("https://") {
                    SpecSource::Url(loc.clone())
                } else {
                    SpecSource::File(PathBuf::from(loc))
                }
            }
            (None, true, None) => SpecSource::Stdin,
            (None, false, Some(inline)) => SpecSource::Inline(inline.clone()),
            _ => {
                return Err(BridgeError::Config(
                    "exactly one of --openapi-spec, --spec-from-stdin, --spec-inline is required"
                        .into(),
                ));
            }
        };

        let transport = match self.transport {
            TransportArg::Stdio => TransportKind::Stdio,
            TransportArg::Http => TransportKind::Http,
        };
        // The spec and the protocol cannot share one stdin
        if transport == TransportKind::Stdio && self.spec_from_stdin {
            return Err(BridgeError::Config(
                "--spec-from-stdin cannot be combined with the stdio transport".into(),
            ));
        }

        let tools_mode = match self.tools_mode {
            ToolsArg::All => ToolsMode::All,
            ToolsArg::Dynamic => ToolsMode::Dynamic,
            ToolsArg::Explicit => ToolsMode::Explicit,
        };

        Ok(Config {
            transport,
            api_base_url: self.api_base_url,
            spec_source,
            tools_mode,
            filter: ToolFilter {
                include_tools: self.tools,
                include_operations: self.operations,
                include_resources: self.resources,
                include_tags: self.tags,
            },
            synth: SynthOptions {
                disable_abbreviation: self.disable_abbreviation,
            },
            static_headers: parse_headers(&self.headers)?,
            http: HttpConfig {
                host: self.host,
                port: self.port,
                path: self.path,
                allowed_origins: self.allowed_origins,
                session_ttl: Duration::from_secs(self.session_ttl_secs),
            },
        })
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "apibridge", &mut std::io::stdout());
        return Ok(());
    }

    let config = cli.into_config()?;
    serve(config).await
}

/// Load the spec, build the registry, and serve until the transport ends.
/// Any error before the transport accepts traffic is fatal.
pub async fn serve(config: Config) -> Result<()> {
    let client = outbound_client();
    let doc = load_spec(&config.spec_source, &client).await?;
    let tools = synthesize_tools(&doc, &config.synth)?;
    info!("synthesised {} tool(s) from spec", tools.len());

    let registry = Arc::new(ToolRegistry::new(tools, config.tools_mode, &config.filter));

    let auth: Option<Arc<dyn AuthProvider>> = if config.static_headers.is_empty() {
        None
    } else {
        Some(Arc::new(StaticAuthProvider::new(
            config.static_headers.clone(),
        )))
    };
    let executor = Arc::new(RequestExecutor::new(
        config.api_base_url.clone(),
        auth,
        registry.clone(),
    ));
    let dispatcher = Arc::new(McpDispatcher::new(
        registry,
        executor,
        Arc::new(PromptStore::new()),
        Arc::new(ResourceStore::new()),
    ));

    match config.transport {
        TransportKind::Stdio => transport::stdio::run(dispatcher).await,
        TransportKind::Http => {
            let server = HttpTransport::start(config.http, dispatcher).await?;
            tokio::signal::ctrl_c().await?;
            info!("interrupt received, shutting down");
            server.close().await;
            Ok(())
        }
    }
}
