/// Line-delimited JSON-RPC over stdin/stdout.
///
/// One frame per line in, one frame per line out. Logging goes to stderr
/// (set up in `main`), so stdout stays clean for the protocol.
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::mcp::{JsonRpcResponse, McpDispatcher, codes};

pub async fn run(dispatcher: Arc<McpDispatcher>) -> Result<()> {
    info!("MCP stdio transport ready");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str(line) {
            Ok(request) => dispatcher.handle(request).await,
            Err(e) => {
                debug!("unparseable frame: {}", e);
                Some(JsonRpcResponse::error(
                    serde_json::Value::Null,
                    codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        };

        if let Some(reply) = reply {
            let mut out = serde_json::to_string(&reply).context("serialise response")?;
            out.push('\n');
            stdout.write_all(out.as_bytes()).await.context("write stdout")?;
            stdout.flush().await.context("flush stdout")?;
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}
