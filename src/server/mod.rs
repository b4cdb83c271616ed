//! JSON-lines front end over stdio.
//!
//! One request object per line in, one response object per line out,
//! correlated by the caller-chosen `id`. Requests run concurrently;
//! responses are written in completion order.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::{
    bridge::Bridge,
    error::{ToolError, ToolResult},
    tools::{Tool, ToolRequest, ALL_TOOLS},
};

#[derive(Debug, Deserialize)]
struct WireRequest {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    arguments: Map<String, Value>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    list_tools: bool,
}

pub async fn run(bridge: Bridge) -> Result<()> {
    match bridge.test_connection().await {
        Ok(out) => info!(result = %out.text, "engine probe succeeded"),
        Err(err) => warn!(kind = err.kind().as_str(), %err, "engine probe failed"),
    }
    info!(tools = ALL_TOOLS.len(), executable = %bridge.executable().display(), "serving tool requests on stdio");

    serve(bridge, BufReader::new(io::stdin()), io::stdout()).await
}

async fn serve<R, W>(bridge: Bridge, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
                || writer.flush().await.is_err()
            {
                break;
            }
        }
    });

    let mut lines = reader.lines();
    let mut in_flight = JoinSet::new();
    while let Some(line) = lines.next_line().await? {
        // Reap whatever finished since the last line, so a long session
        // holds state only for requests actually in flight.
        while in_flight.try_join_next().is_some() {}

        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let request: WireRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(err) => {
                let _ = tx.send(
                    failure_response(Value::Null, &ToolError::Internal(format!("malformed request: {err}")))
                        .to_string(),
                );
                continue;
            }
        };
        if request.list_tools {
            let tools: Vec<Value> = ALL_TOOLS.iter().map(|t| t.schema()).collect();
            let _ = tx.send(json!({"id": request.id, "ok": true, "tools": tools}).to_string());
            continue;
        }
        let bridge = bridge.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            let id = request.id.clone();
            debug!(id = %id, tool = request.tool.as_deref().unwrap_or("?"), "request received");
            let result = handle(&bridge, request).await;
            let _ = tx.send(response(id, result).to_string());
        });
    }

    while in_flight.join_next().await.is_some() {}
    drop(tx);
    let _ = writer_task.await;
    Ok(())
}

async fn handle(bridge: &Bridge, request: WireRequest) -> ToolResult {
    let name = request.tool.ok_or_else(|| ToolError::Build {
        name: "tool".into(),
        reason: "request has no tool name".into(),
    })?;
    let tool: Tool = name.parse()?;
    let mut tool_request = ToolRequest::new(tool, request.arguments);
    if let Some(secs) = request.timeout_secs {
        tool_request = tool_request.with_timeout(std::time::Duration::from_secs(secs.max(1)));
    }
    bridge.dispatch(tool_request).await
}

fn response(id: Value, result: ToolResult) -> Value {
    match result {
        Ok(out) => json!({"id": id, "ok": true, "result": {"text": out.text, "raw": out.raw}}),
        Err(err) => failure_response(id, &err),
    }
}

fn failure_response(id: Value, err: &ToolError) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": {"kind": err.kind().as_str(), "message": err.to_string()},
    })
}
