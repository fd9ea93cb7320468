//! The stream-RPC front door: one newline-delimited JSON envelope per line.
//!
//! Two methods are served: `tools/list` returns the catalog with JSON-schema
//! argument descriptions, and `tools/call` runs the shared pipeline and wraps
//! the response envelope in a single `text` content item.

use crate::pipeline::handle_tool_call;
use crate::state::AppState;
use crate::tools::ToolName;
use crate::validation::schema_for;
use pagepilot_core::CorrelationId;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Runs the stdio loop until stdin closes.
pub async fn run_stdio(state: AppState) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    tracing::info!("stream-RPC transport ready");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = handle_line(&state, line).await;
        let mut serialized = response.to_string();
        serialized.push('\n');
        stdout.write_all(serialized.as_bytes()).await?;
        stdout.flush().await?;
    }
    tracing::info!("stream-RPC transport closed");
    Ok(())
}

/// Handles one envelope line. Exposed for tests.
pub async fn handle_line(state: &AppState, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(error) => {
            return error_envelope(Value::Null, -32700, &format!("parse error: {error}"));
        }
    };

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();

    match method {
        "tools/list" => result_envelope(id, tool_catalog()),
        "tools/call" => {
            let params = request.get("params").cloned().unwrap_or(json!({}));
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            let correlation = CorrelationId::generate();

            let outcome = handle_tool_call(state, &name, arguments, &correlation).await;
            let body = serde_json::to_value(&outcome.response)
                .unwrap_or_else(|_| json!({"success": false}));
            result_envelope(
                id,
                json!({
                    "content": [{
                        "type": "text",
                        "text": body.to_string(),
                    }],
                    "isError": !outcome.response.success,
                }),
            )
        }
        other => error_envelope(id, -32601, &format!("method not found: {other}")),
    }
}

/// The tool catalog served by `tools/list`.
pub fn tool_catalog() -> Value {
    let tools: Vec<Value> = ToolName::ALL
        .iter()
        .map(|tool| {
            json!({
                "name": tool.as_str(),
                "description": tool.description(),
                "inputSchema": schema_for(*tool).to_json_schema(),
            })
        })
        .collect();
    json!({"tools": tools})
}

fn result_envelope(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error_envelope(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_every_tool_with_schema() {
        let catalog = tool_catalog();
        let tools = catalog["tools"].as_array().unwrap();
        assert_eq!(tools.len(), ToolName::ALL.len());
        for tool in tools {
            assert!(tool["inputSchema"]["type"] == "object");
            assert!(!tool["description"].as_str().unwrap().is_empty());
        }
    }
}
