//! Stream-RPC envelope handling over the shared pipeline.

mod common;

use pagepilot_server::rpc::handle_line;
use serde_json::{json, Value};

#[tokio::test]
async fn tools_list_returns_the_catalog() {
    let state = common::test_state("rpc-list").await;
    let response = handle_line(&state, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).await;

    assert_eq!(response["id"], 1);
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 7);
    assert!(tools
        .iter()
        .any(|tool| tool["name"] == "search_runbooks"
            && tool["inputSchema"]["required"][0] == "alert_type"));
}

#[tokio::test]
async fn tools_call_wraps_the_envelope_in_text_content() {
    let state = common::test_state("rpc-call").await;
    let request = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": {
            "name": "search_runbooks",
            "arguments": {
                "alert_type": "disk_full",
                "severity": "critical",
                "affected_systems": ["database"],
            }
        }
    });

    let response = handle_line(&state, &request.to_string()).await;
    assert_eq!(response["id"], 7);
    assert_eq!(response["result"]["isError"], false);
    assert_eq!(response["result"]["content"][0]["type"], "text");

    let inner: Value =
        serde_json::from_str(response["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(inner["success"], true);
    assert_eq!(inner["data"]["runbooks"][0]["runbook"]["id"], "rb-disk-full");
    assert!(inner["metadata"]["correlation_id"]
        .as_str()
        .unwrap()
        .starts_with("req_"));
}

#[tokio::test]
async fn validation_failures_surface_as_error_envelopes() {
    let state = common::test_state("rpc-invalid").await;
    let request = json!({
        "jsonrpc": "2.0",
        "id": 8,
        "method": "tools/call",
        "params": {"name": "search_knowledge_base", "arguments": {"query": "a"}}
    });

    let response = handle_line(&state, &request.to_string()).await;
    assert_eq!(response["result"]["isError"], true);
    let inner: Value =
        serde_json::from_str(response["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(inner["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_methods_and_bad_json_are_rejected() {
    let state = common::test_state("rpc-bad").await;

    let response = handle_line(&state, r#"{"jsonrpc":"2.0","id":9,"method":"tools/burn"}"#).await;
    assert_eq!(response["error"]["code"], -32601);

    let response = handle_line(&state, "not json at all").await;
    assert_eq!(response["error"]["code"], -32700);
}
