use super::*;
use crate::registry::{CustomTool, ToolResult};
use crate::synth::{SynthOptions, ToolFilter, ToolsMode, synthesize_tools};
use async_trait::async_trait;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(json!(1)),
        method: method.into(),
        params,
    }
}

fn dispatcher_for(base_url: &str) -> McpDispatcher {
    let doc = json!({
        "paths": {
            "/pets": {"get": {"operationId": "listPets", "summary": "List all pets"}}
        }
    });
    let tools = synthesize_tools(&doc, &SynthOptions::default()).unwrap();
    let registry = Arc::new(ToolRegistry::new(tools, ToolsMode::All, &ToolFilter::default()));
    let executor = Arc::new(RequestExecutor::new(
        Url::parse(base_url).unwrap(),
        None,
        registry.clone(),
    ));
    McpDispatcher::new(
        registry,
        executor,
        Arc::new(PromptStore::new()),
        Arc::new(ResourceStore::new()),
    )
}

#[tokio::test]
async fn initialize_reports_capabilities() {
    let d = dispatcher_for("http://localhost:1");
    let resp = d
        .handle(request(
            "initialize",
            json!({"protocolVersion": "2025-03-26", "capabilities": {}, "clientInfo": {"name": "t"}}),
        ))
        .await
        .unwrap();
    let result = resp.result.unwrap();
    assert_eq!(result["protocolVersion"], "2025-03-26");
    assert_eq!(result["serverInfo"]["name"], crate::SERVER_NAME);
    assert!(result["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn ping_returns_empty_object() {
    let d = dispatcher_for("http://localhost:1");
    let resp = d.handle(request("ping", json!({}))).await.unwrap();
    assert_eq!(resp.result.unwrap(), json!({}));
}

#[tokio::test]
async fn notifications_get_no_response() {
    let d = dispatcher_for("http://localhost:1");
    let req = JsonRpcRequest {
        jsonrpc: "2.0".into(),
        id: None,
        method: "notifications/initialized".into(),
        params: json!({}),
    };
    assert!(d.handle(req).await.is_none());
}

#[tokio::test]
async fn tools_list_includes_synthesised_tools() {
    let d = dispatcher_for("http://localhost:1");
    let resp = d.handle(request("tools/list", json!({}))).await.unwrap();
    let tools = resp.result.unwrap()["tools"].clone();
    assert_eq!(tools[0]["name"], "list-pets");
    assert!(tools[0]["inputSchema"].is_object());
}

#[tokio::test]
async fn tools_call_wraps_result_in_content_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[1,2]"))
        .mount(&server)
        .await;

    let d = dispatcher_for(&server.uri());
    let resp = d
        .handle(request("tools/call", json!({"name": "list-pets", "arguments": {}})))
        .await
        .unwrap();
    let result = resp.result.unwrap();
    assert_eq!(result["content"][0]["type"], "text");
    assert_eq!(result["content"][0]["text"], "[1,2]");
    assert!(result.get("isError").is_none());
}

#[tokio::test]
async fn tools_call_failure_sets_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pets"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let d = dispatcher_for(&server.uri());
    let resp = d
        .handle(request("tools/call", json!({"name": "list-pets", "arguments": {}})))
        .await
        .unwrap();
    let result = resp.result.unwrap();
    assert_eq!(result["isError"], true);
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("500"));
    assert!(text.contains("boom"));
}

#[tokio::test]
async fn tools_call_unknown_tool_is_rpc_error() {
    let d = dispatcher_for("http://localhost:1");
    let resp = d
        .handle(request("tools/call", json!({"name": "ghost", "arguments": {}})))
        .await
        .unwrap();
    let error = resp.error.unwrap();
    assert!(error.message.contains("ghost"));
}

#[tokio::test]
async fn tools_call_lookup_is_case_insensitive_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let d = dispatcher_for(&server.uri());
    let resp = d
        .handle(request("tools/call", json!({"name": "get::PETS", "arguments": {}})))
        .await
        .unwrap();
    assert!(resp.error.is_none());
}

#[tokio::test]
async fn custom_tool_called_through_dispatcher() {
    struct Shout;

    #[async_trait]
    impl CustomTool for Shout {
        fn name(&self) -> &str {
            "shout"
        }
        fn description(&self) -> &str {
            "Uppercase the input"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::new(
                args["text"].as_str().unwrap_or("").to_uppercase(),
            ))
        }
    }

    let d = dispatcher_for("http://localhost:1");
    d.registry().register_custom(Arc::new(Shout));
    let resp = d
        .handle(request(
            "tools/call",
            json!({"name": "shout", "arguments": {"text": "hi"}}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.result.unwrap()["content"][0]["text"], "HI");
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let d = dispatcher_for("http://localhost:1");
    let resp = d.handle(request("bogus/method", json!({}))).await.unwrap();
    assert_eq!(resp.error.unwrap().code, codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn prompts_and_resources_round_trip() {
    let d = dispatcher_for("http://localhost:1");
    d.prompts().register(Prompt {
        name: "greet".into(),
        description: "Greet".into(),
        arguments: vec![],
        template: "Hello {{who}}".into(),
    });
    d.resources().register(Resource {
        uri: "doc://a".into(),
        name: "a".into(),
        description: String::new(),
        mime_type: "text/plain".into(),
        text: "contents".into(),
    });

    let listed = d.handle(request("prompts/list", json!({}))).await.unwrap();
    assert_eq!(listed.result.unwrap()["prompts"][0]["name"], "greet");

    let got = d
        .handle(request(
            "prompts/get",
            json!({"name": "greet", "arguments": {"who": "x"}}),
        ))
        .await
        .unwrap();
    assert_eq!(
        got.result.unwrap()["messages"][0]["content"]["text"],
        "Hello x"
    );

    let read = d
        .handle(request("resources/read", json!({"uri": "doc://a"})))
        .await
        .unwrap();
    assert_eq!(read.result.unwrap()["contents"][0]["text"], "contents");

    let missing = d
        .handle(request("resources/read", json!({"uri": "doc://zz"})))
        .await
        .unwrap();
    assert!(missing.error.is_some());
}
