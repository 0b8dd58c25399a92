mod harness;

use harness::config::ConfigBuilder;
use harness::mock_backend::MockBackend;
use harness::server::TestServer;
use indoc::indoc;
use serde_json::{Value, json};
use toolgate_config::BackendType;

fn weather_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": "get_weather",
            "description": "Current weather for a city",
            "parameters": {
                "type": "object",
                "properties": {
                    "location": { "type": "string", "description": "City name" },
                    "units": { "type": "string", "enum": ["celsius", "fahrenheit"] }
                },
                "required": ["location"]
            }
        }
    })
}

fn arguments(call: &Value) -> Value {
    serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn emulated_tool_call_from_text_backend() {
    let mock = MockBackend::start(indoc! {r#"
        TOOL_CALLS:
        [{"name":"get_weather","arguments":{"location":"Paris"}}]
    "#})
    .await
    .unwrap();
    let config = ConfigBuilder::new().with_text_backend("local", &mock.base_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let (status, body) = server
        .post_json(
            "/v1/chat/completions",
            &json!({
                "model": "llama-3-8b",
                "messages": [{"role": "user", "content": "What's the weather in Paris?"}],
                "tools": [weather_tool()]
            }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["object"], "chat.completion");
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));

    let choice = &body["choices"][0];
    assert_eq!(choice["finish_reason"], "tool_calls");
    assert_eq!(choice["message"]["role"], "assistant");
    assert_eq!(choice["message"]["content"], "");

    let call = &choice["message"]["tool_calls"][0];
    assert_eq!(call["type"], "function");
    assert!(call["id"].as_str().unwrap().starts_with("call_"));
    assert_eq!(call["function"]["name"], "get_weather");
    assert_eq!(arguments(call), json!({"location": "Paris"}));

    let usage = &body["usage"];
    assert_eq!(
        usage["total_tokens"].as_u64().unwrap(),
        usage["prompt_tokens"].as_u64().unwrap() + usage["completion_tokens"].as_u64().unwrap()
    );

    // The backend sees tools only as prompt text
    let request = &mock.requests()[0];
    assert!(request.get("tools").is_none());
    assert!(request["prompt"].as_str().unwrap().contains("get_weather"));
}

#[tokio::test]
async fn plain_text_without_tools() {
    let mock = MockBackend::start("Hello! How can I help?").await.unwrap();
    let config = ConfigBuilder::new().with_text_backend("local", &mock.base_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let (status, body) = server
        .post_json(
            "/v1/chat/completions",
            &json!({
                "model": "llama-3-8b",
                "messages": [{"role": "user", "content": "Hi"}]
            }),
        )
        .await;

    assert_eq!(status, 200);
    let choice = &body["choices"][0];
    assert_eq!(choice["finish_reason"], "stop");
    assert_eq!(choice["message"]["content"], "Hello! How can I help?");
    assert!(choice["message"].get("tool_calls").is_none_or(Value::is_null));
}

#[tokio::test]
async fn chat_backend_never_receives_tools() {
    let mock = MockBackend::start(r#"[{"name":"get_weather","arguments":{"location":"Tokyo","units":"celsius"}}]"#)
        .await
        .unwrap();
    let config = ConfigBuilder::new()
        .with_backend("chat", BackendType::Openai, &mock.base_url())
        .build();
    let server = TestServer::start(config).await.unwrap();

    let (status, body) = server
        .post_json(
            "/v1/chat/completions",
            &json!({
                "model": "chat/mock-model",
                "messages": [{"role": "user", "content": "Weather in Tokyo?"}],
                "tools": [weather_tool()]
            }),
        )
        .await;

    assert_eq!(status, 200);
    let call = &body["choices"][0]["message"]["tool_calls"][0];
    assert_eq!(call["function"]["name"], "get_weather");
    assert_eq!(arguments(call), json!({"location": "Tokyo", "units": "celsius"}));

    let request = &mock.requests()[0];
    assert_eq!(request["model"], "mock-model");
    assert!(request.get("tools").is_none());
}

#[tokio::test]
async fn invalid_tool_rejects_whole_batch() {
    let mock = MockBackend::start("unused").await.unwrap();
    let config = ConfigBuilder::new().with_text_backend("local", &mock.base_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let (status, body) = server
        .post_json(
            "/v1/chat/completions",
            &json!({
                "model": "llama-3-8b",
                "messages": [{"role": "user", "content": "Hi"}],
                "tools": [
                    weather_tool(),
                    {
                        "type": "function",
                        "function": {
                            "name": "lookup",
                            "parameters": {
                                "type": "object",
                                "properties": { "id": { "description": "no type" } }
                            }
                        }
                    }
                ]
            }),
        )
        .await;

    assert_eq!(status, 400);
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["param"], "tools");

    let details = body["error"]["details"].as_array().unwrap();
    assert_eq!(details.len(), 2);
    assert!(details.iter().all(|issue| issue["tool"] == "lookup"));

    assert_eq!(mock.request_count(), 0);
}

#[tokio::test]
async fn json_data_in_prose_is_not_a_tool_call() {
    let reply = r#"Here is the sample data you asked for: [{"name": "Alice", "age": 30}]"#;
    let mock = MockBackend::start(reply).await.unwrap();
    let config = ConfigBuilder::new().with_text_backend("local", &mock.base_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let (status, body) = server
        .post_json(
            "/v1/chat/completions",
            &json!({
                "model": "llama-3-8b",
                "messages": [{"role": "user", "content": "Show me some sample data"}],
                "tools": [weather_tool()]
            }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["choices"][0]["message"]["content"], reply);
    assert!(body["choices"][0]["message"].get("tool_calls").is_none());
}

#[tokio::test]
async fn non_compliant_call_degrades_to_text() {
    let mock = MockBackend::start(r#"TOOL_CALLS: [{"name": 42, "arguments": {}}]"#).await.unwrap();
    let config = ConfigBuilder::new().with_text_backend("local", &mock.base_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let (status, body) = server
        .post_json(
            "/v1/chat/completions",
            &json!({
                "model": "llama-3-8b",
                "messages": [{"role": "user", "content": "Weather?"}],
                "tools": [weather_tool()]
            }),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(
        body["choices"][0]["message"]["content"],
        r#"TOOL_CALLS: [{"name": 42, "arguments": {}}]"#
    );
}

#[tokio::test]
async fn upstream_failure_is_bad_gateway() {
    let mock = MockBackend::start_failing().await.unwrap();
    let config = ConfigBuilder::new().with_text_backend("local", &mock.base_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let (status, body) = server
        .post_json(
            "/v1/chat/completions",
            &json!({
                "model": "llama-3-8b",
                "messages": [{"role": "user", "content": "Hi"}]
            }),
        )
        .await;

    assert_eq!(status, 502);
    assert_eq!(body["error"]["type"], "upstream_error");
}

#[tokio::test]
async fn models_lists_backends() {
    let mock = MockBackend::start("unused").await.unwrap();
    let config = ConfigBuilder::new()
        .with_text_backend("local", &mock.base_url())
        .with_backend("chat", BackendType::Openai, &mock.base_url())
        .build();
    let server = TestServer::start(config).await.unwrap();

    let body: Value = server
        .client()
        .get(server.url("/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["object"], "list");
    let ids: Vec<_> = body["data"].as_array().unwrap().iter().map(|m| m["id"].clone()).collect();
    assert_eq!(ids, [json!("local"), json!("chat")]);
}
