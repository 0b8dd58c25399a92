mod harness;

use harness::config::ConfigBuilder;
use harness::mock_backend::MockBackend;
use harness::server::TestServer;
use serde_json::{Value, json};

async fn send(server: &TestServer, conversation: &str, content: &str) -> reqwest::StatusCode {
    server
        .client()
        .post(server.url("/v1/chat/completions"))
        .header("x-conversation-id", conversation)
        .json(&json!({
            "model": "llama-3-8b",
            "messages": [{"role": "user", "content": content}]
        }))
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn history_accumulates_under_conversation_id() {
    let mock = MockBackend::start("Noted.").await.unwrap();
    let config = ConfigBuilder::new().with_text_backend("local", &mock.base_url()).build();
    let server = TestServer::start(config).await.unwrap();

    assert_eq!(send(&server, "thread-1", "My name is Ada.").await, 200);
    assert_eq!(send(&server, "thread-1", "What is my name?").await, 200);

    let second_prompt = mock.requests()[1]["prompt"].as_str().unwrap().to_owned();
    assert!(second_prompt.contains("My name is Ada."));

    let summary: Value = server
        .client()
        .get(server.url("/v1/conversations/thread-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["id"], "thread-1");
    assert_eq!(summary["summary"]["messages"], 4);
}

#[tokio::test]
async fn delete_clears_conversation() {
    let mock = MockBackend::start("Noted.").await.unwrap();
    let config = ConfigBuilder::new().with_text_backend("local", &mock.base_url()).build();
    let server = TestServer::start(config).await.unwrap();

    assert_eq!(send(&server, "thread-2", "Remember this.").await, 200);

    let url = server.url("/v1/conversations/thread-2");
    let deleted = server.client().delete(&url).send().await.unwrap();
    assert_eq!(deleted.status(), 204);

    let missing = server.client().get(&url).send().await.unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"]["type"], "not_found_error");

    let again = server.client().delete(&url).send().await.unwrap();
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn requests_without_id_share_nothing() {
    let mock = MockBackend::start("Noted.").await.unwrap();
    let config = ConfigBuilder::new().with_text_backend("local", &mock.base_url()).build();
    let server = TestServer::start(config).await.unwrap();

    for content in ["first secret", "second question"] {
        let (status, _) = server
            .post_json(
                "/v1/chat/completions",
                &json!({
                    "model": "llama-3-8b",
                    "messages": [{"role": "user", "content": content}]
                }),
            )
            .await;
        assert_eq!(status, 200);
    }

    let second_prompt = mock.requests()[1]["prompt"].as_str().unwrap().to_owned();
    assert!(!second_prompt.contains("first secret"));
}
