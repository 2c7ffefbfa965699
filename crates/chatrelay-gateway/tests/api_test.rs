use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chatrelay_agents::{
    CompletionProvider, CompletionRequest, MemoriesProvider, RunwareProvider, TextStream,
};
use chatrelay_common::{Result, StreamEvent};
use chatrelay_config::AppConfig;
use chatrelay_db::ChatStore;
use chatrelay_gateway::router::build_router;
use chatrelay_gateway::state::AppState;
use futures::StreamExt;
use futures::stream;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct EchoCompletion;

#[async_trait]
impl CompletionProvider for EchoCompletion {
    fn provider_id(&self) -> &str {
        "echo"
    }

    async fn stream_completion(&self, request: &CompletionRequest) -> Result<TextStream> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let items = vec![Ok("You said: ".to_string()), Ok(last)];
        Ok(stream::iter(items).boxed())
    }
}

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    memories_server: MockServer,
}

impl TestServer {
    async fn start(config: AppConfig) -> Self {
        let memories_server = MockServer::start().await;
        let memories = MemoriesProvider::new(
            Some("mem-key".to_string()),
            Some(memories_server.uri()),
        );
        let state = Arc::new(AppState::new(
            config,
            Arc::new(ChatStore::in_memory().unwrap()),
            Arc::new(EchoCompletion),
            Arc::new(RunwareProvider::new(None, None)),
            Arc::new(memories),
        ));
        let app = build_router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            memories_server,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn get(&self, path: &str, user: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).header("x-user-id", user)
    }

    fn post(&self, path: &str, user: &str, body: Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("x-user-id", user)
            .json(&body)
    }

    async fn create_conversation(&self, user: &str) -> String {
        let response = self
            .post("/chat/conversations", user, json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    async fn send(&self, user: &str, conversation_id: &str, content: &str) -> Vec<StreamEvent> {
        let response = self
            .post(
                "/chat/send",
                user,
                json!({ "conversationId": conversation_id, "content": content }),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = response.text().await.unwrap();
        body.lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| serde_json::from_str(data.trim()).unwrap())
            .collect()
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start(AppConfig::default()).await;
    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let server = TestServer::start(AppConfig::default()).await;
    let response = server
        .client
        .get(server.url("/chat/conversations"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_api_key_is_enforced_when_configured() {
    let mut config = AppConfig::default();
    config.gateway.api_key = Some("secret".to_string());
    let server = TestServer::start(config).await;

    let rejected = server.get("/chat/conversations", "u1").send().await.unwrap();
    assert_eq!(rejected.status(), 401);

    let accepted = server
        .get("/chat/conversations", "u1")
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), 200);
}

#[tokio::test]
async fn test_send_streams_events_and_persists_reply() {
    let server = TestServer::start(AppConfig::default()).await;
    let conversation_id = server.create_conversation("u1").await;

    let events = server.send("u1", &conversation_id, "hello there").await;

    assert_eq!(
        &events[..2],
        &[
            StreamEvent::chunk("You said: "),
            StreamEvent::chunk("hello there"),
        ]
    );
    let message_id = match events.last() {
        Some(StreamEvent::Done {
            message_id: Some(id),
        }) => id.clone(),
        other => panic!("expected done with id, got {other:?}"),
    };
    assert_eq!(events.iter().filter(|e| e.is_done()).count(), 1);

    let detail: Value = server
        .get(&format!("/chat/conversations/{conversation_id}"), "u1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["conversation"]["title"], "hello there");
    let messages = detail["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["id"], message_id.as_str());
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "You said: hello there");
}

#[tokio::test]
async fn test_send_to_foreign_conversation_only_sends_done() {
    let server = TestServer::start(AppConfig::default()).await;
    let conversation_id = server.create_conversation("owner").await;

    let events = server.send("intruder", &conversation_id, "hello there").await;
    assert_eq!(events, vec![StreamEvent::done(None)]);

    let detail: Value = server
        .get(&format!("/chat/conversations/{conversation_id}"), "owner")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(detail["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_register_media_records_upload() {
    let server = TestServer::start(AppConfig::default()).await;
    Mock::given(method("POST"))
        .and(path("/upload_url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "0000",
            "msg": "success",
            "data": {
                "videoNo": "VI600000000000000001",
                "videoName": "launch",
                "videoStatus": "UNPARSE",
                "uploadTime": "1744905509814"
            },
            "failed": false
        })))
        .expect(1)
        .mount(&server.memories_server)
        .await;
    let conversation_id = server.create_conversation("u1").await;

    let response = server
        .post(
            "/chat/media",
            "u1",
            json!({ "conversationId": conversation_id, "url": "https://cdn.example.com/launch.mp4" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let media: Value = response.json().await.unwrap();
    assert_eq!(
        media,
        json!({ "id": "VI600000000000000001", "name": "launch", "state": "processing" })
    );

    let detail: Value = server
        .get(&format!("/chat/conversations/{conversation_id}"), "u1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["media"][0]["id"], "VI600000000000000001");
}

#[tokio::test]
async fn test_register_media_requires_ownership() {
    let server = TestServer::start(AppConfig::default()).await;
    let conversation_id = server.create_conversation("owner").await;

    let response = server
        .post(
            "/chat/media",
            "intruder",
            json!({ "conversationId": conversation_id, "url": "https://cdn.example.com/a.mp4" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_delete_conversation() {
    let server = TestServer::start(AppConfig::default()).await;
    let conversation_id = server.create_conversation("u1").await;
    let path = format!("/chat/conversations/{conversation_id}");

    let deleted = server
        .client
        .delete(server.url(&path))
        .header("x-user-id", "u1")
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let missing = server.get(&path, "u1").send().await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_tools_catalogue_lists_both_backends() {
    let server = TestServer::start(AppConfig::default()).await;
    let body: Value = server
        .client
        .get(server.url("/tools"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 17);
    assert!(
        tools
            .iter()
            .any(|t| t["name"] == "generateVideo" && t["backend"] == "primary")
    );
    assert!(
        tools
            .iter()
            .any(|t| t["name"] == "chatWithVideos" && t["backend"] == "secondary")
    );
}

#[tokio::test]
async fn test_tool_call_rejects_invalid_arguments() {
    let server = TestServer::start(AppConfig::default()).await;
    let response = server
        .post(
            "/tools/call",
            "u1",
            json!({ "name": "upscaleImage", "args": { "imageUrl": "not a url", "factor": 2 } }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("invalid tool arguments"));
}
