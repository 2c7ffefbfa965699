use chatrelay_agents::{ChatMessage, CompletionProvider, CompletionRequest, OpenRouterProvider};
use chatrelay_common::{Error, Role};
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> CompletionRequest {
    CompletionRequest {
        model: "openai/gpt-4o-mini".to_string(),
        messages: vec![
            ChatMessage::new(Role::System, "Be brief."),
            ChatMessage::new(Role::User, "Hello"),
        ],
    }
}

fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::from(": OPENROUTER PROCESSING\n\n");
    for fragment in fragments {
        let line = json!({ "choices": [{ "delta": { "content": fragment } }] });
        body.push_str(&format!("data: {line}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

#[tokio::test]
async fn test_openrouter_streams_fragments() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(header("X-Title", "chatrelay"))
        .and(header("HTTP-Referer", "https://chat.example.com"))
        .and(body_partial_json(json!({
            "model": "openai/gpt-4o-mini",
            "stream": true,
            "messages": [
                { "role": "system", "content": "Be brief." },
                { "role": "user", "content": "Hello" }
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["Hel", "lo", " there"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenRouterProvider::new("test-key".to_string(), Some(mock_server.uri()))
        .with_attribution(
            Some("https://chat.example.com".to_string()),
            Some("chatrelay".to_string()),
        );

    let stream = provider.stream_completion(&request()).await.unwrap();
    let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;

    assert_eq!(fragments, vec!["Hel", "lo", " there"]);
}

#[tokio::test]
async fn test_openrouter_error_status_names_reason() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&mock_server)
        .await;

    let provider = OpenRouterProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let err = match provider.stream_completion(&request()).await {
        Ok(_) => panic!("expected an upstream error"),
        Err(err) => err,
    };

    match err {
        Error::Upstream(message) => {
            assert_eq!(message, "OpenRouter API error: Too Many Requests");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_openrouter_ignores_content_after_done() {
    let mock_server = MockServer::start().await;

    let mut body = sse_body(&["only"]);
    body.push_str("data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let provider = OpenRouterProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let stream = provider.stream_completion(&request()).await.unwrap();
    let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;

    assert_eq!(fragments, vec!["only"]);
}
