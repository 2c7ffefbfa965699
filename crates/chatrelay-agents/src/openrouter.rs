use crate::providers::{CompletionProvider, CompletionRequest, TextStream};
use async_trait::async_trait;
use bytes::Bytes;
use chatrelay_common::{Error, Result};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Streaming client for an OpenAI-compatible chat completions endpoint (OpenRouter).
#[derive(Clone)]
pub struct OpenRouterProvider {
    client: Client,
    api_key: String,
    base_url: String,
    referer: Option<String>,
    title: Option<String>,
}

impl OpenRouterProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            referer: None,
            title: None,
        }
    }

    /// Attribution headers OpenRouter uses for app rankings.
    pub fn with_attribution(mut self, referer: Option<String>, title: Option<String>) -> Self {
        self.referer = referer;
        self.title = title;
        self
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterProvider {
    fn provider_id(&self) -> &str {
        "openrouter"
    }

    async fn stream_completion(&self, request: &CompletionRequest) -> Result<TextStream> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let body = json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
        });

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            builder = builder.header("X-Title", title);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("OpenRouter request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or(status.as_str());
            return Err(Error::Upstream(format!("OpenRouter API error: {reason}")));
        }

        debug!(model = %request.model, "completion stream opened");
        Ok(relay_bytes(response.bytes_stream()))
    }
}

/// Wrap a raw byte stream from an SSE endpoint into a stream of text fragments.
pub fn relay_bytes<S, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    let bytes = bytes.map(|chunk| chunk.map_err(|e| e.to_string()));
    SseRelay {
        stream: Box::pin(bytes),
        decoder: SseLineDecoder::default(),
        queue: VecDeque::new(),
        finished: false,
    }
    .boxed()
}

type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, String>> + Send>>;

struct SseRelay {
    stream: ByteStream,
    decoder: SseLineDecoder,
    queue: VecDeque<String>,
    finished: bool,
}

impl SseRelay {
    /// Drop the upstream body so the connection is returned as soon as the
    /// terminator is seen, even if the caller keeps polling.
    fn release(&mut self) {
        self.finished = true;
        self.stream = Box::pin(futures::stream::empty());
    }
}

impl Stream for SseRelay {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(fragment) = self.queue.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    for line in self.decoder.push(&chunk) {
                        match parse_line(&line) {
                            LineOutcome::Fragment(text) => self.queue.push_back(text),
                            LineOutcome::Terminate => {
                                self.release();
                                break;
                            }
                            LineOutcome::Skip => {}
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.release();
                    return Poll::Ready(Some(Err(Error::Upstream(format!(
                        "completion stream read failed: {e}"
                    )))));
                }
                Poll::Ready(None) => self.release(),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Reassembles newline-terminated lines from arbitrarily split network chunks.
///
/// Bytes that end mid code point are held back until the rest arrives; the
/// text after the last newline is held back until its newline arrives.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    pending: Vec<u8>,
    buffer: String,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completes, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        self.decode_pending();

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Text held back because no newline has arrived for it yet.
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    fn decode_pending(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            // incomplete sequence at the tail
                            self.pending.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Fragment(String),
    Terminate,
    Skip,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_line(line: &str) -> LineOutcome {
    let Some(data) = line.strip_prefix("data: ") else {
        return LineOutcome::Skip;
    };
    if data == "[DONE]" {
        return LineOutcome::Terminate;
    }

    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map(LineOutcome::Fragment)
            .unwrap_or(LineOutcome::Skip),
        Err(e) => {
            debug!("skipping malformed completion line: {e}");
            LineOutcome::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn sample_body() -> String {
        [
            ": OPENROUTER PROCESSING",
            "",
            r#"data: {"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
            "",
            r#"data: {"choices":[{"delta":{"content":"Héllo"}}]}"#,
            "",
            r#"data: {"choices":[{"delta":{"content":", wörld 🦊"}}]}"#,
            "",
            "data: {not json",
            "",
            r#"data: {"choices":[{"delta":{"content":"!"}}]}"#,
            "",
            "data: [DONE]",
            "",
            r#"data: {"choices":[{"delta":{"content":"after done"}}]}"#,
            "",
        ]
        .join("\n")
    }

    async fn relay_chunks(chunks: Vec<Vec<u8>>) -> Vec<String> {
        let source = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<Bytes, Infallible>(Bytes::from(c))),
        );
        relay_bytes(source)
            .map(|item| item.unwrap())
            .collect()
            .await
    }

    #[test]
    fn parse_line_extracts_first_choice_content() {
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"content":"hi"}},{"delta":{"content":"no"}}]}"#),
            LineOutcome::Fragment("hi".into())
        );
        assert_eq!(parse_line("data: [DONE]"), LineOutcome::Terminate);
        assert_eq!(parse_line("event: ping"), LineOutcome::Skip);
        assert_eq!(parse_line("data: 42"), LineOutcome::Skip);
        assert_eq!(parse_line(r#"data: {"choices":[]}"#), LineOutcome::Skip);
    }

    #[test]
    fn decoder_holds_incomplete_line() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.remainder(), "data: {\"a\"");
        assert_eq!(decoder.push(b":1}\r\nrest"), vec!["data: {\"a\":1}".to_string()]);
        assert_eq!(decoder.remainder(), "rest");
    }

    #[test]
    fn decoder_holds_split_code_point() {
        let mut decoder = SseLineDecoder::new();
        let bytes = "é\n".as_bytes();
        assert!(decoder.push(&bytes[..1]).is_empty());
        assert_eq!(decoder.remainder(), "");
        assert_eq!(decoder.push(&bytes[1..]), vec!["é".to_string()]);
    }

    #[tokio::test]
    async fn relay_stops_at_done_and_skips_noise() {
        let fragments = relay_chunks(vec![sample_body().into_bytes()]).await;
        assert_eq!(fragments, vec!["Héllo", ", wörld 🦊", "!"]);
    }

    #[tokio::test]
    async fn relay_is_independent_of_chunk_boundaries() {
        let body = sample_body().into_bytes();
        let expected = relay_chunks(vec![body.clone()]).await;

        for split in 1..body.len() {
            let chunks = vec![body[..split].to_vec(), body[split..].to_vec()];
            assert_eq!(relay_chunks(chunks).await, expected, "split at byte {split}");
        }

        let single_bytes = body.iter().map(|b| vec![*b]).collect();
        assert_eq!(relay_chunks(single_bytes).await, expected);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_not_emitted() {
        let body = r#"data: {"choices":[{"delta":{"content":"partial"}}]}"#;
        let fragments = relay_chunks(vec![body.as_bytes().to_vec()]).await;
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn read_error_surfaces_as_upstream_error() {
        let source = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n")),
            Err("connection reset"),
        ]);
        let items: Vec<_> = relay_bytes(source).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(matches!(items[1], Err(Error::Upstream(_))));
    }
}
