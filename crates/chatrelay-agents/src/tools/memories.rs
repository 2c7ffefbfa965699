use async_trait::async_trait;
use chatrelay_common::{Error, Result};
use chatrelay_config::MemoriesConfig;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{Backend, ToolArgs, ToolDefinition, ToolProvider};

pub const DEFAULT_API_BASE_URL: &str = "https://api.memories.ai/serve/api/v1";
const SUCCESS_CODE: &str = "0000";

/// Client for the Memories video understanding API.
#[derive(Clone)]
pub struct MemoriesProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    unique_id: String,
}

/// Metadata returned when a video is accepted for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUpload {
    pub video_no: String,
    #[serde(default)]
    pub video_name: String,
    #[serde(default)]
    pub video_status: String,
    #[serde(default)]
    pub upload_time: Option<String>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    failed: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptionSegment {
    #[serde(default)]
    content: String,
    #[serde(default)]
    start_time: String,
    #[serde(default)]
    end_time: String,
}

#[derive(Deserialize)]
struct SummaryItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    start: String,
}

impl MemoriesProvider {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            unique_id: "default".to_string(),
        }
    }

    pub fn from_config(config: &MemoriesConfig) -> Self {
        Self::new(config.api_key.clone(), Some(config.base_url.clone()))
            .with_unique_id(config.unique_id.clone())
    }

    /// Workspace identifier the backend partitions uploads by.
    pub fn with_unique_id(mut self, unique_id: String) -> Self {
        self.unique_id = unique_id;
        self
    }

    /// Register a directly streamable video URL for indexing.
    pub async fn upload_video_url(&self, url: &str) -> Result<VideoUpload> {
        let data = self
            .call_api(
                Method::POST,
                "/upload_url",
                Some(json!({ "url": url, "unique_id": self.unique_id })),
                &[],
            )
            .await?;
        serde_json::from_value(data)
            .map_err(|e| Error::Tool(format!("unexpected upload response: {e}")))
    }

    async fn call_api(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        query: &[(&str, &str)],
    ) -> Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Tool("MEMORIES_API_KEY is not configured".into()))?;

        let url = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint);
        debug!(%method, %url, "calling Memories API");

        let mut builder = self
            .client
            .request(method, &url)
            .header("Authorization", api_key);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Tool(format!("Memories request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Tool(format!(
                "Memories API error: {} - {}",
                status.as_u16(),
                error_text
            )));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| Error::Tool(format!("failed to parse Memories response: {e}")))?;

        if envelope.code != SUCCESS_CODE && envelope.failed {
            return Err(Error::Tool(format!("Memories error: {}", envelope.msg)));
        }
        Ok(envelope.data)
    }

    async fn chat(&self, endpoint: &str, mut body: Value) -> Result<Value> {
        body["session_id"] = json!("");
        body["unique_id"] = json!(self.unique_id);
        let data = self.call_api(Method::POST, endpoint, Some(body), &[]).await?;
        Ok(match data.get("content").and_then(Value::as_str) {
            Some(content) => Value::String(content.to_string()),
            None => data,
        })
    }

    async fn transcription(&self, endpoint: &str, video_no: &str) -> Result<Value> {
        let data = self
            .call_api(
                Method::GET,
                endpoint,
                None,
                &[("video_no", video_no), ("unique_id", self.unique_id.as_str())],
            )
            .await?;
        let segments: Vec<TranscriptionSegment> = data
            .get("transcriptions")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        if segments.is_empty() {
            return Ok(Value::String(format!("No transcription available for {video_no}.")));
        }
        let lines: Vec<String> = segments
            .iter()
            .map(|s| format!("[{} - {}] {}", s.start_time, s.end_time, s.content.trim()))
            .collect();
        Ok(Value::String(lines.join("\n")))
    }
}

fn video_id(video_no: &Option<String>) -> Result<&str> {
    video_no
        .as_deref()
        .ok_or_else(|| Error::Validation("a video ID is required".into()))
}

fn format_summary(data: &Value) -> Result<String> {
    let summary = data.get("summary").and_then(Value::as_str).unwrap_or_default();
    let items: Vec<SummaryItem> = data
        .get("items")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?
        .unwrap_or_default();

    let mut out = summary.trim().to_string();
    for item in items {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("- [{}] {}: {}", item.start, item.title, item.description));
    }
    Ok(out)
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

#[async_trait]
impl ToolProvider for MemoriesProvider {
    fn backend(&self) -> Backend {
        Backend::Secondary
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        let video_no = json!({ "videoNo": { "type": "string", "description": "Video ID" } });
        vec![
            ToolDefinition::new(
                "uploadVideoFromURL",
                "Upload a video from a direct streaming URL (mp4, etc.)",
                object_schema(json!({ "url": { "type": "string" } }), &["url"]),
            ),
            ToolDefinition::new(
                "uploadVideoFromPlatform",
                "Upload videos from TikTok, YouTube, or Instagram URLs",
                object_schema(
                    json!({ "urls": { "type": "array", "items": { "type": "string" } } }),
                    &["urls"],
                ),
            ),
            ToolDefinition::new(
                "chatWithVideos",
                "Ask questions about uploaded videos using their video IDs",
                object_schema(
                    json!({
                        "videoNos": { "type": "array", "items": { "type": "string" } },
                        "prompt": { "type": "string" }
                    }),
                    &["videoNos", "prompt"],
                ),
            ),
            ToolDefinition::new(
                "videoMarketerChat",
                "Query a large index of public social videos for market research",
                object_schema(
                    json!({
                        "prompt": { "type": "string" },
                        "platform": { "type": "string", "enum": ["TIKTOK", "YOUTUBE", "INSTAGRAM"] }
                    }),
                    &["prompt"],
                ),
            ),
            ToolDefinition::new(
                "chatWithPersonalMedia",
                "Ask questions about all your uploaded videos using semantic search",
                object_schema(json!({ "prompt": { "type": "string" } }), &["prompt"]),
            ),
            ToolDefinition::new(
                "getVideoTranscription",
                "Get full video transcription (visual + audio)",
                object_schema(video_no.clone(), &["videoNo"]),
            ),
            ToolDefinition::new(
                "getAudioTranscription",
                "Get audio-only transcription from video",
                object_schema(video_no, &["videoNo"]),
            ),
            ToolDefinition::new(
                "generateSummary",
                "Generate chapter or topic summary for a video",
                object_schema(
                    json!({
                        "videoNo": { "type": "string" },
                        "kind": { "type": "string", "enum": ["CHAPTER", "TOPIC"] }
                    }),
                    &["videoNo", "kind"],
                ),
            ),
        ]
    }

    async fn call_tool(&self, args: &ToolArgs) -> Result<Value> {
        match args {
            ToolArgs::UploadVideoUrl { url } => {
                let upload = self.upload_video_url(url).await?;
                Ok(serde_json::to_value(upload)?)
            }
            ToolArgs::UploadPlatformVideos { urls } => {
                self.call_api(
                    Method::POST,
                    "/scraper_url",
                    Some(json!({ "video_urls": urls, "unique_id": self.unique_id })),
                    &[],
                )
                .await
            }
            ToolArgs::ChatWithVideos { video_nos, prompt } => {
                self.chat("/chat", json!({ "video_nos": video_nos, "prompt": prompt }))
                    .await
            }
            ToolArgs::MarketerChat { prompt, platform } => {
                self.chat(
                    "/marketer_chat",
                    json!({ "prompt": prompt, "type": platform.as_str() }),
                )
                .await
            }
            ToolArgs::PersonalMediaChat { prompt } => {
                self.chat("/chat_personal", json!({ "prompt": prompt })).await
            }
            ToolArgs::VideoTranscription { video_no } => {
                self.transcription("/get_video_transcription", video_id(video_no)?)
                    .await
            }
            ToolArgs::AudioTranscription { video_no } => {
                self.transcription("/get_audio_transcription", video_id(video_no)?)
                    .await
            }
            ToolArgs::VideoSummary { video_no, kind } => {
                let data = self
                    .call_api(
                        Method::GET,
                        "/generate_summary",
                        None,
                        &[
                            ("video_no", video_id(video_no)?),
                            ("type", kind.as_str()),
                            ("unique_id", self.unique_id.as_str()),
                        ],
                    )
                    .await?;
                Ok(Value::String(format_summary(&data)?))
            }
            other => Err(Error::Tool(format!(
                "Unknown tool for Memories: {}",
                other.tool_name()
            ))),
        }
    }
}
