use async_trait::async_trait;
use chatrelay_common::{Error, Result};
use chatrelay_config::RunwareConfig;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Backend, ToolArgs, ToolDefinition, ToolProvider};

pub const DEFAULT_API_BASE_URL: &str = "https://api.runware.ai/v1";
const MASK_MODEL: &str = "runware:35@1";
/// Configured poll intervals are whole seconds; zero is raised to this floor.
const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Output resolution each video model accepts.
const VIDEO_DIMENSIONS: &[(&str, u32, u32)] = &[
    ("klingai:1@1", 1280, 720),
    ("klingai:1@2", 1280, 720),
    ("klingai:2@1", 1280, 720),
    ("klingai:2@2", 1920, 1080),
    ("klingai:3@1", 1280, 720),
    ("klingai:3@2", 1920, 1080),
    ("klingai:4@3", 1280, 720),
    ("klingai:5@1", 1280, 720),
    ("klingai:5@2", 1920, 1080),
    ("klingai:5@3", 1920, 1080),
    ("google:2@0", 1280, 720),
    ("google:3@0", 1280, 720),
    ("google:3@1", 1280, 720),
    ("bytedance:1@1", 864, 480),
    ("bytedance:2@1", 864, 480),
    ("minimax:1@1", 1366, 768),
    ("minimax:2@1", 1366, 768),
    ("minimax:2@3", 1366, 768),
    ("minimax:3@1", 1366, 768),
    ("pixverse:1@1", 640, 360),
    ("pixverse:1@2", 640, 360),
    ("pixverse:1@3", 640, 360),
    ("vidu:1@0", 1920, 1080),
    ("vidu:1@1", 1920, 1080),
    ("vidu:1@5", 1920, 1080),
    ("vidu:2@0", 1920, 1080),
    ("runware:200@1", 853, 480),
    ("runware:200@2", 853, 480),
];

pub fn video_dimensions(model: &str) -> Option<(u32, u32)> {
    VIDEO_DIMENSIONS
        .iter()
        .find(|(id, _, _)| *id == model)
        .map(|(_, w, h)| (*w, *h))
}

/// Client for the Runware task API (image and video generation).
#[derive(Clone)]
pub struct RunwareProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl RunwareProvider {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_config(config: &RunwareConfig) -> Self {
        Self::new(config.api_key.clone(), Some(config.base_url.clone()))
            .with_polling(
                Duration::from_secs(config.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS)),
                Duration::from_secs(config.timeout_secs),
            )
    }

    /// How often and for how long to poll asynchronous video jobs.
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.timeout = timeout;
        self
    }

    async fn run_tasks(&self, tasks: Vec<Value>) -> Result<Vec<Value>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Tool("RUNWARE_API_KEY is not configured".into()))?;

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&tasks)
            .send()
            .await
            .map_err(|e| Error::Tool(format!("Runware request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Tool(format!(
                "Runware API error: {} - {}",
                status.as_u16(),
                error_text
            )));
        }

        let body: RunwareResponse = response
            .json()
            .await
            .map_err(|e| Error::Tool(format!("failed to parse Runware response: {e}")))?;

        if let Some(err) = body.errors.first() {
            return Err(Error::Tool(format!("Runware task failed: {}", err.message)));
        }
        Ok(body.data)
    }

    async fn run_single(&self, task: Value) -> Result<Vec<Value>> {
        self.run_tasks(vec![task]).await
    }

    async fn generate_video(
        &self,
        prompt: &str,
        model: &str,
        image_url: Option<&str>,
        duration_secs: u32,
    ) -> Result<Value> {
        let (width, height) = video_dimensions(model).ok_or_else(|| {
            Error::Validation(format!("model '{model}' not found in supported video models"))
        })?;

        let task_uuid = Uuid::new_v4().to_string();
        let mut task = json!({
            "taskType": "videoInference",
            "taskUUID": task_uuid,
            "positivePrompt": prompt,
            "model": model,
            "duration": duration_secs,
            "width": width,
            "height": height,
            "numberResults": 1,
            "outputType": "URL",
            "outputFormat": "MP4",
            "deliveryMethod": "async",
        });
        if let Some(url) = image_url {
            task["frameImages"] = json!([{ "inputImage": url, "frame": "first" }]);
        }

        let submitted = self.run_single(task).await?;
        if let Some(url) = find_video_url(&submitted, &task_uuid)? {
            return Ok(Value::String(url));
        }
        info!(task = %task_uuid, %model, "video task submitted, polling for result");

        let deadline = Instant::now() + self.timeout;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let polled = self
                .run_single(json!({ "taskType": "getResponse", "taskUUID": task_uuid }))
                .await?;
            if let Some(url) = find_video_url(&polled, &task_uuid)? {
                return Ok(Value::String(url));
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "video generation did not finish within {}s",
                    self.timeout.as_secs()
                )));
            }
            debug!(task = %task_uuid, "video still processing");
        }
    }
}

#[derive(Deserialize)]
struct RunwareResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    errors: Vec<RunwareError>,
}

#[derive(Deserialize)]
struct RunwareError {
    #[serde(default)]
    message: String,
}

fn task(task_type: &str) -> Value {
    json!({ "taskType": task_type, "taskUUID": Uuid::new_v4().to_string() })
}

fn with_fields(mut task: Value, fields: Value) -> Value {
    if let (Some(target), Value::Object(extra)) = (task.as_object_mut(), fields) {
        target.extend(extra);
    }
    task
}

fn string_field(data: &[Value], key: &str) -> Vec<String> {
    data.iter()
        .filter_map(|item| item.get(key).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// One URL comes back as a string, several as an array.
fn urls_result(urls: Vec<String>, what: &str) -> Result<Value> {
    match urls.len() {
        0 => Err(Error::Tool(format!("No {what} generated"))),
        1 => Ok(Value::String(urls.into_iter().next().unwrap_or_default())),
        _ => Ok(Value::Array(urls.into_iter().map(Value::String).collect())),
    }
}

fn text_result(data: &[Value], what: &str) -> Result<Value> {
    string_field(data, "text")
        .into_iter()
        .next()
        .map(Value::String)
        .ok_or_else(|| Error::Tool(format!("No {what} returned")))
}

fn find_video_url(data: &[Value], task_uuid: &str) -> Result<Option<String>> {
    for item in data {
        if item.get("taskUUID").and_then(Value::as_str) != Some(task_uuid) {
            continue;
        }
        if let Some(url) = item.get("videoURL").and_then(Value::as_str) {
            return Ok(Some(url.to_string()));
        }
        if matches!(
            item.get("status").and_then(Value::as_str),
            Some("error") | Some("failed")
        ) {
            let message = item
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("video generation failed");
            return Err(Error::Tool(message.to_string()));
        }
    }
    Ok(None)
}

fn image_url_schema(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

#[async_trait]
impl ToolProvider for RunwareProvider {
    fn backend(&self) -> Backend {
        Backend::Primary
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "generateImageFromText",
                "Generate an image from a text description",
                json!({
                    "type": "object",
                    "properties": {
                        "prompt": { "type": "string", "description": "Text description of the image to generate" },
                        "model": { "type": "string", "description": "Model AIR identifier (default: runware:100@1)" },
                        "width": { "type": "integer" },
                        "height": { "type": "integer" },
                        "numberResults": { "type": "integer", "minimum": 1, "maximum": 4 }
                    },
                    "required": ["prompt"]
                }),
            ),
            ToolDefinition::new(
                "captionImage",
                "Describe the contents of an image",
                json!({
                    "type": "object",
                    "properties": { "imageUrl": image_url_schema("URL of the image") },
                    "required": ["imageUrl"]
                }),
            ),
            ToolDefinition::new(
                "transformImage",
                "Restyle an existing image guided by a prompt",
                json!({
                    "type": "object",
                    "properties": {
                        "imageUrl": image_url_schema("URL of the source image"),
                        "prompt": { "type": "string" },
                        "model": { "type": "string" },
                        "strength": { "type": "number", "description": "How far to move from the source (0-1]" }
                    },
                    "required": ["imageUrl", "prompt"]
                }),
            ),
            ToolDefinition::new(
                "inpaintImage",
                "Repaint a masked region of an image; a mask is detected when none is given",
                json!({
                    "type": "object",
                    "properties": {
                        "imageUrl": image_url_schema("URL of the source image"),
                        "maskUrl": image_url_schema("URL of a black/white mask"),
                        "prompt": { "type": "string" },
                        "model": { "type": "string" }
                    },
                    "required": ["imageUrl", "prompt"]
                }),
            ),
            ToolDefinition::new(
                "removeBackground",
                "Remove background from an image",
                json!({
                    "type": "object",
                    "properties": { "imageUrl": image_url_schema("URL of the image") },
                    "required": ["imageUrl"]
                }),
            ),
            ToolDefinition::new(
                "upscaleImage",
                "Upscale an image to higher resolution",
                json!({
                    "type": "object",
                    "properties": {
                        "imageUrl": image_url_schema("URL of the image"),
                        "factor": { "type": "integer", "description": "Upscale factor (2, 3, or 4)" }
                    },
                    "required": ["imageUrl"]
                }),
            ),
            ToolDefinition::new(
                "maskImage",
                "Detect the main subject of an image and return a mask",
                json!({
                    "type": "object",
                    "properties": { "imageUrl": image_url_schema("URL of the image") },
                    "required": ["imageUrl"]
                }),
            ),
            ToolDefinition::new(
                "generateVideo",
                "Generate a video from text, optionally animating a first-frame image",
                json!({
                    "type": "object",
                    "properties": {
                        "prompt": { "type": "string" },
                        "model": { "type": "string", "description": "Video model AIR identifier (default: klingai:5@3)" },
                        "imageUrl": image_url_schema("Optional first frame"),
                        "durationSecs": { "type": "integer", "minimum": 1, "maximum": 10 }
                    },
                    "required": ["prompt"]
                }),
            ),
            ToolDefinition::new(
                "enhancePrompt",
                "Rewrite a short prompt into a richer generation prompt",
                json!({
                    "type": "object",
                    "properties": {
                        "prompt": { "type": "string" },
                        "maxLength": { "type": "integer", "minimum": 12, "maximum": 400 }
                    },
                    "required": ["prompt"]
                }),
            ),
        ]
    }

    async fn call_tool(&self, args: &ToolArgs) -> Result<Value> {
        match args {
            ToolArgs::GenerateImage {
                prompt,
                model,
                width,
                height,
                number_results,
            } => {
                let data = self
                    .run_single(with_fields(
                        task("imageInference"),
                        json!({
                            "positivePrompt": prompt,
                            "model": model,
                            "numberResults": number_results,
                            "width": width,
                            "height": height,
                            "steps": 20,
                            "outputType": "URL",
                            "outputFormat": "PNG",
                        }),
                    ))
                    .await?;
                urls_result(string_field(&data, "imageURL"), "image")
            }
            ToolArgs::CaptionImage { image_url } => {
                let data = self
                    .run_single(with_fields(
                        task("imageCaption"),
                        json!({ "inputImage": image_url }),
                    ))
                    .await?;
                text_result(&data, "caption")
            }
            ToolArgs::TransformImage {
                image_url,
                prompt,
                model,
                strength,
            } => {
                let data = self
                    .run_single(with_fields(
                        task("imageInference"),
                        json!({
                            "positivePrompt": prompt,
                            "seedImage": image_url,
                            "strength": strength,
                            "model": model,
                            "numberResults": 1,
                            "outputType": "URL",
                            "outputFormat": "PNG",
                        }),
                    ))
                    .await?;
                urls_result(string_field(&data, "imageURL"), "image")
            }
            ToolArgs::InpaintImage {
                image_url,
                mask_url,
                prompt,
                model,
            } => {
                let mask = match mask_url {
                    Some(mask) => mask.clone(),
                    None => {
                        let data = self
                            .run_single(with_fields(
                                task("imageMasking"),
                                json!({ "inputImage": image_url, "model": MASK_MODEL }),
                            ))
                            .await?;
                        string_field(&data, "maskImageURL")
                            .into_iter()
                            .next()
                            .ok_or_else(|| Error::Tool("No mask detected".into()))?
                    }
                };
                let data = self
                    .run_single(with_fields(
                        task("imageInference"),
                        json!({
                            "positivePrompt": prompt,
                            "seedImage": image_url,
                            "maskImage": mask,
                            "model": model,
                            "numberResults": 1,
                            "outputType": "URL",
                            "outputFormat": "PNG",
                        }),
                    ))
                    .await?;
                urls_result(string_field(&data, "imageURL"), "image")
            }
            ToolArgs::RemoveBackground { image_url } => {
                let data = self
                    .run_single(with_fields(
                        task("imageBackgroundRemoval"),
                        json!({
                            "inputImage": image_url,
                            "outputType": "URL",
                            "outputFormat": "PNG",
                        }),
                    ))
                    .await?;
                urls_result(string_field(&data, "imageURL"), "image")
            }
            ToolArgs::UpscaleImage { image_url, factor } => {
                let data = self
                    .run_single(with_fields(
                        task("imageUpscale"),
                        json!({
                            "inputImage": image_url,
                            "upscaleFactor": factor,
                            "outputType": "URL",
                            "outputFormat": "PNG",
                        }),
                    ))
                    .await?;
                urls_result(string_field(&data, "imageURL"), "image")
            }
            ToolArgs::MaskImage { image_url } => {
                let data = self
                    .run_single(with_fields(
                        task("imageMasking"),
                        json!({ "inputImage": image_url, "model": MASK_MODEL }),
                    ))
                    .await?;
                urls_result(string_field(&data, "maskImageURL"), "mask")
            }
            ToolArgs::GenerateVideo {
                prompt,
                model,
                image_url,
                duration_secs,
            } => {
                self.generate_video(prompt, model, image_url.as_deref(), *duration_secs)
                    .await
            }
            ToolArgs::EnhancePrompt { prompt, max_length } => {
                let data = self
                    .run_single(with_fields(
                        task("promptEnhance"),
                        json!({
                            "prompt": prompt,
                            "promptMaxLength": max_length,
                            "promptVersions": 1,
                        }),
                    ))
                    .await?;
                text_result(&data, "enhanced prompt")
            }
            other => Err(Error::Tool(format!(
                "Unknown tool for Runware: {}",
                other.tool_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_poll_interval_from_config_is_raised() {
        let config = RunwareConfig {
            poll_interval_secs: 0,
            ..RunwareConfig::default()
        };
        let provider = RunwareProvider::from_config(&config);
        assert_eq!(provider.poll_interval, Duration::from_secs(1));
        assert_eq!(provider.timeout, Duration::from_secs(300));
    }

    #[test]
    fn video_dimensions_cover_default_and_fallbacks() {
        assert_eq!(video_dimensions("klingai:5@3"), Some((1920, 1080)));
        assert_eq!(video_dimensions("bytedance:1@1"), Some((864, 480)));
        assert_eq!(video_dimensions("minimax:3@1"), Some((1366, 768)));
        assert_eq!(video_dimensions("unknown:1@1"), None);
    }

    #[test]
    fn urls_result_shapes() {
        assert!(urls_result(vec![], "image").is_err());
        assert_eq!(
            urls_result(vec!["a".into()], "image").unwrap(),
            Value::String("a".into())
        );
        assert_eq!(
            urls_result(vec!["a".into(), "b".into()], "image").unwrap(),
            json!(["a", "b"])
        );
    }

    #[test]
    fn find_video_url_matches_task_and_reports_failure() {
        let data = vec![json!({ "taskUUID": "other", "videoURL": "https://x/o.mp4" })];
        assert_eq!(find_video_url(&data, "mine").unwrap(), None);

        let failed = vec![json!({ "taskUUID": "mine", "status": "error", "message": "nsfw" })];
        assert!(matches!(find_video_url(&failed, "mine"), Err(Error::Tool(m)) if m == "nsfw"));
    }

    #[test]
    fn lists_every_generation_tool() {
        let names: Vec<_> = RunwareProvider::new(None, None)
            .list_tools()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names.len(), 9);
        assert!(names.contains(&"generateVideo".to_string()));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_tool_error() {
        let provider = RunwareProvider::new(None, Some("http://127.0.0.1:9".into()));
        let err = provider
            .call_tool(&ToolArgs::RemoveBackground {
                image_url: "https://x.test/a.png".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool(_)));
    }
}
