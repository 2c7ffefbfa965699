use chatrelay_common::{Error, Result};
use serde::{Deserialize, Serialize};

use super::Backend;

pub const DEFAULT_IMAGE_MODEL: &str = "runware:100@1";
pub const DEFAULT_VIDEO_MODEL: &str = "klingai:5@3";
pub const DEFAULT_IMAGE_SIZE: u32 = 512;
pub const DEFAULT_VIDEO_DURATION_SECS: u32 = 5;

/// Social platforms the analysis backend can scrape or research.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Tiktok,
    Youtube,
    Instagram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "TIKTOK",
            Platform::Youtube => "YOUTUBE",
            Platform::Instagram => "INSTAGRAM",
        }
    }

    /// Recognise a platform from a URL host.
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.trim_start_matches("www.").trim_start_matches("m.");
        if host == "tiktok.com" || host.ends_with(".tiktok.com") {
            Some(Platform::Tiktok)
        } else if host == "youtube.com" || host.ends_with(".youtube.com") || host == "youtu.be" {
            Some(Platform::Youtube)
        } else if host == "instagram.com" || host.ends_with(".instagram.com") {
            Some(Platform::Instagram)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SummaryKind {
    Chapter,
    Topic,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::Chapter => "CHAPTER",
            SummaryKind::Topic => "TOPIC",
        }
    }
}

/// Arguments for one tool invocation, one variant per tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all_fields = "camelCase")]
pub enum ToolArgs {
    #[serde(rename = "generateImageFromText")]
    GenerateImage {
        prompt: String,
        model: String,
        width: u32,
        height: u32,
        number_results: u32,
    },
    #[serde(rename = "captionImage")]
    CaptionImage { image_url: String },
    #[serde(rename = "transformImage")]
    TransformImage {
        image_url: String,
        prompt: String,
        model: String,
        strength: f32,
    },
    #[serde(rename = "inpaintImage")]
    InpaintImage {
        image_url: String,
        mask_url: Option<String>,
        prompt: String,
        model: String,
    },
    #[serde(rename = "removeBackground")]
    RemoveBackground { image_url: String },
    #[serde(rename = "upscaleImage")]
    UpscaleImage { image_url: String, factor: u8 },
    #[serde(rename = "maskImage")]
    MaskImage { image_url: String },
    #[serde(rename = "generateVideo")]
    GenerateVideo {
        prompt: String,
        model: String,
        image_url: Option<String>,
        duration_secs: u32,
    },
    #[serde(rename = "enhancePrompt")]
    EnhancePrompt { prompt: String, max_length: u32 },
    #[serde(rename = "uploadVideoFromURL")]
    UploadVideoUrl { url: String },
    #[serde(rename = "uploadVideoFromPlatform")]
    UploadPlatformVideos { urls: Vec<String> },
    #[serde(rename = "chatWithVideos")]
    ChatWithVideos { video_nos: Vec<String>, prompt: String },
    #[serde(rename = "videoMarketerChat")]
    MarketerChat { prompt: String, platform: Platform },
    #[serde(rename = "chatWithPersonalMedia")]
    PersonalMediaChat { prompt: String },
    #[serde(rename = "getVideoTranscription")]
    VideoTranscription { video_no: Option<String> },
    #[serde(rename = "getAudioTranscription")]
    AudioTranscription { video_no: Option<String> },
    #[serde(rename = "generateSummary")]
    VideoSummary {
        video_no: Option<String>,
        kind: SummaryKind,
    },
}

impl ToolArgs {
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolArgs::GenerateImage { .. } => "generateImageFromText",
            ToolArgs::CaptionImage { .. } => "captionImage",
            ToolArgs::TransformImage { .. } => "transformImage",
            ToolArgs::InpaintImage { .. } => "inpaintImage",
            ToolArgs::RemoveBackground { .. } => "removeBackground",
            ToolArgs::UpscaleImage { .. } => "upscaleImage",
            ToolArgs::MaskImage { .. } => "maskImage",
            ToolArgs::GenerateVideo { .. } => "generateVideo",
            ToolArgs::EnhancePrompt { .. } => "enhancePrompt",
            ToolArgs::UploadVideoUrl { .. } => "uploadVideoFromURL",
            ToolArgs::UploadPlatformVideos { .. } => "uploadVideoFromPlatform",
            ToolArgs::ChatWithVideos { .. } => "chatWithVideos",
            ToolArgs::MarketerChat { .. } => "videoMarketerChat",
            ToolArgs::PersonalMediaChat { .. } => "chatWithPersonalMedia",
            ToolArgs::VideoTranscription { .. } => "getVideoTranscription",
            ToolArgs::AudioTranscription { .. } => "getAudioTranscription",
            ToolArgs::VideoSummary { .. } => "generateSummary",
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            ToolArgs::GenerateImage { .. }
            | ToolArgs::CaptionImage { .. }
            | ToolArgs::TransformImage { .. }
            | ToolArgs::InpaintImage { .. }
            | ToolArgs::RemoveBackground { .. }
            | ToolArgs::UpscaleImage { .. }
            | ToolArgs::MaskImage { .. }
            | ToolArgs::GenerateVideo { .. }
            | ToolArgs::EnhancePrompt { .. } => Backend::Primary,
            _ => Backend::Secondary,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            ToolArgs::GenerateImage { model, .. }
            | ToolArgs::TransformImage { model, .. }
            | ToolArgs::InpaintImage { model, .. }
            | ToolArgs::GenerateVideo { model, .. } => Some(model.as_str()),
            _ => None,
        }
    }

    /// Copy of these arguments with the model replaced. Tools without a
    /// model selector are returned unchanged.
    pub fn with_model(&self, new_model: &str) -> Self {
        let mut args = self.clone();
        match &mut args {
            ToolArgs::GenerateImage { model, .. }
            | ToolArgs::TransformImage { model, .. }
            | ToolArgs::InpaintImage { model, .. }
            | ToolArgs::GenerateVideo { model, .. } => *model = new_model.to_string(),
            _ => {}
        }
        args
    }

    /// True when the tool operates on uploaded media and none was named.
    pub fn missing_media(&self) -> bool {
        match self {
            ToolArgs::ChatWithVideos { video_nos, .. } => video_nos.is_empty(),
            ToolArgs::VideoTranscription { video_no }
            | ToolArgs::AudioTranscription { video_no }
            | ToolArgs::VideoSummary { video_no, .. } => video_no.is_none(),
            _ => false,
        }
    }

    /// Whether the tool takes several media ids rather than one.
    pub fn accepts_many_media(&self) -> bool {
        matches!(self, ToolArgs::ChatWithVideos { .. })
    }

    /// Fill empty media slots. Explicit ids are never overwritten.
    pub fn fill_media(&mut self, ids: &[String]) {
        let Some(first) = ids.first() else {
            return;
        };
        match self {
            ToolArgs::ChatWithVideos { video_nos, .. } if video_nos.is_empty() => {
                *video_nos = ids.to_vec();
            }
            ToolArgs::VideoTranscription { video_no }
            | ToolArgs::AudioTranscription { video_no }
            | ToolArgs::VideoSummary { video_no, .. }
                if video_no.is_none() =>
            {
                *video_no = Some(first.clone());
            }
            _ => {}
        }
    }

    /// Check the arguments before they are sent to a backend.
    pub fn validate(&self) -> Result<()> {
        match self {
            ToolArgs::GenerateImage {
                prompt,
                model,
                width,
                height,
                number_results,
            } => {
                require_text("prompt", prompt)?;
                require_text("model", model)?;
                for (name, value) in [("width", *width), ("height", *height)] {
                    if !(128..=2048).contains(&value) || value % 64 != 0 {
                        return Err(Error::Validation(format!(
                            "{name} must be a multiple of 64 between 128 and 2048, got {value}"
                        )));
                    }
                }
                if !(1..=4).contains(number_results) {
                    return Err(Error::Validation(format!(
                        "numberResults must be between 1 and 4, got {number_results}"
                    )));
                }
                Ok(())
            }
            ToolArgs::CaptionImage { image_url }
            | ToolArgs::RemoveBackground { image_url }
            | ToolArgs::MaskImage { image_url } => require_url("imageUrl", image_url),
            ToolArgs::TransformImage {
                image_url,
                prompt,
                model,
                strength,
            } => {
                require_url("imageUrl", image_url)?;
                require_text("prompt", prompt)?;
                require_text("model", model)?;
                if !(*strength > 0.0 && *strength <= 1.0) {
                    return Err(Error::Validation(format!(
                        "strength must be in (0, 1], got {strength}"
                    )));
                }
                Ok(())
            }
            ToolArgs::InpaintImage {
                image_url,
                mask_url,
                prompt,
                model,
            } => {
                require_url("imageUrl", image_url)?;
                if let Some(mask) = mask_url {
                    require_url("maskUrl", mask)?;
                }
                require_text("prompt", prompt)?;
                require_text("model", model)
            }
            ToolArgs::UpscaleImage { image_url, factor } => {
                require_url("imageUrl", image_url)?;
                if !(2..=4).contains(factor) {
                    return Err(Error::Validation(format!(
                        "upscale factor must be 2, 3 or 4, got {factor}"
                    )));
                }
                Ok(())
            }
            ToolArgs::GenerateVideo {
                prompt,
                model,
                image_url,
                duration_secs,
            } => {
                require_text("prompt", prompt)?;
                require_text("model", model)?;
                if let Some(url) = image_url {
                    require_url("imageUrl", url)?;
                }
                if !(1..=10).contains(duration_secs) {
                    return Err(Error::Validation(format!(
                        "duration must be between 1 and 10 seconds, got {duration_secs}"
                    )));
                }
                Ok(())
            }
            ToolArgs::EnhancePrompt { prompt, max_length } => {
                require_text("prompt", prompt)?;
                if !(12..=400).contains(max_length) {
                    return Err(Error::Validation(format!(
                        "maxLength must be between 12 and 400, got {max_length}"
                    )));
                }
                Ok(())
            }
            ToolArgs::UploadVideoUrl { url } => require_url("url", url),
            ToolArgs::UploadPlatformVideos { urls } => {
                if urls.is_empty() {
                    return Err(Error::Validation("at least one video URL is required".into()));
                }
                urls.iter().try_for_each(|u| require_url("urls", u))
            }
            ToolArgs::ChatWithVideos { video_nos, prompt } => {
                if video_nos.is_empty() {
                    return Err(Error::Validation(
                        "no processed video found; upload a video or mention its ID".into(),
                    ));
                }
                require_text("prompt", prompt)
            }
            ToolArgs::MarketerChat { prompt, .. } | ToolArgs::PersonalMediaChat { prompt } => {
                require_text("prompt", prompt)
            }
            ToolArgs::VideoTranscription { video_no }
            | ToolArgs::AudioTranscription { video_no }
            | ToolArgs::VideoSummary { video_no, .. } => match video_no {
                Some(id) if !id.trim().is_empty() => Ok(()),
                _ => Err(Error::Validation(
                    "no processed video found; upload a video or mention its ID".into(),
                )),
            },
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_url(field: &str, value: &str) -> Result<()> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(Error::Validation(format!(
            "{field} must be an http(s) URL, got {value:?}"
        ))),
    }
}
