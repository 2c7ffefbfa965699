//! Keyword rules that route a chat message to a tool, or to plain completion.
//!
//! Rules are evaluated in table order and the first match wins. The table is
//! grouped by domain: media analysis, then video generation, then image
//! generation, then prompt enhancement. Within image generation the specific
//! edits (caption, transform, inpaint, background removal, upscale, mask) are
//! tried before generic generation.

use chatrelay_common::{MediaRef, MediaState};
use regex::Regex;
use std::sync::LazyLock;

use crate::tools::args::{
    DEFAULT_IMAGE_MODEL, DEFAULT_IMAGE_SIZE, DEFAULT_VIDEO_DURATION_SECS, DEFAULT_VIDEO_MODEL,
};
use crate::tools::{Platform, SummaryKind, ToolArgs, ToolSelection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Domain {
    MediaAnalysis,
    VideoGeneration,
    ImageGeneration,
    PromptEnhancement,
}

/// One classification rule: a predicate and the selection it produces.
pub struct Rule {
    pub name: &'static str,
    pub domain: Domain,
    matches: fn(&Signals) -> bool,
    select: fn(&Signals) -> ToolArgs,
}

impl Rule {
    pub fn matches(&self, signals: &Signals) -> bool {
        (self.matches)(signals)
    }

    pub fn select(&self, signals: &Signals) -> ToolArgs {
        (self.select)(signals)
    }
}

/// Everything the rules look at, extracted once per message.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    pub raw: String,
    pub lower: String,
    pub image_urls: Vec<String>,
    pub video_urls: Vec<String>,
    pub platform_urls: Vec<(String, Platform)>,
    pub video_ids: Vec<String>,
    pub has_ready_media: bool,
}

pub(crate) static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>()"'\]\[]+"#).expect("url pattern"));

static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bvi\d{6,}\b").expect("video id pattern"));

/// A generation verb leading the message, after optional politeness.
static COMMAND_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:please|hey|can you|could you|would you|will you|i want you to|i'd like you to|i want|i'd like|i need)[,\s]+)*(generate|create|make|draw|paint|render|design|produce|sketch|illustrate|animate)\b",
    )
    .expect("command verb pattern")
});

static IMAGE_NOUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(images?|pictures?|photos?|illustrations?|drawings?|paintings?|artworks?|art|logos?|icons?|wallpapers?|portraits?)\b",
    )
    .expect("image noun pattern")
});

static VIDEO_NOUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(videos?|clips?|animations?|movies?)\b").expect("video noun pattern")
});

static MENTIONS_VIDEO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(videos?|clips?|footage|recordings?)\b").expect("video mention pattern")
});

static IMAGE_PROMPT_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:please|can you|could you|would you|i want you to|i'd like you to)[,\s]+)*(?:generate|create|make|draw|paint|render|design|produce|sketch|illustrate)\s+(?:(?:me|us)\s+)?(?:(?:(?:an?|the|some|one|two|three|four|\d+)\s+)?(?:(?:new|quick|cool|nice|beautiful|realistic|detailed|high[- ]quality)\s+)*(?:images?|pictures?|photos?|illustrations?|drawings?|paintings?|artworks?|art)\b\s*(?:(?:of|showing|depicting|about|featuring|with)\b\s*)?)?",
    )
    .expect("image prompt pattern")
});

static VIDEO_PROMPT_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:please|can you|could you|would you|i want you to|i'd like you to)[,\s]+)*(?:generate|create|make|render|produce|animate)\s+(?:(?:me|us)\s+)?(?:(?:(?:an?|the|some|\d+)\s+)?(?:(?:\d+\s*(?:-\s*)?(?:s|sec|second)s?|short|quick|new|cinematic|realistic)\s+)*(?:videos?|clips?|animations?|movies?)\b\s*(?:(?:of|showing|depicting|about|featuring|with)\b\s*)?)?",
    )
    .expect("video prompt pattern")
});

static THIS_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:this|the|my|that)\s+(?:image|picture|photo)\b\s*")
        .expect("this image pattern")
});

static TRANSFORM_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:transform|restyle|stylize|turn|convert|make)\s+(?:(?:this|the|my|it|that)\s+)?(?:(?:image|picture|photo)\s+)?(?:look\s+like|into|to|in\s+the\s+style\s+of)?\s*",
    )
    .expect("transform pattern")
});

static ENHANCE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:enhance|improve|rewrite|expand)\s+(?:(?:this|my|the)\s+)?prompt\b\s*(?:for\b\s*)?",
    )
    .expect("enhance pattern")
});

static IMAGE_MODEL_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*\b(?:using|with|via|in)\s+(?:the\s+)?(?:flux(?:\s+(?:dev|schnell))?|sdxl|juggernaut|schnell)(?:\s+model)?\b",
    )
    .expect("image model phrase pattern")
});

static VIDEO_MODEL_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*\b(?:using|with|via|in|on)\s+(?:the\s+)?(?:klingai|kling|veo|seedance|minimax|hailuo|pixverse|vidu|wan)(?:\s+model)?\b",
    )
    .expect("video model phrase pattern")
});

static WITH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwith\b").expect("with pattern"));

static RESULT_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([1-4]|two|three|four)\s+(?:\w+\s+)?(?:images|pictures|photos|variations)\b")
        .expect("result count pattern")
});

static UPSCALE_FACTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:([234])x|x([234]))\b").expect("upscale factor pattern"));

/// Video model keywords, checked in order. Defaults to [`DEFAULT_VIDEO_MODEL`].
static VIDEO_MODEL_KEYWORDS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\bkling(?:ai)?\b", "klingai:5@3"),
        (r"\bveo\b", "google:3@0"),
        (r"\bseedance\b", "bytedance:2@1"),
        (r"\b(?:minimax|hailuo)\b", "minimax:3@1"),
        (r"\bpixverse\b", "pixverse:1@3"),
        (r"\bvidu\b", "vidu:2@0"),
        (r"\bwan\b", "runware:200@2"),
    ]
    .into_iter()
    .map(|(pattern, model)| (Regex::new(pattern).expect("video model pattern"), model))
    .collect()
});

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".webm", ".mkv", ".avi", ".m4v"];

const UPLOAD_WORDS: &[&str] = &[
    "upload", "analy", "import", "index", "ingest", "add this", "add these", "save this",
    "process this",
];

impl Signals {
    pub fn extract(message: &str, media: &[MediaRef]) -> Self {
        let lower = message.to_lowercase();
        let mut signals = Signals {
            raw: message.to_string(),
            has_ready_media: media.iter().any(|m| m.state == MediaState::Ready),
            ..Default::default()
        };

        for found in URL_RE.find_iter(message) {
            let candidate = found
                .as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?']);
            let Ok(parsed) = url::Url::parse(candidate) else {
                continue;
            };
            let host = parsed.host_str().unwrap_or_default().to_lowercase();
            let path = parsed.path().to_lowercase();
            if let Some(platform) = Platform::from_host(&host) {
                signals.platform_urls.push((candidate.to_string(), platform));
            } else if VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
                signals.video_urls.push(candidate.to_string());
            } else {
                signals.image_urls.push(candidate.to_string());
            }
        }

        for found in VIDEO_ID_RE.find_iter(message) {
            let id = found.as_str().to_uppercase();
            if !signals.video_ids.contains(&id) {
                signals.video_ids.push(id);
            }
        }

        signals.lower = lower;
        signals
    }

    fn has_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.lower.contains(n))
    }

    fn first_image_url(&self) -> Option<String> {
        self.image_urls.first().cloned()
    }

    fn has_image_url(&self) -> bool {
        !self.image_urls.is_empty()
    }

    /// An explicit video id or an uploaded, queryable video.
    fn has_analysis_target(&self) -> bool {
        !self.video_ids.is_empty() || self.has_ready_media
    }

    fn mentions_video(&self) -> bool {
        !self.video_ids.is_empty() || MENTIONS_VIDEO_RE.is_match(&self.lower)
    }

    /// The generation verb the message opens with, if it reads as a command.
    fn command_verb(&self) -> Option<&str> {
        COMMAND_VERB_RE
            .captures(&self.lower)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    fn wants_generation(&self) -> bool {
        self.command_verb().is_some()
    }

    fn single_video_id(&self) -> Option<String> {
        self.video_ids.first().cloned()
    }

    /// Message text with URLs removed and whitespace collapsed.
    fn text_without_urls(&self) -> String {
        collapse_whitespace(&URL_RE.replace_all(&self.raw, " "))
    }

    fn platform(&self) -> Platform {
        if let Some((_, platform)) = self.platform_urls.first() {
            return *platform;
        }
        if self.lower.contains("youtube") {
            Platform::Youtube
        } else if self.lower.contains("instagram") || self.lower.contains("reels") {
            Platform::Instagram
        } else {
            Platform::Tiktok
        }
    }
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

pub static RULES: &[Rule] = &[
    // Media analysis
    Rule {
        name: "upload_platform_video",
        domain: Domain::MediaAnalysis,
        matches: |s| !s.platform_urls.is_empty() && s.has_any(UPLOAD_WORDS),
        select: |s| ToolArgs::UploadPlatformVideos {
            urls: s.platform_urls.iter().map(|(u, _)| u.clone()).collect(),
        },
    },
    Rule {
        name: "upload_video_url",
        domain: Domain::MediaAnalysis,
        matches: |s| !s.video_urls.is_empty() && s.has_any(UPLOAD_WORDS),
        select: |s| ToolArgs::UploadVideoUrl {
            url: s.video_urls.first().cloned().unwrap_or_default(),
        },
    },
    Rule {
        name: "audio_transcription",
        domain: Domain::MediaAnalysis,
        matches: |s| {
            s.lower.contains("transcri")
                && (s.lower.contains("audio") || s.lower.contains("speech"))
                && s.has_analysis_target()
        },
        select: |s| ToolArgs::AudioTranscription {
            video_no: s.single_video_id(),
        },
    },
    Rule {
        name: "video_transcription",
        domain: Domain::MediaAnalysis,
        matches: |s| s.lower.contains("transcri") && s.has_analysis_target(),
        select: |s| ToolArgs::VideoTranscription {
            video_no: s.single_video_id(),
        },
    },
    Rule {
        name: "video_summary",
        domain: Domain::MediaAnalysis,
        matches: |s| {
            s.has_any(&["summary", "summarize", "summarise", "chapters", "key topics"])
                && s.mentions_video()
                && s.has_analysis_target()
        },
        select: |s| ToolArgs::VideoSummary {
            video_no: s.single_video_id(),
            kind: if s.lower.contains("topic") {
                SummaryKind::Topic
            } else {
                SummaryKind::Chapter
            },
        },
    },
    Rule {
        name: "video_marketer_chat",
        domain: Domain::MediaAnalysis,
        matches: |s| {
            s.has_any(&[
                "trending",
                "viral",
                "market research",
                "what's popular on",
                "whats popular on",
                "top creators",
            ])
        },
        select: |s| ToolArgs::MarketerChat {
            prompt: s.text_without_urls(),
            platform: s.platform(),
        },
    },
    Rule {
        name: "personal_media_chat",
        domain: Domain::MediaAnalysis,
        matches: |s| {
            s.has_any(&[
                "my videos",
                "my uploads",
                "my uploaded videos",
                "my video library",
                "my footage",
                "all my clips",
            ])
        },
        select: |s| ToolArgs::PersonalMediaChat {
            prompt: s.text_without_urls(),
        },
    },
    Rule {
        name: "chat_with_videos",
        domain: Domain::MediaAnalysis,
        matches: |s| s.mentions_video() && s.has_analysis_target() && !s.wants_generation(),
        select: |s| ToolArgs::ChatWithVideos {
            video_nos: s.video_ids.clone(),
            prompt: s.text_without_urls(),
        },
    },
    // Video generation
    Rule {
        name: "generate_video",
        domain: Domain::VideoGeneration,
        matches: |s| match s.command_verb() {
            Some("animate") => true,
            Some(_) => VIDEO_NOUN_RE.is_match(&s.lower),
            None => false,
        },
        select: |s| ToolArgs::GenerateVideo {
            prompt: video_prompt(s),
            model: video_model(&s.lower).to_string(),
            image_url: s.first_image_url(),
            duration_secs: DEFAULT_VIDEO_DURATION_SECS,
        },
    },
    // Image generation
    Rule {
        name: "caption_image",
        domain: Domain::ImageGeneration,
        matches: |s| {
            s.has_image_url()
                && s.has_any(&[
                    "caption",
                    "describe this",
                    "describe the image",
                    "describe the picture",
                    "what is in this",
                    "what's in this",
                    "whats in this",
                    "what does this image show",
                ])
        },
        select: |s| ToolArgs::CaptionImage {
            image_url: s.first_image_url().unwrap_or_default(),
        },
    },
    Rule {
        name: "transform_image",
        domain: Domain::ImageGeneration,
        matches: |s| {
            s.has_image_url()
                && s.has_any(&[
                    "transform",
                    "restyle",
                    "stylize",
                    "turn this",
                    "turn it into",
                    "convert this",
                    "make it look",
                    "in the style of",
                ])
        },
        select: |s| ToolArgs::TransformImage {
            image_url: s.first_image_url().unwrap_or_default(),
            prompt: transform_prompt(s),
            model: image_model(&s.lower).to_string(),
            strength: 0.75,
        },
    },
    Rule {
        name: "inpaint_image",
        domain: Domain::ImageGeneration,
        matches: |s| {
            s.has_image_url()
                && s.has_any(&[
                    "inpaint",
                    "fill in",
                    "replace the",
                    "erase the",
                    "remove the object",
                    "remove the person",
                ])
        },
        select: |s| ToolArgs::InpaintImage {
            image_url: s.first_image_url().unwrap_or_default(),
            mask_url: s.image_urls.get(1).cloned(),
            prompt: inpaint_prompt(s),
            model: image_model(&s.lower).to_string(),
        },
    },
    Rule {
        name: "remove_background",
        domain: Domain::ImageGeneration,
        matches: |s| {
            s.has_image_url()
                && s.has_any(&[
                    "remove background",
                    "remove the background",
                    "background removal",
                    "remove bg",
                    "transparent background",
                    "cut out",
                    "cutout",
                ])
        },
        select: |s| ToolArgs::RemoveBackground {
            image_url: s.first_image_url().unwrap_or_default(),
        },
    },
    Rule {
        name: "upscale_image",
        domain: Domain::ImageGeneration,
        matches: |s| {
            s.has_image_url()
                && s.has_any(&[
                    "upscale",
                    "upscaling",
                    "increase resolution",
                    "increase the resolution",
                    "higher resolution",
                    "super resolution",
                    "enlarge",
                ])
        },
        select: |s| ToolArgs::UpscaleImage {
            image_url: s.first_image_url().unwrap_or_default(),
            factor: upscale_factor(&s.lower),
        },
    },
    Rule {
        name: "mask_image",
        domain: Domain::ImageGeneration,
        matches: |s| s.has_image_url() && s.has_any(&["mask", "segment"]),
        select: |s| ToolArgs::MaskImage {
            image_url: s.first_image_url().unwrap_or_default(),
        },
    },
    Rule {
        name: "generate_image",
        domain: Domain::ImageGeneration,
        matches: |s| match s.command_verb() {
            Some("draw" | "paint" | "sketch" | "illustrate") => true,
            Some("animate") | None => false,
            Some(_) => IMAGE_NOUN_RE.is_match(&s.lower),
        },
        select: |s| ToolArgs::GenerateImage {
            prompt: image_prompt(s),
            model: image_model(&s.lower).to_string(),
            width: DEFAULT_IMAGE_SIZE,
            height: DEFAULT_IMAGE_SIZE,
            number_results: result_count(&s.lower),
        },
    },
    // Prompt enhancement
    Rule {
        name: "enhance_prompt",
        domain: Domain::PromptEnhancement,
        matches: |s| {
            s.has_any(&[
                "enhance this prompt",
                "enhance my prompt",
                "enhance prompt",
                "improve this prompt",
                "improve my prompt",
                "improve prompt",
                "rewrite this prompt",
                "better prompt",
            ])
        },
        select: |s| ToolArgs::EnhancePrompt {
            prompt: enhance_prompt_text(s),
            max_length: 300,
        },
    },
];

/// Pick a tool for `message`, or [`ToolSelection::NoTool`] when no rule matches.
pub fn classify(message: &str, media: &[MediaRef]) -> ToolSelection {
    let signals = Signals::extract(message, media);
    RULES
        .iter()
        .find(|rule| rule.matches(&signals))
        .map(|rule| ToolSelection::Dispatch {
            rule: rule.name,
            args: rule.select(&signals),
        })
        .unwrap_or(ToolSelection::NoTool)
}

/// Fill a missing media id from the conversation's uploads, most recent first.
///
/// Only media in the `Ready` state is used. Returns a notice describing the
/// substitution, or `None` when nothing was injected.
pub fn inject_media(args: &mut ToolArgs, media: &[MediaRef]) -> Option<String> {
    if !args.missing_media() {
        return None;
    }

    let ready: Vec<&MediaRef> = media
        .iter()
        .rev()
        .filter(|m| m.state == MediaState::Ready)
        .collect();
    let chosen: Vec<&MediaRef> = if args.accepts_many_media() {
        ready
    } else {
        ready.into_iter().take(1).collect()
    };
    if chosen.is_empty() {
        return None;
    }

    let ids: Vec<String> = chosen.iter().map(|m| m.id.clone()).collect();
    args.fill_media(&ids);

    let names: Vec<String> = chosen
        .iter()
        .map(|m| format!("{} ({})", m.name, m.id))
        .collect();
    let noun = if names.len() == 1 { "video" } else { "videos" };
    Some(format!("Using your uploaded {noun}: {}\n\n", names.join(", ")))
}

// ---------------------------------------------------------------------------
// Argument extraction
// ---------------------------------------------------------------------------

pub fn image_model(lower: &str) -> &'static str {
    if lower.contains("schnell") {
        "runware:100@1"
    } else if lower.contains("flux") {
        "runware:101@1"
    } else if lower.contains("sdxl") || lower.contains("juggernaut") {
        "civitai:133005@782002"
    } else {
        DEFAULT_IMAGE_MODEL
    }
}

pub fn video_model(lower: &str) -> &'static str {
    VIDEO_MODEL_KEYWORDS
        .iter()
        .find(|(pattern, _)| pattern.is_match(lower))
        .map(|(_, model)| *model)
        .unwrap_or(DEFAULT_VIDEO_MODEL)
}

fn result_count(lower: &str) -> u32 {
    RESULT_COUNT_RE
        .captures(lower)
        .and_then(|caps| caps.get(1))
        .map(|m| match m.as_str() {
            "two" => 2,
            "three" => 3,
            "four" => 4,
            digits => digits.parse().unwrap_or(1),
        })
        .unwrap_or(1)
}

fn upscale_factor(lower: &str) -> u8 {
    UPSCALE_FACTOR_RE
        .captures(lower)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(2)
}

fn image_prompt(s: &Signals) -> String {
    let text = IMAGE_MODEL_PHRASE_RE.replace_all(&s.text_without_urls(), "").into_owned();
    let residue = IMAGE_PROMPT_PREFIX_RE.replace(&text, "");
    non_empty_or(clean_prompt(&residue), "a beautiful, detailed illustration")
}

fn video_prompt(s: &Signals) -> String {
    let text = VIDEO_MODEL_PHRASE_RE.replace_all(&s.text_without_urls(), "").into_owned();
    let residue = VIDEO_PROMPT_PREFIX_RE.replace(&text, "");
    let residue = THIS_IMAGE_RE.replace(residue.trim(), "");
    non_empty_or(clean_prompt(&residue), "animate this image")
}

fn transform_prompt(s: &Signals) -> String {
    let text = IMAGE_MODEL_PHRASE_RE.replace_all(&s.text_without_urls(), "").into_owned();
    let residue = TRANSFORM_PREFIX_RE.replace(&text, "");
    non_empty_or(
        clean_prompt(&residue),
        "an artistic reinterpretation of this image",
    )
}

fn inpaint_prompt(s: &Signals) -> String {
    let text = s.text_without_urls();
    let residue = WITH_RE
        .find_iter(&text)
        .last()
        .map(|m| &text[m.end()..])
        .unwrap_or_default();
    non_empty_or(clean_prompt(residue), "seamlessly fill the masked area")
}

fn enhance_prompt_text(s: &Signals) -> String {
    let text = s.text_without_urls();
    let residue = match text.split_once(':') {
        Some((_, after)) => after.to_string(),
        None => ENHANCE_PREFIX_RE.replace(&text, "").into_owned(),
    };
    non_empty_or(
        clean_prompt(&residue),
        "a cinematic photo of a city skyline at night",
    )
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_prompt(text: &str) -> String {
    collapse_whitespace(text)
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '!' || c == '?')
        .trim()
        .to_string()
}

fn non_empty_or(text: String, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(id: &str, name: &str) -> MediaRef {
        MediaRef {
            id: id.into(),
            name: name.into(),
            state: MediaState::Ready,
        }
    }

    fn args_of(selection: ToolSelection) -> ToolArgs {
        match selection {
            ToolSelection::Dispatch { args, .. } => args,
            ToolSelection::NoTool => panic!("expected a tool selection"),
        }
    }

    #[test]
    fn rules_are_grouped_by_domain_priority() {
        let domains: Vec<Domain> = RULES.iter().map(|r| r.domain).collect();
        let mut sorted = domains.clone();
        sorted.sort();
        assert_eq!(domains, sorted);
    }

    #[test]
    fn rule_names_are_unique() {
        let mut names: Vec<&str> = RULES.iter().map(|r| r.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), RULES.len());
    }

    #[test]
    fn plain_chat_does_not_dispatch() {
        assert_eq!(classify("what's up today?", &[]), ToolSelection::NoTool);
        assert_eq!(
            classify("Explain how rust lifetimes work", &[]),
            ToolSelection::NoTool
        );
        for message in [
            "what's your favorite animated movie?",
            "what camera should I buy to make videos for youtube?",
            "How do I make art as a beginner?",
            "who is the best animator at pixar?",
            "how do I animate a sprite in godot?",
        ] {
            assert_eq!(classify(message, &[]), ToolSelection::NoTool, "{message}");
        }
    }

    #[test]
    fn polite_commands_still_dispatch() {
        assert_eq!(
            classify("can you make me a video of rain on a window", &[]).tool_name(),
            Some("generateVideo")
        );
        assert_eq!(
            classify("Please paint a harbour at dawn", &[]).tool_name(),
            Some("generateImageFromText")
        );
    }

    #[test]
    fn image_generation_extracts_prompt_and_default_model() {
        let selection = classify("generate an image of a red fox", &[]);
        assert_eq!(selection.tool_name(), Some("generateImageFromText"));
        match args_of(selection) {
            ToolArgs::GenerateImage {
                prompt,
                model,
                number_results,
                ..
            } => {
                assert_eq!(prompt, "a red fox");
                assert_eq!(model, "runware:100@1");
                assert_eq!(number_results, 1);
            }
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[test]
    fn image_model_keyword_overrides_default() {
        match args_of(classify("Please create a picture of a lighthouse using flux", &[])) {
            ToolArgs::GenerateImage { prompt, model, .. } => {
                assert_eq!(prompt, "a lighthouse");
                assert_eq!(model, "runware:101@1");
            }
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[test]
    fn draw_keeps_subject_article() {
        match args_of(classify("draw a cat wearing a hat", &[])) {
            ToolArgs::GenerateImage { prompt, .. } => assert_eq!(prompt, "a cat wearing a hat"),
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[test]
    fn video_generation_picks_model_keyword() {
        match args_of(classify("generate a video of a dog surfing using veo", &[])) {
            ToolArgs::GenerateVideo {
                prompt,
                model,
                image_url,
                ..
            } => {
                assert_eq!(prompt, "a dog surfing");
                assert_eq!(model, "google:3@0");
                assert_eq!(image_url, None);
            }
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[test]
    fn animate_without_text_uses_default_prompt() {
        match args_of(classify("animate this image https://cdn.example.com/cat.png", &[])) {
            ToolArgs::GenerateVideo {
                prompt,
                model,
                image_url,
                ..
            } => {
                assert_eq!(prompt, "animate this image");
                assert_eq!(model, DEFAULT_VIDEO_MODEL);
                assert_eq!(image_url.as_deref(), Some("https://cdn.example.com/cat.png"));
            }
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[test]
    fn image_edit_rules_take_precedence_over_generation() {
        let url = "https://cdn.example.com/photo.jpg";
        let cases = [
            (format!("caption {url}"), "captionImage"),
            (format!("transform this image into a watercolor {url}"), "transformImage"),
            (format!("replace the sky with a sunset {url}"), "inpaintImage"),
            (format!("remove the background from {url}"), "removeBackground"),
            (format!("upscale {url} 4x"), "upscaleImage"),
            (format!("create a mask for {url}"), "maskImage"),
        ];
        for (message, tool) in cases {
            assert_eq!(classify(&message, &[]).tool_name(), Some(tool), "{message}");
        }
    }

    #[test]
    fn upscale_factor_and_inpaint_prompt() {
        match args_of(classify("upscale https://x.test/a.png 4x please", &[])) {
            ToolArgs::UpscaleImage { factor, .. } => assert_eq!(factor, 4),
            other => panic!("unexpected args {other:?}"),
        }
        match args_of(classify(
            "replace the sky with a purple sunset https://x.test/a.png https://x.test/mask.png",
            &[],
        )) {
            ToolArgs::InpaintImage {
                prompt, mask_url, ..
            } => {
                assert_eq!(prompt, "a purple sunset");
                assert_eq!(mask_url.as_deref(), Some("https://x.test/mask.png"));
            }
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[test]
    fn platform_links_are_uploaded() {
        let selection = classify(
            "please upload https://www.tiktok.com/@chef/video/123 for analysis",
            &[],
        );
        assert_eq!(selection.tool_name(), Some("uploadVideoFromPlatform"));
    }

    #[test]
    fn direct_video_link_is_uploaded() {
        let selection = classify("analyze https://cdn.example.com/talk.mp4", &[]);
        assert_eq!(selection.tool_name(), Some("uploadVideoFromURL"));
    }

    #[test]
    fn video_questions_need_a_target() {
        assert_eq!(
            classify("what happens in the video?", &[]),
            ToolSelection::NoTool
        );

        let media = [ready("VI000000001", "demo.mp4")];
        let selection = classify("what happens in the video?", &media);
        assert_eq!(selection.tool_name(), Some("chatWithVideos"));
    }

    #[test]
    fn explicit_video_id_is_extracted() {
        match args_of(classify("summarize the topics of vi123456789", &[])) {
            ToolArgs::VideoSummary { video_no, kind } => {
                assert_eq!(video_no.as_deref(), Some("VI123456789"));
                assert_eq!(kind, SummaryKind::Topic);
            }
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[test]
    fn audio_transcription_precedes_general_transcription() {
        let media = [ready("VI000000001", "demo.mp4")];
        assert_eq!(
            classify("transcribe the audio please", &media).tool_name(),
            Some("getAudioTranscription")
        );
        assert_eq!(
            classify("give me a transcript", &media).tool_name(),
            Some("getVideoTranscription")
        );
    }

    #[test]
    fn marketer_chat_detects_platform() {
        match args_of(classify("what's trending on youtube for cooking?", &[])) {
            ToolArgs::MarketerChat { platform, .. } => assert_eq!(platform, Platform::Youtube),
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[test]
    fn enhance_prompt_takes_text_after_colon() {
        match args_of(classify("improve my prompt: a cat in space", &[])) {
            ToolArgs::EnhancePrompt { prompt, .. } => assert_eq!(prompt, "a cat in space"),
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[test]
    fn each_rule_matches_in_isolation() {
        let media = [ready("VI000000001", "demo.mp4")];
        let probes = [
            ("upload_platform_video", "upload https://youtu.be/abc"),
            ("upload_video_url", "upload https://x.test/clip.mov"),
            ("audio_transcription", "audio transcript please"),
            ("video_transcription", "transcribe it"),
            ("video_summary", "summary of the video"),
            ("video_marketer_chat", "what is going viral"),
            ("personal_media_chat", "search my videos for cats"),
            ("chat_with_videos", "who appears in this clip?"),
            ("generate_video", "make a short video of waves"),
            ("caption_image", "caption https://x.test/a.png"),
            ("transform_image", "restyle https://x.test/a.png"),
            ("inpaint_image", "inpaint https://x.test/a.png"),
            ("remove_background", "remove bg https://x.test/a.png"),
            ("upscale_image", "enlarge https://x.test/a.png"),
            ("mask_image", "segment https://x.test/a.png"),
            ("generate_image", "create an image of a boat"),
            ("enhance_prompt", "enhance this prompt: boat"),
        ];
        assert_eq!(probes.len(), RULES.len());
        for (name, message) in probes {
            let signals = Signals::extract(message, &media);
            let rule = RULES.iter().find(|r| r.name == name).unwrap();
            assert!(rule.matches(&signals), "{name} should match {message:?}");
        }
    }

    #[test]
    fn inject_media_prefers_most_recent_ready_upload() {
        let media = [
            ready("VI1", "old.mp4"),
            MediaRef {
                id: "VI2".into(),
                name: "pending.mp4".into(),
                state: MediaState::Processing,
            },
            ready("VI3", "new.mp4"),
        ];
        let mut args = ToolArgs::VideoTranscription { video_no: None };
        let notice = inject_media(&mut args, &media).unwrap();
        assert_eq!(
            args,
            ToolArgs::VideoTranscription {
                video_no: Some("VI3".into())
            }
        );
        assert!(notice.contains("new.mp4 (VI3)"));

        let mut chat = ToolArgs::ChatWithVideos {
            video_nos: vec![],
            prompt: "hi".into(),
        };
        inject_media(&mut chat, &media).unwrap();
        assert_eq!(
            chat,
            ToolArgs::ChatWithVideos {
                video_nos: vec!["VI3".into(), "VI1".into()],
                prompt: "hi".into(),
            }
        );
    }

    #[test]
    fn inject_media_leaves_explicit_ids_alone() {
        let media = [ready("VI3", "new.mp4")];
        let mut args = ToolArgs::VideoTranscription {
            video_no: Some("VI9".into()),
        };
        assert_eq!(inject_media(&mut args, &media), None);

        let mut missing = ToolArgs::VideoTranscription { video_no: None };
        assert_eq!(inject_media(&mut missing, &[]), None);
        assert!(missing.missing_media());
    }
}
