use chatrelay_common::Error;
use futures::stream::{self, BoxStream, StreamExt};
use regex::Captures;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::classifier::URL_RE;
use crate::tools::{Backend, ToolArgs, ToolProvider, fallback_models};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const VIDEO_MARKERS: &[&str] = &[".mp4", ".webm", ".mov", ".m4v", "/video"];
const IMAGE_MARKERS: &[&str] = &[".png", ".jpg", ".jpeg", ".webp", ".gif", "/image"];

/// Routes a tool call to its backend, retrying with fallback models.
#[derive(Clone)]
pub struct ToolDispatcher {
    primary: Arc<dyn ToolProvider>,
    secondary: Arc<dyn ToolProvider>,
    max_attempts: u32,
}

/// Where the retry loop is between two yielded fragments.
enum Step {
    Attempt(u32),
    Finished,
}

struct DispatchState {
    provider: Arc<dyn ToolProvider>,
    args: ToolArgs,
    max_attempts: u32,
    step: Step,
}

impl ToolDispatcher {
    pub fn new(primary: Arc<dyn ToolProvider>, secondary: Arc<dyn ToolProvider>) -> Self {
        Self {
            primary,
            secondary,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn provider(&self, backend: Backend) -> &Arc<dyn ToolProvider> {
        match backend {
            Backend::Primary => &self.primary,
            Backend::Secondary => &self.secondary,
        }
    }

    /// Run the tool and stream user-facing fragments.
    ///
    /// Yields, in order: one retry notice per failed attempt that will be
    /// retried, then either the formatted result or a single failure summary.
    /// Nothing happens until the stream is polled.
    pub fn dispatch(&self, args: ToolArgs) -> BoxStream<'static, String> {
        let state = DispatchState {
            provider: self.provider(args.backend()).clone(),
            args,
            max_attempts: self.max_attempts,
            step: Step::Attempt(0),
        };
        stream::unfold(state, |mut state| async move {
            let Step::Attempt(attempt) = state.step else {
                return None;
            };
            let tool = state.args.tool_name();
            let call_args = args_for_attempt(&state.args, attempt);

            match state.provider.call_tool(&call_args).await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(tool, attempt = attempt + 1, "tool succeeded after retry");
                    }
                    state.step = Step::Finished;
                    Some((format_result(&result), state))
                }
                Err(err) => {
                    let next = attempt + 1;
                    warn!(tool, attempt = next, max = state.max_attempts, "tool call failed: {err}");
                    if next >= state.max_attempts {
                        state.step = Step::Finished;
                        return Some((failure_summary(tool, next, &err), state));
                    }
                    state.step = Step::Attempt(next);
                    Some((retry_notice(&state.args, next, state.max_attempts), state))
                }
            }
        })
        .boxed()
    }

    /// Run the tool to completion and concatenate the fragments.
    pub async fn dispatch_to_string(&self, args: ToolArgs) -> String {
        self.dispatch(args).collect::<Vec<_>>().await.concat()
    }
}

/// Arguments for attempt `n` (zero based). Retries use the tool's fallback
/// models in order and repeat the original arguments once those run out.
pub fn args_for_attempt(args: &ToolArgs, attempt: u32) -> ToolArgs {
    if attempt == 0 {
        return args.clone();
    }
    match fallback_models(args.tool_name()).get(attempt as usize - 1) {
        Some(model) => args.with_model(model),
        None => args.clone(),
    }
}

fn retry_notice(args: &ToolArgs, attempt: u32, max_attempts: u32) -> String {
    let position = format!("attempt {} of {}", attempt + 1, max_attempts);
    match fallback_models(args.tool_name()).get(attempt as usize - 1) {
        Some(model) => format!("Retrying with fallback model `{model}` ({position})...\n\n"),
        None => format!("Retrying `{}` ({position})...\n\n", args.tool_name()),
    }
}

fn failure_summary(tool: &str, attempts: u32, err: &Error) -> String {
    format!("Tool `{tool}` failed after {attempts} attempt(s). Last error: {err}")
}

/// Render a raw tool result for the chat transcript.
///
/// Media links inside a string become markdown media references. Every
/// element of a string array becomes an enumerated reference, an image unless
/// it looks like a video. Anything else is dumped as pretty-printed JSON.
pub fn format_result(result: &Value) -> String {
    match result {
        Value::String(text) => link_media(text),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .enumerate()
            .map(|(i, item)| {
                let item = item.trim();
                media_reference(item, Some(i + 1))
                    .unwrap_or_else(|| format!("![Generated image {}]({item})", i + 1))
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        other => {
            let pretty = serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
            format!("```json\n{pretty}\n```")
        }
    }
}

/// Replace each media URL in `text` with its markdown reference.
fn link_media(text: &str) -> String {
    URL_RE
        .replace_all(text, |caps: &Captures| {
            let found = &caps[0];
            let url = found.trim_end_matches(['.', ',', ';', ':', '!', '?']);
            match media_reference(url, None) {
                Some(reference) => format!("{reference}{}", &found[url.len()..]),
                None => found.to_string(),
            }
        })
        .into_owned()
}

fn media_reference(target: &str, index: Option<usize>) -> Option<String> {
    let lower = target.to_ascii_lowercase();
    let suffix = index.map(|i| format!(" {i}")).unwrap_or_default();
    if VIDEO_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(format!("[Generated video{suffix}]({target})"))
    } else if IMAGE_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(format!("![Generated image{suffix}]({target})"))
    } else {
        None
    }
}
