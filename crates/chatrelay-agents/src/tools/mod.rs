pub mod args;
pub mod memories;
pub mod runware;

pub use args::{Platform, SummaryKind, ToolArgs};
pub use memories::{MemoriesProvider, VideoUpload};
pub use runware::RunwareProvider;

use async_trait::async_trait;
use chatrelay_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The two tool backends a request can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Generative image/video backend (Runware).
    Primary,
    /// Video understanding backend (Memories).
    Secondary,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Primary => "primary",
            Backend::Secondary => "secondary",
        }
    }
}

/// Tool metadata as advertised by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// A connection to one tool backend.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn backend(&self) -> Backend;

    fn list_tools(&self) -> Vec<ToolDefinition>;

    /// Invoke the tool named by `args` and return its raw result.
    async fn call_tool(&self, args: &ToolArgs) -> Result<Value>;
}

/// Outcome of intent classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolSelection {
    /// Answer with the completion backend.
    NoTool,
    /// Invoke a tool. `rule` names the classifier rule that matched.
    Dispatch { rule: &'static str, args: ToolArgs },
}

impl ToolSelection {
    pub fn tool_name(&self) -> Option<&'static str> {
        match self {
            ToolSelection::NoTool => None,
            ToolSelection::Dispatch { args, .. } => Some(args.tool_name()),
        }
    }

    /// Flat JSON view used by the CLI and the gateway.
    pub fn to_json(&self) -> Value {
        match self {
            ToolSelection::NoTool => json!({ "shouldDispatch": false }),
            ToolSelection::Dispatch { rule, args } => json!({
                "shouldDispatch": true,
                "toolName": args.tool_name(),
                "backend": args.backend(),
                "rule": rule,
                "args": args,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Fallback models
// ---------------------------------------------------------------------------

/// Alternate models tried in order when a generative tool fails.
/// Attempt `n` (zero based, `n >= 1`) uses entry `n - 1`.
pub fn fallback_models(tool_name: &str) -> &'static [&'static str] {
    match tool_name {
        "generateImageFromText" => &["runware:101@1", "civitai:133005@782002"],
        "transformImage" | "inpaintImage" => &["runware:101@1", "runware:100@1"],
        "generateVideo" => &["bytedance:1@1", "minimax:3@1"],
        _ => &[],
    }
}
