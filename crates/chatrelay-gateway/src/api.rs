use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use chatrelay_agents::{Backend, SendRequest, ToolArgs};
use chatrelay_common::{ConversationId, Error, MediaRef, MediaState};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::SharedState;

type ApiResult<T> = Result<T, ApiError>;

/// POST /chat/send: run one chat turn and stream its events as SSE.
pub async fn send_message(
    State(state): State<SharedState>,
    Identity(user): Identity,
    Json(request): Json<SendRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user = %user, conversation = %request.conversation_id, "chat send");
    let events = state.pipeline.send(user, request).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|e| {
            warn!("failed to encode stream event: {e}");
            String::from("{}")
        });
        Ok(Event::default().data(data))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

/// POST /chat/conversations
pub async fn create_conversation(
    State(state): State<SharedState>,
    Identity(user): Identity,
    Json(body): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let conversation = state
        .repo
        .create_conversation(&user, body.title.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(json!(conversation))))
}

/// GET /chat/conversations
pub async fn list_conversations(
    State(state): State<SharedState>,
    Identity(user): Identity,
) -> ApiResult<Json<Value>> {
    let conversations = state.repo.list_conversations(&user).await?;
    Ok(Json(json!({ "conversations": conversations })))
}

/// GET /chat/conversations/{id}: the conversation with its messages and media.
pub async fn get_conversation(
    State(state): State<SharedState>,
    Identity(user): Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = ConversationId::from(id);
    let conversation = state
        .repo
        .get_conversation(&id, &user)
        .await?
        .ok_or_else(|| Error::NotFound(format!("conversation {id}")))?;
    let messages = state.repo.list_messages(&id).await?;
    let media = state.repo.list_media_for_conversation(&id).await?;
    Ok(Json(json!({
        "conversation": conversation,
        "messages": messages,
        "media": media,
    })))
}

/// DELETE /chat/conversations/{id}
pub async fn delete_conversation(
    State(state): State<SharedState>,
    Identity(user): Identity,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = ConversationId::from(id);
    if !state.repo.delete_conversation(&id, &user).await? {
        return Err(Error::NotFound(format!("conversation {id}")).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMediaRequest {
    pub conversation_id: ConversationId,
    pub url: String,
}

/// POST /chat/media: index a video URL and attach it to a conversation.
pub async fn register_media(
    State(state): State<SharedState>,
    Identity(user): Identity,
    Json(body): Json<RegisterMediaRequest>,
) -> ApiResult<(StatusCode, Json<MediaRef>)> {
    if !state
        .repo
        .find_conversation(&body.conversation_id, &user)
        .await?
    {
        return Err(Error::NotFound(format!("conversation {}", body.conversation_id)).into());
    }

    let upload = state.memories.upload_video_url(&body.url).await?;
    let media = MediaRef {
        name: if upload.video_name.is_empty() {
            body.url.clone()
        } else {
            upload.video_name
        },
        state: MediaState::from_status(&upload.video_status),
        id: upload.video_no,
    };
    state.repo.add_media(&body.conversation_id, &media).await?;
    info!(conversation = %body.conversation_id, media = %media.id, state = media.state.as_str(), "media registered");
    Ok((StatusCode::CREATED, Json(media)))
}

/// GET /tools: the catalogue of both tool backends.
pub async fn list_tools(State(state): State<SharedState>) -> Json<Value> {
    let dispatcher = state.pipeline.dispatcher();
    let tools: Vec<Value> = [Backend::Primary, Backend::Secondary]
        .into_iter()
        .flat_map(|backend| {
            dispatcher
                .provider(backend)
                .list_tools()
                .into_iter()
                .map(move |tool| {
                    json!({
                        "backend": backend,
                        "name": tool.name,
                        "description": tool.description,
                        "inputSchema": tool.input_schema,
                    })
                })
        })
        .collect();
    Json(json!({ "tools": tools }))
}

#[derive(Debug, Deserialize)]
pub struct CallToolRequest {
    /// Tool name; may be omitted when `args` already carries a `tool` field.
    #[serde(default)]
    pub name: Option<String>,
    pub args: Value,
}

/// POST /tools/call: invoke one tool through the dispatcher, retries included.
pub async fn call_tool(
    State(state): State<SharedState>,
    Identity(user): Identity,
    Json(body): Json<CallToolRequest>,
) -> ApiResult<Json<Value>> {
    let args = parse_tool_args(body)?;
    args.validate()?;

    let tool = args.tool_name();
    info!(user = %user, tool, "direct tool call");
    let output = state.pipeline.dispatcher().dispatch_to_string(args).await;
    Ok(Json(json!({ "tool": tool, "output": output })))
}

fn parse_tool_args(body: CallToolRequest) -> Result<ToolArgs, Error> {
    let mut args = body.args;
    if let Some(name) = body.name {
        match args.as_object_mut() {
            Some(map) => {
                map.entry("tool").or_insert(Value::String(name));
            }
            None => return Err(Error::Validation("args must be a JSON object".into())),
        }
    }
    serde_json::from_value(args).map_err(|e| Error::Validation(e.to_string()))
}

pub async fn health() -> &'static str {
    "ok"
}
