//! Per-request state machine that turns one user message into a stream of
//! [`StreamEvent`]s and exactly one persisted assistant reply.
//!
//! ```text
//! INIT -> (precondition fails) -> CLOSED
//! INIT -> STREAMING -> DONE -> CLOSED
//! INIT -> STREAMING -> ERROR -> DONE -> CLOSED
//! ```
//!
//! Every accepted request ends with the assistant message persisted and a
//! single `Done` event carrying its id.

use chatrelay_common::{ConversationId, MessageId, Result, Role, StreamEvent, UserId};
use chatrelay_db::ChatRepository;
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, instrument, warn};

use crate::classifier::{classify, inject_media};
use crate::context::{AssembledContext, ContextAssembler};
use crate::dispatcher::ToolDispatcher;
use crate::providers::{CompletionProvider, CompletionRequest};
use crate::tools::{ToolArgs, ToolSelection};

const EVENT_BUFFER: usize = 64;
pub const DEFAULT_TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub conversation_id: ConversationId,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MuxState {
    Init,
    Streaming,
    Error,
    Done,
    Closed,
}

/// Outbound half of one request's event stream.
struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    connected: bool,
}

impl EventSink {
    /// Returns false once the receiver is gone. Later sends are dropped.
    async fn emit(&mut self, event: StreamEvent) -> bool {
        if self.connected && self.tx.send(event).await.is_err() {
            debug!("client disconnected from chat stream");
            self.connected = false;
        }
        self.connected
    }
}

/// Running state of one request: what has been said so far and where the
/// state machine is.
struct Turn {
    state: MuxState,
    transcript: String,
}

impl Turn {
    fn transition(&mut self, next: MuxState) {
        debug!(from = ?self.state, to = ?next, "chat stream state");
        self.state = next;
    }
}

pub struct ChatPipeline {
    repo: Arc<dyn ChatRepository>,
    assembler: ContextAssembler,
    dispatcher: ToolDispatcher,
    completion: Arc<dyn CompletionProvider>,
    model: String,
    title_max_chars: usize,
}

impl ChatPipeline {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        completion: Arc<dyn CompletionProvider>,
        dispatcher: ToolDispatcher,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            assembler: ContextAssembler::new(repo.clone(), system_prompt),
            repo,
            dispatcher,
            completion,
            model: model.into(),
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
        }
    }

    pub fn with_title_max_chars(mut self, max_chars: usize) -> Self {
        self.title_max_chars = max_chars.max(1);
        self
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Start processing `request` in the background and return its events.
    ///
    /// The stream ends after the single `Done` event.
    pub fn send(self: &Arc<Self>, owner: UserId, request: SendRequest) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.run(owner, request, tx).await;
        });
        ReceiverStream::new(rx)
    }

    /// Drive one request to completion, writing events into `tx`.
    #[instrument(skip(self, request, tx), fields(conversation = %request.conversation_id))]
    pub async fn run(&self, owner: UserId, request: SendRequest, tx: mpsc::Sender<StreamEvent>) {
        let mut sink = EventSink {
            tx,
            connected: true,
        };
        let mut turn = Turn {
            state: MuxState::Init,
            transcript: String::new(),
        };
        let conversation_id = request.conversation_id.clone();

        match self.repo.find_conversation(&conversation_id, &owner).await {
            Ok(true) => {}
            Ok(false) => {
                info!(conversation = %conversation_id, user = %owner, "send rejected: conversation not found");
                sink.emit(StreamEvent::done(None)).await;
                turn.transition(MuxState::Closed);
                return;
            }
            Err(e) => {
                error!(conversation = %conversation_id, "ownership check failed: {e}");
                sink.emit(StreamEvent::chunk(format!("Error: {e}"))).await;
                sink.emit(StreamEvent::done(None)).await;
                turn.transition(MuxState::Closed);
                return;
            }
        }

        if let Err(e) = self
            .repo
            .insert_message(&conversation_id, Role::User, &request.content, Utc::now())
            .await
        {
            error!(conversation = %conversation_id, "failed to save user message: {e}");
            sink.emit(StreamEvent::chunk(format!("Error: {e}"))).await;
            sink.emit(StreamEvent::done(None)).await;
            turn.transition(MuxState::Closed);
            return;
        }

        turn.transition(MuxState::Streaming);
        let mut history_len = None;
        let outcome = match self.assembler.build(&conversation_id).await {
            Ok(context) => {
                history_len = Some(context.history_len());
                self.respond(&request.content, context, &mut turn, &mut sink)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            turn.transition(MuxState::Error);
            warn!(conversation = %conversation_id, "chat turn failed: {e}");
            let text = format!("Error: {e}");
            turn.transcript.push_str(&text);
            sink.emit(StreamEvent::chunk(text)).await;
        }

        let message_id = self
            .finalize(&conversation_id, &request.content, history_len, &turn.transcript)
            .await;
        turn.transition(MuxState::Done);
        match message_id {
            Ok(id) => {
                sink.emit(StreamEvent::done(Some(id.to_string()))).await;
            }
            Err(e) => {
                error!(conversation = %conversation_id, "failed to save assistant reply: {e}");
                sink.emit(StreamEvent::chunk(format!("Error: failed to save reply: {e}")))
                    .await;
                sink.emit(StreamEvent::done(None)).await;
            }
        }
        turn.transition(MuxState::Closed);
    }

    async fn respond(
        &self,
        content: &str,
        context: AssembledContext,
        turn: &mut Turn,
        sink: &mut EventSink,
    ) -> Result<()> {
        match classify(content, &context.media) {
            ToolSelection::Dispatch { rule, args } => {
                debug!(rule, tool = args.tool_name(), "dispatching tool");
                self.run_tool(args, &context, turn, sink).await
            }
            ToolSelection::NoTool => self.relay_completion(context, turn, sink).await,
        }
    }

    async fn run_tool(
        &self,
        mut args: ToolArgs,
        context: &AssembledContext,
        turn: &mut Turn,
        sink: &mut EventSink,
    ) -> Result<()> {
        if let Some(notice) = inject_media(&mut args, &context.media) {
            turn.transcript.push_str(&notice);
            if !sink.emit(StreamEvent::chunk(notice)).await {
                return Ok(());
            }
        }
        args.validate()?;

        let tool_name = args.tool_name();
        if !sink
            .emit(StreamEvent::ToolCall {
                tool_name: tool_name.to_string(),
                content: Some(format!("Using tool: {tool_name}...\n\n")),
            })
            .await
        {
            return Ok(());
        }

        let mut fragments = self.dispatcher.dispatch(args);
        while let Some(fragment) = fragments.next().await {
            turn.transcript.push_str(&fragment);
            if !sink.emit(StreamEvent::chunk(fragment)).await {
                break;
            }
        }
        Ok(())
    }

    async fn relay_completion(
        &self,
        context: AssembledContext,
        turn: &mut Turn,
        sink: &mut EventSink,
    ) -> Result<()> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: context.messages,
        };
        let mut stream = self.completion.stream_completion(&request).await?;
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            turn.transcript.push_str(&fragment);
            if !sink.emit(StreamEvent::chunk(fragment)).await {
                break;
            }
        }
        Ok(())
    }

    /// Persist the reply, bump the conversation and title it on first exchange.
    async fn finalize(
        &self,
        conversation_id: &ConversationId,
        user_content: &str,
        history_len: Option<usize>,
        transcript: &str,
    ) -> Result<MessageId> {
        let now = Utc::now();
        let id = self
            .repo
            .insert_message(conversation_id, Role::Assistant, transcript, now)
            .await?;
        self.repo.touch_conversation(conversation_id, now).await?;
        if history_len == Some(1) {
            let title = derive_title(user_content, self.title_max_chars);
            self.repo.set_title(conversation_id, &title).await?;
        }
        Ok(id)
    }
}

/// Title from the first `max_chars` characters, with `...` when truncated.
pub fn derive_title(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut title: String = content.chars().take(max_chars).collect();
    title.push_str("...");
    title
}
