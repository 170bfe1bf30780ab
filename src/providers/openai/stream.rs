use std::collections::BTreeMap;

use async_stream::try_stream;
use eventsource_stream::{Event, EventStreamError};
use futures::{Stream, StreamExt};
use log::debug;
use tokio_util::sync::CancellationToken;

use super::types::chat_completion_chunk::{Choice, ToolCallDelta};
use super::types::{ChatCompletionChunk, FinishReason, StreamPayload};
use crate::core::LLMError;
use crate::providers::StreamChunk;
use crate::tools::ToolCall;

const DONE_MARKER: &str = "[DONE]";

/// Partial tool call collected across deltas.
#[derive(Debug, Default)]
struct ToolCallFragment {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallFragment {
    fn absorb(&mut self, increment: ToolCallDelta) {
        if let Some(id) = increment.id.filter(|id| !id.is_empty()) {
            self.id = Some(id);
        }
        if let Some(function) = increment.function {
            if let Some(name) = function.name.filter(|name| !name.is_empty()) {
                self.name = Some(name);
            }
            if let Some(arguments) = function.arguments {
                self.arguments.push_str(&arguments);
            }
        }
    }

    /// Fragments that never received an id or a name are unusable.
    fn into_tool_call(self) -> Option<ToolCall> {
        Some(ToolCall::function(self.id?, self.name?, self.arguments))
    }
}

/// Turns chat-completion chunks into text fragments and completed tool calls.
///
/// Fragments are keyed by `(choice index, tool index)` so that interleaved
/// tool calls from different choices never collide.
#[derive(Debug, Default)]
pub(crate) struct ToolCallAssembler {
    pending: BTreeMap<u32, BTreeMap<u32, ToolCallFragment>>,
}

impl ToolCallAssembler {
    pub(crate) fn push(&mut self, chunk: ChatCompletionChunk) -> Vec<StreamChunk> {
        let mut out = Vec::new();

        for Choice {
            index,
            delta,
            finish_reason,
        } in chunk.choices
        {
            if let Some(delta) = delta {
                if let Some(content) = delta.content.filter(|content| !content.is_empty()) {
                    out.push(StreamChunk::Text(content));
                }
                for increment in delta.tool_calls.into_iter().flatten() {
                    self.pending
                        .entry(index)
                        .or_default()
                        .entry(increment.index)
                        .or_default()
                        .absorb(increment);
                }
            }

            if finish_reason == Some(FinishReason::ToolCalls) {
                out.extend(self.complete(index).into_iter().map(StreamChunk::ToolCall));
            }
        }

        out
    }

    /// Drains one choice's fragments, in tool index order.
    fn complete(&mut self, choice: u32) -> Vec<ToolCall> {
        let Some(fragments) = self.pending.remove(&choice) else {
            return Vec::new();
        };
        let total = fragments.len();
        let calls: Vec<ToolCall> = fragments
            .into_values()
            .filter_map(ToolCallFragment::into_tool_call)
            .collect();
        if calls.len() < total {
            debug!(
                "[OpenAI] dropped {} tool call fragment(s) without id or name",
                total - calls.len()
            );
        }
        calls
    }

    /// Throws away anything still pending and reports how much there was.
    pub(crate) fn discard(&mut self) -> usize {
        let count = self.pending.values().map(BTreeMap::len).sum();
        self.pending.clear();
        count
    }
}

/// Decodes SSE events into chunks, stopping at the `[DONE]` marker.
pub(crate) fn completion_chunks<S>(
    events: S,
) -> impl Stream<Item = Result<ChatCompletionChunk, LLMError>> + Send + 'static
where
    S: Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send + 'static,
{
    try_stream! {
        for await event in events {
            let event = event.map_err(|e| match e {
                EventStreamError::Transport(e) => LLMError::from(e),
                other => LLMError::StreamError(other.to_string()),
            })?;

            let data = event.data.trim();
            if data == DONE_MARKER {
                break;
            }
            if data.is_empty() {
                continue;
            }

            let payload: StreamPayload = serde_json::from_str(data)
                .map_err(|e| LLMError::ResponseFormat(format!("Invalid JSON: {e}")))?;
            match payload {
                StreamPayload::Error { error } => Err(error.into_error())?,
                StreamPayload::Chunk(chunk) => yield chunk,
            }
        }
    }
}

/// Runs the assembler over a chunk stream, racing every read against `cancel`.
///
/// Cancellation ends the stream with `LLMError::Aborted` and discards any
/// tool call that was still being assembled.
pub(crate) fn assemble<S>(
    chunks: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<StreamChunk, LLMError>> + Send + 'static
where
    S: Stream<Item = Result<ChatCompletionChunk, LLMError>> + Send + 'static,
{
    try_stream! {
        let mut chunks = std::pin::pin!(chunks);
        let mut assembler = ToolCallAssembler::default();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                next = chunks.next() => Some(next),
            };

            match next {
                None => {
                    let discarded = assembler.discard();
                    debug!("[OpenAI] request cancelled, discarded {discarded} pending tool call(s)");
                    Err(LLMError::Aborted)?
                }
                Some(None) => break,
                Some(Some(chunk)) => {
                    let chunk = chunk?;
                    if let Some(usage) = &chunk.usage {
                        debug!(
                            "[OpenAI] usage for {}: prompt={} completion={} total={}",
                            chunk.model.as_deref().unwrap_or("unknown model"),
                            usage.prompt_tokens,
                            usage.completion_tokens,
                            usage.total_tokens
                        );
                    }
                    for out in assembler.push(chunk) {
                        yield out;
                    }
                }
            }
        }

        let leftover = assembler.discard();
        if leftover > 0 {
            debug!("[OpenAI] stream ended with {leftover} unfinished tool call(s)");
        }
    }
}
