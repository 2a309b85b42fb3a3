//! Chat with an agent - typed reply chunks and per-turn stream consumption.
//!
//! # Turn model
//! - One user message opens one stream; the stream ends with the turn.
//! - Chunks are consumed eagerly, in order, until the stream is exhausted.
//! - A failure mid-stream ends the turn. What arrived before the failure is
//!   kept; the remainder is lost and nothing is resumed.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::ClientError;

/// Stream of chunks for a single turn.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ClientError>> + Send>>;

/// Token accounting reported at the end of a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub step_count: u64,
}

/// One piece of an agent reply.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Inner monologue of the agent
    Reasoning { text: String },

    /// Text meant for the user
    Assistant { text: String },

    /// Token usage for the turn
    Usage(UsageStats),

    /// Anything else (tool calls, system messages, malformed frames)
    Unknown {
        message_type: Option<String>,
        raw: Value,
    },
}

impl StreamChunk {
    /// Classify a message frame by its `message_type` tag.
    pub fn from_value(value: Value) -> Self {
        let message_type = value
            .get("message_type")
            .and_then(Value::as_str)
            .map(str::to_string);

        match message_type.as_deref() {
            Some("reasoning_message") => Self::Reasoning {
                text: value
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            Some("assistant_message") => Self::Assistant {
                text: value.get("content").map(content_text).unwrap_or_default(),
            },
            Some("usage_statistics") => {
                let count = |key: &str| value.get(key).and_then(Value::as_u64).unwrap_or(0);
                Self::Usage(UsageStats {
                    prompt_tokens: count("prompt_tokens"),
                    completion_tokens: count("completion_tokens"),
                    total_tokens: count("total_tokens"),
                    step_count: count("step_count"),
                })
            }
            _ => Self::Unknown {
                message_type,
                raw: value,
            },
        }
    }
}

/// Assistant content is either a plain string or a list of text parts.
fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(_) => part.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect(),
        _ => String::new(),
    }
}

/// Everything a single turn produced.
#[derive(Debug, Default)]
pub struct TurnOutcome {
    /// Reasoning chunks in arrival order
    pub reasoning: Vec<String>,

    /// Concatenated assistant text
    pub content: String,

    /// Last usage report, if any arrived
    pub usage: Option<UsageStats>,

    /// Number of chunks that were not recognised
    pub unknown_chunks: usize,

    /// Set when the stream failed before it was exhausted
    pub interrupted: Option<String>,
}

impl TurnOutcome {
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }

    fn absorb(&mut self, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::Reasoning { text } => self.reasoning.push(text.clone()),
            StreamChunk::Assistant { text } => self.content.push_str(text),
            StreamChunk::Usage(usage) => self.usage = Some(*usage),
            StreamChunk::Unknown { message_type, .. } => {
                debug!(?message_type, "Skipping unrecognised chunk");
                self.unknown_chunks += 1;
            }
        }
    }
}

/// Collect the chunks of an already-completed reply.
pub fn collect_chunks<'a>(chunks: impl IntoIterator<Item = &'a StreamChunk>) -> TurnOutcome {
    let mut outcome = TurnOutcome::default();
    for chunk in chunks {
        outcome.absorb(chunk);
    }
    outcome
}

/// Drain one turn's stream, calling `observer` for every chunk as it arrives.
///
/// Consumes the stream: a turn cannot be replayed.
pub async fn drain_turn<F>(mut stream: ChunkStream, mut observer: F) -> TurnOutcome
where
    F: FnMut(&StreamChunk),
{
    let mut outcome = TurnOutcome::default();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                observer(&chunk);
                outcome.absorb(&chunk);
            }
            Err(e) => {
                warn!("Reply stream ended early: {}", e);
                outcome.interrupted = Some(e.to_string());
                break;
            }
        }
    }
    outcome
}
