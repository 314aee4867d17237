use futures::Stream;
use futures::stream;
use log::error;
use serde::{Deserialize, Serialize};

use crate::orchestrator::GenerationSession;

/// Content type of the generation response.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Sent if a chunk cannot be serialized, so the stream still terminates.
const FALLBACK_TERMINAL_EVENT: &str = "data: {\"done\":true,\"error\":\"encoding failed\"}\n\n";

/// One unit of streamed output.
///
/// Non-terminal chunks carry a `text` delta; the terminal chunk has
/// `done = true` and, when the generation failed, an `error` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	pub done: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl StreamChunk {
	pub fn text(text: impl Into<String>) -> Self {
		Self { text: Some(text.into()), done: false, error: None }
	}

	pub fn done() -> Self {
		Self { text: None, done: true, error: None }
	}

	pub fn failed(error: impl Into<String>) -> Self {
		Self { text: None, done: true, error: Some(error.into()) }
	}

	pub fn is_terminal(&self) -> bool {
		self.done
	}
}

/// Serializes a chunk as one event: `data: <json>` followed by a blank line.
pub fn encode_event(chunk: &StreamChunk) -> String {
	match serde_json::to_string(chunk) {
		Ok(json) => format!("data: {json}\n\n"),
		Err(e) => {
			error!("Failed to encode stream chunk: {e}");
			FALLBACK_TERMINAL_EVENT.to_owned()
		}
	}
}

/// Turns a session into a stream of encoded events.
///
/// The stream is pull-driven: the session is asked for its next chunk only
/// when the consumer polls, so a slow client stalls generation. It ends
/// right after the terminal event. Dropping the stream drops the session
/// and whatever upstream call it holds.
pub fn event_stream(session: GenerationSession) -> impl Stream<Item = String> + Send + 'static {
	stream::unfold(session, |mut session| async move {
		let chunk = session.next_chunk().await?;
		Some((encode_event(&chunk), session))
	})
}
