use std::collections::VecDeque;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use super::Pull;
use super::sse::{Event, EventLineDecoder};
use crate::error::UpstreamError;
use crate::request::ResolvedRequest;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Write concise, vivid responses.";

/// Upstream error bodies are cut to this many characters.
const MAX_ERROR_BODY: usize = 512;

/// Settings of the remote chat completion provider.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
	/// Bearer credential. `None` or blank means the provider is unusable.
	pub api_key: Option<String>,
	/// Base URL of an OpenAI-compatible API, without `/chat/completions`.
	pub base_url: String,
	pub default_model: String,
	pub system_prompt: String,
	pub connect_timeout: Duration,
	/// Maximum wait between two reads of the response body.
	pub read_timeout: Duration,
}

impl Default for RemoteConfig {
	fn default() -> Self {
		Self {
			api_key: None,
			base_url: DEFAULT_BASE_URL.to_owned(),
			default_model: DEFAULT_MODEL.to_owned(),
			system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
			connect_timeout: Duration::from_secs(10),
			read_timeout: Duration::from_secs(60),
		}
	}
}

impl RemoteConfig {
	pub fn is_configured(&self) -> bool {
		self.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
	}
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
	model: &'a str,
	messages: [ChatMessage<'a>; 2],
	max_tokens: usize,
	temperature: f64,
	stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
	role: &'a str,
	content: &'a str,
}

#[derive(Deserialize)]
struct CompletionChunk {
	#[serde(default)]
	choices: Vec<ChunkChoice>,
	#[serde(default)]
	error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
	#[serde(default)]
	delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
	#[serde(default)]
	content: Option<String>,
}

/// Client opening streaming chat completions.
///
/// Cheap to clone: the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct RemoteClient {
	http: reqwest::Client,
	config: RemoteConfig,
}

impl RemoteClient {
	/// Builds the HTTP client with the configured timeouts.
	pub fn new(config: RemoteConfig) -> Result<Self, UpstreamError> {
		let http = reqwest::Client::builder()
			.connect_timeout(config.connect_timeout)
			.read_timeout(config.read_timeout)
			.build()?;
		Ok(Self { http, config })
	}

	pub fn is_configured(&self) -> bool {
		self.config.is_configured()
	}

	/// Sends the completion request and returns its body as a chunk source.
	///
	/// # Errors
	/// - `NotConfigured` if there is no credential
	/// - `Transport` on connection failure or timeout
	/// - `Status` if the upstream answers with a non-2xx status
	pub async fn open(&self, request: &ResolvedRequest) -> Result<RemoteSource, UpstreamError> {
		let api_key = self
			.config
			.api_key
			.as_deref()
			.filter(|key| !key.trim().is_empty())
			.ok_or(UpstreamError::NotConfigured)?;
		let model = request.model.as_deref().unwrap_or(&self.config.default_model);

		let body = ChatCompletionRequest {
			model,
			messages: [
				ChatMessage { role: "system", content: &self.config.system_prompt },
				ChatMessage { role: "user", content: &request.prompt },
			],
			max_tokens: request.max_tokens,
			temperature: request.temperature,
			stream: true,
		};

		let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
		debug!("Opening completion stream for model {model} at {url}");
		let response = self.http.post(&url).bearer_auth(api_key).json(&body).send().await?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(UpstreamError::Status {
				status: status.as_u16(),
				body: body.trim().chars().take(MAX_ERROR_BODY).collect(),
			});
		}

		Ok(RemoteSource::new(response))
	}
}

/// An open completion stream, read one body chunk at a time on demand.
///
/// Dropping it drops the response and releases the upstream connection.
pub struct RemoteSource {
	response: reqwest::Response,
	decoder: EventLineDecoder,
	/// Deltas decoded but not yet handed out.
	pending: VecDeque<String>,
	/// Reported once `pending` is drained.
	failure: Option<UpstreamError>,
	finished: bool,
}

impl RemoteSource {
	fn new(response: reqwest::Response) -> Self {
		Self {
			response,
			decoder: EventLineDecoder::default(),
			pending: VecDeque::new(),
			failure: None,
			finished: false,
		}
	}

	pub async fn next_chunk(&mut self) -> Pull {
		loop {
			if let Some(text) = self.pending.pop_front() {
				return Pull::Text(text);
			}
			if let Some(e) = self.failure.take() {
				self.finished = true;
				return Pull::Failed(e);
			}
			if self.finished {
				return Pull::Done;
			}

			match self.response.chunk().await {
				Ok(Some(bytes)) => match self.decoder.push(&bytes) {
					Ok(events) => self.absorb(events),
					Err(e) => self.failure = Some(e),
				},
				Ok(None) => {
					let events = self.decoder.finish();
					self.absorb(events);
					self.finished = true;
				}
				Err(e) => self.failure = Some(UpstreamError::Transport(e)),
			}
		}
	}

	fn absorb(&mut self, events: Vec<Event>) {
		for event in events {
			match event {
				Event::Done => {
					self.finished = true;
					return;
				}
				Event::Data(data) => match parse_delta(&data) {
					Ok(Some(text)) => self.pending.push_back(text),
					Ok(None) => (),
					Err(e) => {
						self.failure = Some(e);
						return;
					}
				},
			}
		}
	}
}

/// Extracts the text delta of one completion chunk.
///
/// Malformed chunks and chunks without content are skipped; an `error`
/// object sent in-band is a failure.
fn parse_delta(data: &str) -> Result<Option<String>, UpstreamError> {
	let chunk = match serde_json::from_str::<CompletionChunk>(data) {
		Ok(chunk) => chunk,
		Err(e) => {
			debug!("Skipping malformed completion chunk: {e}");
			return Ok(None);
		}
	};

	if let Some(error) = chunk.error {
		let message = match error.get("message").and_then(|m| m.as_str()) {
			Some(message) => message.to_owned(),
			None => error.to_string(),
		};
		return Err(UpstreamError::Remote(message));
	}

	Ok(chunk
		.choices
		.into_iter()
		.next()
		.and_then(|choice| choice.delta.content)
		.filter(|content| !content.is_empty()))
}
