use std::sync::Arc;

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::GenerateError;
use crate::model::transition_table::TransitionTable;
use crate::provider::{Backend, LocalSource, Provider, ProviderChoice, Pull, RemoteClient};
use crate::request::{GenerateRequest, GenerationSettings, ResolvedRequest};
use crate::stream::StreamChunk;

/// Shared entry point turning requests into generation sessions.
///
/// Holds only read-only state (the transition table, the remote client and
/// the settings), so one instance serves every concurrent request.
pub struct Orchestrator {
	table: Arc<TransitionTable>,
	/// Present only when a credential is configured.
	remote: Option<RemoteClient>,
	settings: GenerationSettings,
}

impl Orchestrator {
	/// Creates an orchestrator. A remote client without credential is discarded.
	pub fn new(table: Arc<TransitionTable>, remote: Option<RemoteClient>, settings: GenerationSettings) -> Self {
		Self {
			table,
			remote: remote.filter(RemoteClient::is_configured),
			settings,
		}
	}

	pub fn remote_configured(&self) -> bool {
		self.remote.is_some()
	}

	pub fn table(&self) -> &TransitionTable {
		&self.table
	}

	/// Validates a request and resolves its provider.
	pub fn resolve(&self, request: GenerateRequest) -> Result<ResolvedRequest, GenerateError> {
		request.resolve(&self.settings, self.remote_configured())
	}

	/// Validates a request and opens its session.
	///
	/// Nothing is generated until the session is pulled; the remote call,
	/// if any, is opened on the first pull.
	///
	/// # Errors
	/// Rejects the request before any stream exists (see `GenerateRequest::resolve`).
	pub fn start(&self, request: GenerateRequest) -> Result<GenerationSession, GenerateError> {
		let request = self.resolve(request)?;
		info!(
			"Generation requested: provider={} (asked {:?}), max_tokens={}, temperature={}",
			request.provider, request.requested, request.max_tokens, request.temperature
		);
		Ok(GenerationSession::new(
			request,
			self.table.clone(),
			self.remote.clone(),
			self.settings.auto_fallback,
		))
	}
}

enum Phase {
	/// Validated, backend not opened yet.
	Resolved,
	Streaming(Backend),
	/// Terminal: nothing more is emitted.
	Closing,
}

/// State of one request, from the first pull to the terminal chunk.
///
/// # Behavior
/// - `Resolved` → `Streaming` happens at most once, on the first pull.
/// - A remote failure before any output falls back to the local sampler
///   only for `auto` requests with auto-fallback enabled.
/// - A failure after output ends the stream with an error terminal chunk;
///   providers are never mixed within one response.
/// - Exactly one terminal chunk is produced; afterwards `next_chunk`
///   returns `None`.
pub struct GenerationSession {
	request: ResolvedRequest,
	table: Arc<TransitionTable>,
	remote: Option<RemoteClient>,
	auto_fallback: bool,
	phase: Phase,
	/// Provider that actually produced the output.
	served_by: Option<Provider>,
	output: String,
	chunks: usize,
	/// Random source for the local backend; drawn from the OS when unset.
	rng: Option<StdRng>,
}

impl GenerationSession {
	fn new(
		request: ResolvedRequest,
		table: Arc<TransitionTable>,
		remote: Option<RemoteClient>,
		auto_fallback: bool,
	) -> Self {
		Self {
			request,
			table,
			remote,
			auto_fallback,
			phase: Phase::Resolved,
			served_by: None,
			output: String::new(),
			chunks: 0,
			rng: None,
		}
	}

	/// Uses a fixed random source for local generation.
	pub fn with_rng(mut self, rng: StdRng) -> Self {
		self.rng = Some(rng);
		self
	}

	pub fn request(&self) -> &ResolvedRequest {
		&self.request
	}

	/// Provider serving the session, once its backend is open.
	pub fn served_by(&self) -> Option<Provider> {
		self.served_by
	}

	/// Text emitted so far.
	pub fn output(&self) -> &str {
		&self.output
	}

	/// Non-terminal chunks emitted so far.
	pub fn chunks(&self) -> usize {
		self.chunks
	}

	pub fn is_closed(&self) -> bool {
		matches!(self.phase, Phase::Closing)
	}

	/// Produces the next chunk, the terminal chunk, or `None` once closed.
	pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
		loop {
			match &mut self.phase {
				Phase::Closing => return None,
				Phase::Resolved => match self.open_backend().await {
					Ok(backend) => {
						self.served_by = Some(backend.provider());
						self.phase = Phase::Streaming(backend);
					}
					Err(chunk) => {
						self.close();
						return Some(chunk);
					}
				},
				Phase::Streaming(backend) => match backend.next_chunk().await {
					Pull::Text(text) => {
						self.output.push_str(&text);
						self.chunks += 1;
						return Some(StreamChunk::text(text));
					}
					Pull::Done => {
						self.close();
						return Some(StreamChunk::done());
					}
					Pull::Failed(e) if self.may_fall_back() => {
						warn!("Remote provider failed before any output ({e}), falling back to local");
						self.served_by = Some(Provider::Local);
						self.phase = Phase::Streaming(Backend::Local(self.local_source()));
					}
					Pull::Failed(e) => {
						warn!("Generation failed after {} chunks: {e}", self.chunks);
						self.close();
						return Some(StreamChunk::failed(e.to_string()));
					}
				},
			}
		}
	}

	async fn open_backend(&mut self) -> Result<Backend, StreamChunk> {
		if self.request.provider == Provider::Local {
			return Ok(Backend::Local(self.local_source()));
		}

		let Some(remote) = &self.remote else {
			return Err(StreamChunk::failed("remote provider is not configured"));
		};
		match remote.open(&self.request).await {
			Ok(source) => Ok(Backend::Remote(source)),
			Err(e) if self.may_fall_back() => {
				warn!("Remote provider unavailable ({e}), falling back to local");
				Ok(Backend::Local(self.local_source()))
			}
			Err(e) => {
				warn!("Remote provider unavailable: {e}");
				Err(StreamChunk::failed(e.to_string()))
			}
		}
	}

	/// Only `auto` requests fall back, and only while nothing was sent.
	fn may_fall_back(&self) -> bool {
		self.auto_fallback && self.request.requested == ProviderChoice::Auto && self.chunks == 0
	}

	fn local_source(&mut self) -> LocalSource {
		let rng = self.rng.take().unwrap_or_else(StdRng::from_os_rng);
		LocalSource::with_rng(
			self.table.clone(),
			&self.request.prompt,
			self.request.max_tokens,
			self.request.temperature,
			rng,
		)
	}

	fn close(&mut self) {
		self.phase = Phase::Closing;
		info!(
			"Generation finished: provider={}, chunks={}, chars={}",
			self.served_by.map_or_else(|| "none".to_owned(), |p| p.to_string()),
			self.chunks,
			self.output.chars().count()
		);
	}
}

impl Drop for GenerationSession {
	fn drop(&mut self) {
		if !self.is_closed() {
			debug!("Generation session dropped before completion ({} chunks sent)", self.chunks);
		}
	}
}
