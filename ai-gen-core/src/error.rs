use std::path::PathBuf;

use thiserror::Error;

/// Failure to load the corpus. Fatal at startup.
#[derive(Debug, Error)]
pub enum CorpusError {
	#[error("failed to read corpus {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("corpus contains no tokens")]
	Empty,
}

/// Failure to build, merge or cache a transition table.
#[derive(Debug, Error)]
pub enum ModelError {
	#[error("prefix order must be >= 1")]
	InvalidOrder,

	#[error("corpus has {tokens} tokens, at least {} are needed for order {order}", .order + 1)]
	CorpusTooShort { tokens: usize, order: usize },

	#[error("order mismatch: {left} vs {right}")]
	OrderMismatch { left: usize, right: usize },

	#[error("a table builder thread panicked")]
	BuildPanicked,

	#[error("model cache I/O failed: {0}")]
	CacheIo(#[from] std::io::Error),

	#[error("model cache is invalid: {0}")]
	CacheFormat(#[from] postcard::Error),
}

/// Failure of the remote chat completion call.
///
/// Whether it is recoverable depends on whether output was already sent,
/// which only the session knows.
#[derive(Debug, Error)]
pub enum UpstreamError {
	#[error("remote provider is not configured")]
	NotConfigured,

	#[error("upstream request failed: {0}")]
	Transport(#[from] reqwest::Error),

	#[error("upstream answered {status}: {body}")]
	Status { status: u16, body: String },

	#[error("upstream reported an error: {0}")]
	Remote(String),
}

/// Rejection of a request before any stream is opened.
#[derive(Debug, Error, PartialEq)]
pub enum GenerateError {
	#[error("Prompt is required")]
	EmptyPrompt,

	#[error("Invalid provider '{0}', expected auto, remote or local")]
	InvalidProvider(String),

	#[error("maxTokens must be a positive integer, got {0}")]
	InvalidMaxTokens(i64),

	#[error("Remote provider requested but no API key is configured")]
	RemoteNotConfigured,
}

impl GenerateError {
	/// Configuration errors are caused by the server setup rather than the input.
	pub fn is_configuration(&self) -> bool {
		matches!(self, GenerateError::RemoteNotConfigured)
	}
}
