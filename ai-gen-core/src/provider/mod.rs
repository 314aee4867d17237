//! Generation backends.
//!
//! Both backends expose the same single operation, `next_chunk`, and are
//! wrapped in `Backend`, chosen once per request by the session.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::UpstreamError;

/// Local Markov backend.
pub mod local;

/// Remote OpenAI-compatible chat completion backend.
pub mod remote;

/// Incremental decoder for `data:` lines of an event-stream body.
mod sse;

pub use local::LocalSource;
pub use remote::{RemoteClient, RemoteConfig, RemoteSource};

/// Provider requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChoice {
	Auto,
	Remote,
	Local,
}

impl FromStr for ProviderChoice {
	type Err = ();

	/// Case-insensitive; `openai` and `markov` are accepted as aliases.
	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value.to_ascii_lowercase().as_str() {
			"auto" => Ok(ProviderChoice::Auto),
			"remote" | "openai" => Ok(ProviderChoice::Remote),
			"local" | "markov" => Ok(ProviderChoice::Local),
			_ => Err(()),
		}
	}
}

/// Provider actually serving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
	Remote,
	Local,
}

impl fmt::Display for Provider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Provider::Remote => f.write_str("remote"),
			Provider::Local => f.write_str("local"),
		}
	}
}

/// Result of asking a backend for more output.
#[derive(Debug)]
pub enum Pull {
	/// A text delta.
	Text(String),
	/// Normal completion; nothing follows.
	Done,
	/// The backend failed; nothing follows.
	Failed(UpstreamError),
}

/// The backend serving one session.
pub enum Backend {
	Local(LocalSource),
	Remote(RemoteSource),
}

impl Backend {
	/// Produces the next chunk or signals completion/failure.
	pub async fn next_chunk(&mut self) -> Pull {
		match self {
			Backend::Local(source) => source.next_chunk(),
			Backend::Remote(source) => source.next_chunk().await,
		}
	}

	pub fn provider(&self) -> Provider {
		match self {
			Backend::Local(_) => Provider::Local,
			Backend::Remote(_) => Provider::Remote,
		}
	}
}
