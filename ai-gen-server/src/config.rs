use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use ai_gen_core::model::transition_table::DEFAULT_ORDER;
use ai_gen_core::provider::RemoteConfig;
use ai_gen_core::provider::remote::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
use ai_gen_core::request::GenerationSettings;

/// Server configuration. Every flag can also be set through its environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "ai-gen-server", version, about = "Streaming text generation server")]
pub struct ServerConfig {
	#[arg(long, env = "HOST", default_value = "0.0.0.0")]
	pub host: String,

	#[arg(long, env = "PORT", default_value_t = 5000)]
	pub port: u16,

	/// Plain-text corpus of the local Markov provider.
	#[arg(long, env = "CORPUS_PATH", default_value = "corpus/sample.txt")]
	pub corpus: PathBuf,

	/// Number of preceding words used as Markov context.
	#[arg(long, env = "MARKOV_ORDER", default_value_t = DEFAULT_ORDER)]
	pub order: usize,

	/// Cache the built transition table next to the corpus (`.bin`).
	#[arg(long, env = "CACHE_MODEL")]
	pub cache_model: bool,

	#[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
	pub openai_api_key: Option<String>,

	#[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
	pub openai_base_url: String,

	/// Model used when a request does not name one.
	#[arg(long, env = "DEFAULT_MODEL", default_value = DEFAULT_MODEL)]
	pub default_model: String,

	#[arg(long, env = "MAX_TOKENS_CAP", default_value_t = 2000)]
	pub max_tokens_cap: usize,

	#[arg(long, env = "UPSTREAM_CONNECT_TIMEOUT", default_value_t = 10)]
	pub connect_timeout_secs: u64,

	#[arg(long, env = "UPSTREAM_READ_TIMEOUT", default_value_t = 60)]
	pub read_timeout_secs: u64,

	/// Report remote failures of `auto` requests instead of falling back to local.
	#[arg(long, env = "NO_AUTO_FALLBACK")]
	pub no_auto_fallback: bool,
}

impl ServerConfig {
	pub fn remote(&self) -> RemoteConfig {
		RemoteConfig {
			api_key: self.openai_api_key.clone().filter(|key| !key.trim().is_empty()),
			base_url: self.openai_base_url.clone(),
			default_model: self.default_model.clone(),
			system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
			connect_timeout: Duration::from_secs(self.connect_timeout_secs),
			read_timeout: Duration::from_secs(self.read_timeout_secs),
		}
	}

	pub fn generation(&self) -> GenerationSettings {
		GenerationSettings {
			max_tokens_cap: self.max_tokens_cap.max(1),
			auto_fallback: !self.no_auto_fallback,
			..Default::default()
		}
	}
}
