use serde::Deserialize;

use crate::error::GenerateError;
use crate::model::sampler::{TEMPERATURE_CEIL, TEMPERATURE_FLOOR};
use crate::provider::{Provider, ProviderChoice};

/// Body of `POST /api/generate`, as received.
///
/// Every field is optional at this stage; `resolve` applies defaults and
/// rejects invalid values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
	#[serde(default)]
	pub prompt: Option<String>,
	#[serde(default)]
	pub provider: Option<String>,
	#[serde(default)]
	pub model: Option<String>,
	#[serde(default, alias = "max_tokens")]
	pub max_tokens: Option<i64>,
	#[serde(default)]
	pub temperature: Option<f64>,
}

/// Defaults and bounds applied to incoming requests.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
	pub default_max_tokens: usize,
	pub max_tokens_cap: usize,
	pub default_temperature: f64,
	/// Whether `auto` requests fall back to the local provider when the
	/// remote call fails before producing output.
	pub auto_fallback: bool,
}

impl Default for GenerationSettings {
	fn default() -> Self {
		Self {
			default_max_tokens: 400,
			max_tokens_cap: 2000,
			default_temperature: 0.7,
			auto_fallback: true,
		}
	}
}

/// A validated request with every default applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
	pub prompt: String,
	/// What the caller asked for.
	pub requested: ProviderChoice,
	/// What serves the request (before any fallback).
	pub provider: Provider,
	/// Forwarded to the remote provider only; `None` means its default.
	pub model: Option<String>,
	pub max_tokens: usize,
	pub temperature: f64,
}

impl GenerateRequest {
	/// Validates the request and resolves its provider.
	///
	/// # Errors
	/// - `EmptyPrompt` if the prompt is missing or blank
	/// - `InvalidProvider` if the provider is not a known value
	/// - `InvalidMaxTokens` if `maxTokens` is zero or negative
	/// - `RemoteNotConfigured` if `remote` is requested without a credential
	pub fn resolve(
		self,
		settings: &GenerationSettings,
		remote_configured: bool,
	) -> Result<ResolvedRequest, GenerateError> {
		let prompt = self.prompt.as_deref().map(str::trim).unwrap_or_default();
		if prompt.is_empty() {
			return Err(GenerateError::EmptyPrompt);
		}

		let requested = match self.provider.as_deref().map(str::trim) {
			None | Some("") => ProviderChoice::Auto,
			Some(value) => value
				.parse::<ProviderChoice>()
				.map_err(|_| GenerateError::InvalidProvider(value.to_owned()))?,
		};

		let provider = match requested {
			ProviderChoice::Local => Provider::Local,
			ProviderChoice::Remote if remote_configured => Provider::Remote,
			ProviderChoice::Remote => return Err(GenerateError::RemoteNotConfigured),
			ProviderChoice::Auto if remote_configured => Provider::Remote,
			ProviderChoice::Auto => Provider::Local,
		};

		let max_tokens = match self.max_tokens {
			None => settings.default_max_tokens,
			Some(n) if n <= 0 => return Err(GenerateError::InvalidMaxTokens(n)),
			Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
		}
		.min(settings.max_tokens_cap);

		let temperature = self
			.temperature
			.filter(|t| t.is_finite())
			.unwrap_or(settings.default_temperature)
			.clamp(TEMPERATURE_FLOOR, TEMPERATURE_CEIL);

		let model = self
			.model
			.map(|m| m.trim().to_owned())
			.filter(|m| !m.is_empty());

		Ok(ResolvedRequest {
			prompt: prompt.to_owned(),
			requested,
			provider,
			model,
			max_tokens,
			temperature,
		})
	}
}
