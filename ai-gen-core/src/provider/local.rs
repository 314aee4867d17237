use std::sync::Arc;

use rand::rngs::StdRng;

use super::Pull;
use crate::model::sampler::Sampler;
use crate::model::transition_table::TransitionTable;

/// Local backend: one sampled token per chunk.
///
/// Each chunk is the token followed by a single space, so concatenating the
/// chunks yields the space-joined text.
pub struct LocalSource {
	sampler: Sampler<StdRng>,
}

impl LocalSource {
	/// Samples a continuation of `prompt` with the given random source.
	pub fn with_rng(
		table: Arc<TransitionTable>,
		prompt: &str,
		max_tokens: usize,
		temperature: f64,
		rng: StdRng,
	) -> Self {
		Self { sampler: Sampler::from_prompt(table, prompt, max_tokens, temperature, rng) }
	}

	pub fn next_chunk(&mut self) -> Pull {
		match self.sampler.next() {
			Some(token) => Pull::Text(format!("{token} ")),
			None => Pull::Done,
		}
	}
}
