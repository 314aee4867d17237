use std::sync::Arc;

use rand::Rng;

use super::transition_table::{normalize_key, TransitionTable};
use crate::corpus::tokenize;

/// Lowest temperature used for weighting; anything below behaves like it.
pub const TEMPERATURE_FLOOR: f64 = 0.05;

/// Highest temperature accepted from requests.
pub const TEMPERATURE_CEIL: f64 = 2.0;

/// Floors a temperature so `1/T` stays finite. `NaN` maps to the floor.
pub fn clamp_temperature(temperature: f64) -> f64 {
	temperature.max(TEMPERATURE_FLOOR)
}

/// Lazy, finite token sequence walking a transition table.
///
/// Each call to `next` produces exactly one token; nothing is generated
/// ahead of the caller. Stopping generation is simply not calling `next`
/// again (or dropping the sampler).
///
/// # Behavior
/// - The prefix window is seeded from the last `order` prompt tokens,
///   padded in front with the trailing tokens of a random valid prefix
///   when the prompt is shorter than `order`.
/// - An unseen prefix is replaced by a random valid prefix, so the
///   sequence always reaches `max_tokens`.
/// - Candidates are weighted by `count^(1/T)`.
pub struct Sampler<R> {
	table: Arc<TransitionTable>,
	/// Case-folded prefix window, `order` tokens once seeded.
	window: Vec<String>,
	temperature: f64,
	remaining: usize,
	rng: R,
}

impl<R: Rng> Sampler<R> {
	/// Creates a sampler seeded from already tokenized prompt tokens.
	pub fn new(
		table: Arc<TransitionTable>,
		prompt_tokens: &[String],
		max_tokens: usize,
		temperature: f64,
		mut rng: R,
	) -> Self {
		let order = table.order();
		let seeded = prompt_tokens.len().min(order);

		let mut window = Vec::with_capacity(order);
		if seeded < order {
			if let Some(prefix) = table.random_prefix(&mut rng) {
				window.extend(prefix[seeded..].iter().cloned());
			}
		}
		window.extend(
			prompt_tokens[prompt_tokens.len() - seeded..]
				.iter()
				.map(|token| normalize_key(token)),
		);

		Self {
			table,
			window,
			temperature: clamp_temperature(temperature),
			remaining: max_tokens,
			rng,
		}
	}

	/// Creates a sampler seeded from a raw prompt.
	pub fn from_prompt(
		table: Arc<TransitionTable>,
		prompt: &str,
		max_tokens: usize,
		temperature: f64,
		rng: R,
	) -> Self {
		Self::new(table, &tokenize(prompt), max_tokens, temperature, rng)
	}
}

impl<R: Rng> Iterator for Sampler<R> {
	type Item = String;

	fn next(&mut self) -> Option<String> {
		if self.remaining == 0 {
			return None;
		}

		let token = {
			let state = match self.table.candidates(&self.window) {
				Some(state) => state,
				None => {
					// Unseen prefix: restart from a random valid one instead of stopping
					let prefix = self.table.random_prefix(&mut self.rng)?;
					self.window.clone_from(prefix);
					self.table.candidates(prefix)?
				}
			};
			state.choose(self.temperature, &mut self.rng)?.to_owned()
		};

		if self.window.len() >= self.table.order() {
			self.window.remove(0);
		}
		self.window.push(normalize_key(&token));
		self.remaining -= 1;

		Some(token)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		(0, Some(self.remaining))
	}
}
