use std::collections::BTreeMap;

use rand::Rng;

use serde::{Deserialize, Serialize};

use super::sampler::clamp_temperature;

/// Candidate next tokens observed after one prefix.
///
/// Conceptually, this is a node in a Markov chain where outgoing edges
/// are weighted by their number of observations.
///
/// ## Invariants
/// - Each transition occurrence count is strictly positive
/// - Candidates are kept sorted, so a fixed random source always picks the
///   same token
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct State {
	/// Outgoing transitions indexed by the next token (surface form).
	/// Example: { "fox" => 3, "dog." => 1 }
	transitions: BTreeMap<String, usize>,
}

impl State {
	/// Records an occurrence of a transition toward `token`.
	///
	/// - If the transition already exists, its occurrence count is increased.
	/// - Otherwise, a new transition is created with an initial count of 1.
	pub fn add_transition(&mut self, token: &str) {
		match self.transitions.get_mut(token) {
			Some(occurrence) => *occurrence += 1,
			None => {
				self.transitions.insert(token.to_owned(), 1);
			}
		}
	}

	/// Number of distinct candidates.
	pub fn len(&self) -> usize {
		self.transitions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.transitions.is_empty()
	}

	/// Occurrence count of a candidate (0 if never observed).
	pub fn count(&self, token: &str) -> usize {
		self.transitions.get(token).copied().unwrap_or(0)
	}

	/// Sampling weight of every candidate, in candidate order.
	///
	/// `weight = count^(1/T)` with `T` floored at the temperature floor.
	/// Counts are divided by the largest count first: the distribution is
	/// unchanged and large counts cannot overflow at low temperature.
	pub fn weights(&self, temperature: f64) -> Vec<f64> {
		let exponent = 1.0 / clamp_temperature(temperature);
		let max = self.transitions.values().copied().max().unwrap_or(0);
		if max == 0 {
			return vec![0.0; self.transitions.len()];
		}
		self.transitions
			.values()
			.map(|occurrence| (*occurrence as f64 / max as f64).powf(exponent))
			.collect()
	}

	/// Picks the next token using temperature-weighted random sampling.
	///
	/// This method performs:
	/// - one pass building the cumulative weight array
	/// - one uniform draw in `[0, total)`
	/// - a binary search for the first bucket above the draw
	///
	/// Returns `None` if the state has no transitions.
	pub fn choose<R: Rng>(&self, temperature: f64, rng: &mut R) -> Option<&str> {
		let cumulative = cumulative_weights(&self.weights(temperature));
		let total = *cumulative.last()?;
		if total <= 0.0 {
			return None;
		}
		let draw = rng.random::<f64>() * total;
		let index = pick_bucket(&cumulative, draw);
		self.transitions.keys().nth(index).map(String::as_str)
	}

	/// Merges another state into this one, summing occurrence counts.
	pub fn merge(&mut self, other: &Self) {
		for (token, occurrence) in &other.transitions {
			*self.transitions.entry(token.clone()).or_insert(0) += *occurrence;
		}
	}
}

/// Running sums of `weights`.
pub(crate) fn cumulative_weights(weights: &[f64]) -> Vec<f64> {
	weights
		.iter()
		.scan(0.0, |sum, weight| {
			*sum += weight;
			Some(*sum)
		})
		.collect()
}

/// Index of the first bucket whose cumulative weight exceeds `draw`.
///
/// Clamped to the last bucket when rounding pushes `draw` to the total.
pub(crate) fn pick_bucket(cumulative: &[f64], draw: f64) -> usize {
	let index = cumulative.partition_point(|sum| *sum <= draw);
	index.min(cumulative.len().saturating_sub(1))
}
