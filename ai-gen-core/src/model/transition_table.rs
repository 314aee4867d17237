use std::collections::HashMap;
use std::path::Path;
use std::thread;

use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::State;
use crate::corpus::Corpus;
use crate::error::ModelError;

/// Default prefix order (bigram context).
pub const DEFAULT_ORDER: usize = 2;

/// Corpora with fewer target positions than this are built on one thread.
const PARALLEL_THRESHOLD: usize = 50_000;

/// Lookup key: the `order` most recent tokens, case-folded.
pub type Prefix = Vec<String>;

/// Word-level Markov transition table of a fixed order.
///
/// # Responsibilities
/// - Build the table from a corpus (in parallel for large corpora)
/// - Look up the candidates of a prefix
/// - Pick a random valid prefix to (re)seed generation
/// - Merge with another table of the same order
/// - Persist itself to / restore itself from a binary cache
///
/// # Invariants
/// - `order` is always >= 1
/// - Every key of `states` has exactly `order` tokens and a non-empty state
/// - `prefixes` lists every key of `states` once, in first-seen order
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransitionTable {
	/// Number of preceding tokens forming a prefix.
	order: usize,

	/// Mapping from a prefix to its candidate next tokens.
	states: HashMap<Prefix, State>,

	/// Keys of `states` in first-seen order, for reproducible random picks.
	prefixes: Vec<Prefix>,

	/// Number of corpus tokens the table was built from.
	source_len: usize,

	/// Fingerprint of the corpus the table was built from.
	source_hash: [u8; 32],
}

/// Case-folds a token into its lookup form.
pub fn normalize_key(token: &str) -> String {
	token.to_lowercase()
}

impl TransitionTable {
	fn empty(order: usize) -> Self {
		Self {
			order,
			states: HashMap::new(),
			prefixes: Vec::new(),
			source_len: 0,
			source_hash: [0; 32],
		}
	}

	/// Builds the table of the given order from a corpus.
	///
	/// For every position `i >= order`, token `i` becomes a candidate of
	/// the prefix `tokens[i - order .. i]`.
	///
	/// # Errors
	/// Returns an error if `order < 1` or if the corpus has no token
	/// beyond the first prefix.
	pub fn build(corpus: &Corpus, order: usize) -> Result<Self, ModelError> {
		if order < 1 {
			return Err(ModelError::InvalidOrder);
		}
		let tokens = corpus.tokens();
		if tokens.len() <= order {
			return Err(ModelError::CorpusTooShort { tokens: tokens.len(), order });
		}

		let mut table = if tokens.len() - order < PARALLEL_THRESHOLD {
			let mut table = Self::empty(order);
			table.add_tokens(tokens);
			table
		} else {
			Self::build_parallel(tokens, order)?
		};
		table.source_len = tokens.len();
		table.source_hash = corpus.fingerprint();

		info!(
			"Built transition table of order {} ({} prefixes from {} tokens)",
			order,
			table.len(),
			tokens.len()
		);
		Ok(table)
	}

	/// Builds partial tables on scoped threads and merges them in chunk order.
	///
	/// # Behavior
	/// - Splits the target positions into chunks (based on CPU cores * factor).
	/// - Each chunk also sees the `order` tokens before its first target.
	/// - Partial tables are joined in order, so the prefix order matches a
	///   sequential build.
	fn build_parallel(tokens: &[String], order: usize) -> Result<Self, ModelError> {
		let targets = tokens.len() - order;
		let factor = 8;
		let chunks = num_cpus::get() * factor;
		let chunk_size = targets.div_ceil(chunks).max(1);

		let partials = thread::scope(|scope| {
			let handles: Vec<_> = (0..targets)
				.step_by(chunk_size)
				.map(|start| {
					let end = (start + chunk_size).min(targets);
					let window = &tokens[start..order + end];
					scope.spawn(move || {
						let mut partial = Self::empty(order);
						partial.add_tokens(window);
						partial
					})
				})
				.collect();

			handles
				.into_iter()
				.map(|handle| handle.join())
				.collect::<Result<Vec<_>, _>>()
		})
		.map_err(|_| ModelError::BuildPanicked)?;

		let mut table = Self::empty(order);
		for partial in &partials {
			table.merge(partial)?;
		}
		Ok(table)
	}

	/// Adds every `order + 1` window of `tokens` to the table.
	fn add_tokens(&mut self, tokens: &[String]) {
		for window in tokens.windows(self.order + 1) {
			let (prefix, next) = window.split_at(self.order);
			let key: Prefix = prefix.iter().map(|token| normalize_key(token)).collect();
			match self.states.get_mut(&key) {
				Some(state) => state.add_transition(&next[0]),
				None => {
					let mut state = State::default();
					state.add_transition(&next[0]);
					self.prefixes.push(key.clone());
					self.states.insert(key, state);
				}
			}
		}
	}

	pub fn order(&self) -> usize {
		self.order
	}

	/// Number of distinct prefixes.
	pub fn len(&self) -> usize {
		self.prefixes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.prefixes.is_empty()
	}

	/// Prefixes in first-seen order.
	pub fn prefixes(&self) -> &[Prefix] {
		&self.prefixes
	}

	/// Candidates of a prefix, which must already be case-folded.
	///
	/// Returns `None` if the prefix was never observed.
	pub fn candidates(&self, prefix: &[String]) -> Option<&State> {
		self.states.get(prefix)
	}

	/// Returns a random valid prefix.
	///
	/// Returns `None` if the table has no prefixes.
	pub fn random_prefix<R: Rng>(&self, rng: &mut R) -> Option<&Prefix> {
		if self.prefixes.is_empty() {
			return None;
		}
		self.prefixes.get(rng.random_range(0..self.prefixes.len()))
	}

	/// Merges another table into this one.
	///
	/// # Notes
	/// - Both tables must have the same order.
	/// - Occurrence counts for matching prefixes and candidates are summed.
	/// - New prefixes are appended in `other`'s first-seen order.
	///
	/// # Errors
	/// Returns an error if the orders do not match.
	pub fn merge(&mut self, other: &Self) -> Result<(), ModelError> {
		if self.order != other.order {
			return Err(ModelError::OrderMismatch { left: self.order, right: other.order });
		}

		for prefix in &other.prefixes {
			let Some(state) = other.states.get(prefix) else { continue };
			if let Some(existing) = self.states.get_mut(prefix) {
				existing.merge(state);
			} else {
				self.prefixes.push(prefix.clone());
				self.states.insert(prefix.clone(), state.clone());
			}
		}

		Ok(())
	}

	/// Loads the table from `cache` if it matches the corpus, otherwise builds
	/// it and refreshes the cache.
	///
	/// - Uses `postcard` for compact serialization/deserialization.
	/// - A cache built with another order or from a corpus with other tokens
	///   (length or fingerprint) is considered stale.
	/// - Cache read/write failures are logged, never fatal.
	pub fn load_or_build(corpus: &Corpus, order: usize, cache: Option<&Path>) -> Result<Self, ModelError> {
		let Some(cache) = cache else {
			return Self::build(corpus, order);
		};

		if cache.exists() {
			match Self::read_cache(cache) {
				Ok(table) if table.is_built_from(corpus, order) => {
					info!("Loaded transition table from {} ({} prefixes)", cache.display(), table.len());
					return Ok(table);
				}
				Ok(_) => warn!("Model cache {} is stale, rebuilding", cache.display()),
				Err(e) => warn!("Ignoring model cache {}: {e}", cache.display()),
			}
		}

		let table = Self::build(corpus, order)?;
		match table.write_cache(cache) {
			Ok(()) => info!("Wrote model cache {}", cache.display()),
			Err(e) => warn!("Failed to write model cache {}: {e}", cache.display()),
		}
		Ok(table)
	}

	fn is_built_from(&self, corpus: &Corpus, order: usize) -> bool {
		self.order == order && self.source_len == corpus.len() && self.source_hash == corpus.fingerprint()
	}

	fn read_cache(path: &Path) -> Result<Self, ModelError> {
		let bytes = std::fs::read(path)?;
		Ok(postcard::from_bytes(&bytes)?)
	}

	fn write_cache(&self, path: &Path) -> Result<(), ModelError> {
		let bytes = postcard::to_stdvec(self)?;
		std::fs::write(path, bytes)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;
	use std::path::PathBuf;

	fn key(tokens: &[&str]) -> Prefix {
		tokens.iter().map(|t| t.to_string()).collect()
	}

	fn table(text: &str, order: usize) -> TransitionTable {
		TransitionTable::build(&Corpus::from_text(text).unwrap(), order).unwrap()
	}

	fn temp_path(name: &str) -> PathBuf {
		std::env::temp_dir().join(format!("ai-gen-{}-{}.bin", name, std::process::id()))
	}

	#[test]
	fn every_observed_prefix_has_candidates() {
		let text = "the cat sat on the mat and the cat ran off the mat";
		let corpus = Corpus::from_text(text).unwrap();
		for order in 1..=3 {
			let table = TransitionTable::build(&corpus, order).unwrap();
			for window in corpus.tokens().windows(order + 1) {
				let prefix: Prefix = window[..order].iter().map(|t| normalize_key(t)).collect();
				let state = table.candidates(&prefix).expect("observed prefix missing");
				assert!(!state.is_empty());
				assert!(state.count(&window[order]) >= 1);
			}
		}
	}

	#[test]
	fn first_prefix_starts_at_order() {
		let table = table("a b c d", 2);
		assert_eq!(table.prefixes(), &[key(&["a", "b"]), key(&["b", "c"])]);
		assert_eq!(table.candidates(&key(&["a", "b"])).unwrap().count("c"), 1);
		assert!(table.candidates(&key(&["c", "d"])).is_none());
	}

	#[test]
	fn repeated_windows_increase_counts() {
		let table = table("the cat the cat the dog", 1);
		let state = table.candidates(&key(&["the"])).unwrap();
		assert_eq!(state.count("cat"), 2);
		assert_eq!(state.count("dog"), 1);
		assert_eq!(state.len(), 2);
	}

	#[test]
	fn keys_are_case_folded_but_candidates_keep_surface_form() {
		let table = table("The Quick brown The quick Fox", 2);
		let state = table.candidates(&key(&["the", "quick"])).unwrap();
		assert_eq!(state.count("brown"), 1);
		assert_eq!(state.count("Fox"), 1);
	}

	#[test]
	fn too_short_corpus_is_rejected() {
		let corpus = Corpus::from_text("only two").unwrap();
		assert!(matches!(
			TransitionTable::build(&corpus, 2),
			Err(ModelError::CorpusTooShort { tokens: 2, order: 2 })
		));
		assert!(matches!(TransitionTable::build(&corpus, 0), Err(ModelError::InvalidOrder)));
	}

	#[test]
	fn parallel_build_matches_sequential_build() {
		let words = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta"];
		let mut tokens = Vec::new();
		let mut x: u64 = 1;
		for _ in 0..(PARALLEL_THRESHOLD + 1234) {
			x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
			tokens.push(words[(x >> 33) as usize % words.len()].to_owned());
		}

		let parallel = TransitionTable::build_parallel(&tokens, 2).unwrap();
		let mut sequential = TransitionTable::empty(2);
		sequential.add_tokens(&tokens);

		assert_eq!(parallel.prefixes, sequential.prefixes);
		assert_eq!(parallel.states, sequential.states);
	}

	#[test]
	fn merge_rejects_order_mismatch() {
		let mut left = table("a b c d", 1);
		let right = table("a b c d", 2);
		assert!(matches!(left.merge(&right), Err(ModelError::OrderMismatch { left: 1, right: 2 })));
	}

	#[test]
	fn merge_sums_and_appends() {
		let mut left = table("a b a c", 1);
		left.merge(&table("a b d e", 1)).unwrap();
		assert_eq!(left.candidates(&key(&["a"])).unwrap().count("b"), 2);
		assert_eq!(left.prefixes().last(), Some(&key(&["d"])));
	}

	#[test]
	fn random_prefix_is_valid() {
		let table = table("the cat sat on the mat", 2);
		let mut rng = StdRng::seed_from_u64(3);
		for _ in 0..20 {
			let prefix = table.random_prefix(&mut rng).unwrap();
			assert!(table.candidates(prefix).is_some());
		}
	}

	#[test]
	fn cache_is_written_then_reused() {
		let path = temp_path("cache-reuse");
		let _ = std::fs::remove_file(&path);
		let corpus = Corpus::from_text("the cat sat on the mat").unwrap();

		let built = TransitionTable::load_or_build(&corpus, 2, Some(&path)).unwrap();
		assert!(path.exists());
		let loaded = TransitionTable::load_or_build(&corpus, 2, Some(&path)).unwrap();
		assert_eq!(built, loaded);

		let _ = std::fs::remove_file(&path);
	}

	#[test]
	fn stale_or_corrupt_cache_is_rebuilt() {
		let path = temp_path("cache-stale");
		let corpus = Corpus::from_text("the cat sat on the mat").unwrap();

		TransitionTable::load_or_build(&corpus, 1, Some(&path)).unwrap();
		let rebuilt = TransitionTable::load_or_build(&corpus, 2, Some(&path)).unwrap();
		assert_eq!(rebuilt.order(), 2);

		std::fs::write(&path, b"not a table").unwrap();
		let rebuilt = TransitionTable::load_or_build(&corpus, 2, Some(&path)).unwrap();
		assert_eq!(rebuilt, TransitionTable::build(&corpus, 2).unwrap());

		let _ = std::fs::remove_file(&path);
	}

	#[test]
	fn cache_of_another_corpus_with_same_length_is_rebuilt() {
		let path = temp_path("cache-same-length");
		let _ = std::fs::remove_file(&path);
		let old = Corpus::from_text("the cat sat on the mat").unwrap();
		let new = Corpus::from_text("a dog ran to a park").unwrap();
		assert_eq!(old.len(), new.len());

		TransitionTable::load_or_build(&old, 2, Some(&path)).unwrap();
		let loaded = TransitionTable::load_or_build(&new, 2, Some(&path)).unwrap();
		assert_eq!(loaded, TransitionTable::build(&new, 2).unwrap());
		assert!(loaded.candidates(&key(&["a", "dog"])).is_some());

		// The refreshed cache now serves the new corpus
		let reloaded = TransitionTable::load_or_build(&new, 2, Some(&path)).unwrap();
		assert_eq!(reloaded, loaded);

		let _ = std::fs::remove_file(&path);
	}
}
