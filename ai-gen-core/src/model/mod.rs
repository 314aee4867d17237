//! Word-level Markov chain used by the local provider.
//!
//! - Per-prefix candidate counts (`State`)
//! - The prefix → candidates table built from a corpus (`TransitionTable`)
//! - A lazy, temperature-weighted token generator (`Sampler`)

/// Candidate next tokens of a single prefix, with occurrence counts.
///
/// Owns the weighted choice (cumulative weights over `count^(1/T)`).
pub mod state;

/// Fixed-order transition table.
///
/// Handles corpus ingestion, parallel construction, merging and the
/// optional binary cache.
pub mod transition_table;

/// Pull-based token generator walking a `TransitionTable`.
pub mod sampler;
