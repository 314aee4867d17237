//! Streaming text generation library.
//!
//! This crate provides the generation engine behind the `/api/generate` endpoint:
//! - A word-level corpus loaded once at startup
//! - A Markov transition table built from that corpus
//! - A temperature-weighted, pull-based Markov sampler
//! - An adapter for a remote OpenAI-compatible streaming chat completion
//! - An orchestrator choosing between both backends per request
//! - The event-stream encoding of produced chunks
//!
//! Transport (HTTP routing) lives in the server crate; everything here is
//! framework-agnostic.

/// Corpus loading and tokenization.
pub mod corpus;

/// Error types shared by every module of the crate.
pub mod error;

/// I/O utilities (file loading, path helpers).
pub mod io;

/// Markov transition table and sampler.
pub mod model;

/// Per-request session driving one backend into a chunk sequence.
pub mod orchestrator;

/// Generation backends (local Markov sampler, remote chat completion).
pub mod provider;

/// Incoming request shape, validation and defaults.
pub mod request;

/// Stream chunks and their event-stream wire encoding.
pub mod stream;

#[cfg(test)]
mod test_support;
