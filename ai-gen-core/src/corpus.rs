use std::path::Path;

use log::info;

use crate::error::CorpusError;
use crate::io::read_file;

/// Ordered, immutable sequence of word tokens.
///
/// Tokens keep their attached punctuation, so joining them with single
/// spaces reconstructs the (whitespace-normalized) source text.
#[derive(Debug, Clone)]
pub struct Corpus {
	tokens: Vec<String>,
}

impl Corpus {
	/// Reads and tokenizes a corpus file.
	///
	/// # Errors
	/// Returns an error if the file cannot be read or contains no tokens.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
		let path = path.as_ref();
		let text = read_file(path).map_err(|source| CorpusError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let corpus = Self::from_text(&text)?;
		info!("Loaded corpus {} ({} tokens)", path.display(), corpus.len());
		Ok(corpus)
	}

	/// Tokenizes an in-memory text.
	pub fn from_text(text: &str) -> Result<Self, CorpusError> {
		let tokens = tokenize(text);
		if tokens.is_empty() {
			return Err(CorpusError::Empty);
		}
		Ok(Self { tokens })
	}

	pub fn tokens(&self) -> &[String] {
		&self.tokens
	}

	pub fn len(&self) -> usize {
		self.tokens.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}

	/// BLAKE3 digest of the token sequence.
	///
	/// Two corpora with the same tokens in the same order share a fingerprint,
	/// whatever whitespace separated them in the source text.
	pub fn fingerprint(&self) -> [u8; 32] {
		let mut hasher = blake3::Hasher::new();
		for token in &self.tokens {
			hasher.update(token.as_bytes());
			hasher.update(b" ");
		}
		*hasher.finalize().as_bytes()
	}
}

/// Splits a text on any run of whitespace.
///
/// Used for both the corpus and prompts so they share one token shape.
pub fn tokenize(text: &str) -> Vec<String> {
	text.split_whitespace().map(str::to_owned).collect()
}
