// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenizer seam: the [`TextEncoder`] trait and its `HuggingFace` backend.
//!
//! The scoring engine only needs three things from a tokenizer: encode the
//! full text (with the model's special tokens), encode a phrase without
//! special tokens, and produce printable token strings for display.

use crate::error::{HeadScopeError, Result};

/// A tokenized input sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Token IDs.
    pub ids: Vec<u32>,
    /// Printable token strings, one per id.
    pub tokens: Vec<String>,
    /// `1` for real tokens, `0` for padding.
    pub attention_mask: Vec<u32>,
}

impl Encoded {
    /// An encoding with no padding.
    #[must_use]
    pub fn unpadded(ids: Vec<u32>, tokens: Vec<String>) -> Self {
        let attention_mask = vec![1; ids.len()];
        Self {
            ids,
            tokens,
            attention_mask,
        }
    }

    /// Number of positions, padding included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the encoding has no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Text-to-token interface consumed by the scoring pipeline.
pub trait TextEncoder {
    /// Encode full input text, adding special tokens according to the
    /// tokenizer's post-processor.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::Tokenizer`] if encoding fails.
    fn encode(&self, text: &str) -> Result<Encoded>;

    /// Encode a phrase **without** special tokens, for span matching.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::Tokenizer`] if encoding fails.
    fn encode_phrase(&self, phrase: &str) -> Result<Vec<u32>>;

    /// Printable tokens for `text`, without special tokens.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::Tokenizer`] if encoding fails.
    fn tokens(&self, text: &str) -> Result<Vec<String>>;
}

/// `HuggingFace` `tokenizers` backend.
///
/// # Example
///
/// ```no_run
/// use candle_headscope::{HeadScopeTokenizer, TextEncoder};
///
/// # fn main() -> candle_headscope::Result<()> {
/// let tok = HeadScopeTokenizer::from_path("tokenizer.json")?;
/// let encoded = tok.encode("The cat sat on the mat")?;
/// let cat = tok.encode_phrase("cat")?;
/// assert!(!encoded.ids.is_empty() && !cat.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct HeadScopeTokenizer {
    inner: Box<tokenizers::Tokenizer>,
}

impl HeadScopeTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::Tokenizer`] if the file cannot be loaded or parsed.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let tok = tokenizers::Tokenizer::from_file(path.as_ref()).map_err(|e| {
            HeadScopeError::Tokenizer(format!(
                "failed to load HF tokenizer from {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self::new(tok))
    }

    /// Wrap an already-loaded tokenizer.
    #[must_use]
    pub fn new(tokenizer: tokenizers::Tokenizer) -> Self {
        Self {
            inner: Box::new(tokenizer),
        }
    }

    /// Decode token IDs back to a string.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::Tokenizer`] if decoding fails.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, false)
            .map_err(|e| HeadScopeError::Tokenizer(format!("HF decode failed: {e}")))
    }

    /// Vocabulary size, added tokens included.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn hf_encode(&self, text: &str, add_special_tokens: bool) -> Result<tokenizers::Encoding> {
        self.inner
            .encode(text, add_special_tokens)
            .map_err(|e| HeadScopeError::Tokenizer(format!("HF encode failed: {e}")))
    }
}

impl TextEncoder for HeadScopeTokenizer {
    fn encode(&self, text: &str) -> Result<Encoded> {
        let encoding = self.hf_encode(text, true)?;
        Ok(Encoded {
            ids: encoding.get_ids().to_vec(),
            tokens: encoding.get_tokens().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        })
    }

    fn encode_phrase(&self, phrase: &str) -> Result<Vec<u32>> {
        Ok(self.hf_encode(phrase, false)?.get_ids().to_vec())
    }

    fn tokens(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.hf_encode(text, false)?.get_tokens().to_vec())
    }
}

impl std::fmt::Debug for HeadScopeTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadScopeTokenizer")
            .field("vocab_size", &self.vocab_size())
            .finish()
    }
}
