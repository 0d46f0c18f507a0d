// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request pipeline: text in, head scores out.
//!
//! [`AttentionBackend`] is the seam to whatever runs the forward pass.
//! [`AttentionProbe`] ties a backend to a [`TextEncoder`] and runs one
//! tokenize → forward → score sequence per call. It holds no state between
//! calls; the attention tensors of a call are dropped when it returns.

use std::fmt;
use std::str::FromStr;

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::cache::AttentionCache;
use crate::error::{HeadScopeError, IndexRole, Result};
use crate::mask::build_mask;
use crate::score::{self, AllPairsScores, HeadScoreMatrix, ScoreMode};
use crate::tokenizer::{Encoded, TextEncoder};

// ---------------------------------------------------------------------------
// AttentionBackend trait
// ---------------------------------------------------------------------------

/// A model that can run a forward pass and report its attention patterns.
///
/// Implementations must run in inference mode (no gradients, no dropout)
/// so that repeated calls on the same input are bit-identical.
pub trait AttentionBackend: Send + Sync {
    /// Number of layers.
    fn num_layers(&self) -> usize;

    /// Number of attention heads per layer.
    fn num_heads(&self) -> usize;

    /// Device input ids should be placed on.
    fn device(&self) -> &Device;

    /// Run a forward pass and return one attention pattern per layer.
    ///
    /// # Shapes
    /// - `input_ids`: `[1, seq]` -- token IDs
    /// - returns: per layer `[1, heads, seq, seq]`
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::Model`] on tensor failures. Backends that
    /// were loaded without attention output should return an empty cache
    /// rather than zeros; the probe reports it as
    /// [`HeadScopeError::MissingAttention`].
    fn forward_attention(&self, input_ids: &Tensor) -> Result<AttentionCache>;
}

// ---------------------------------------------------------------------------
// Views and outputs
// ---------------------------------------------------------------------------

/// Which score view a request asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Concept contrast between positive and negative phrases.
    #[default]
    Concept,
    /// Attention between two explicit token positions.
    Pair,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concept => write!(f, "concept"),
            Self::Pair => write!(f, "pair"),
        }
    }
}

impl FromStr for ViewMode {
    type Err = HeadScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "concept" => Ok(Self::Concept),
            "pair" => Ok(Self::Pair),
            other => Err(HeadScopeError::InvalidMode(other.to_owned())),
        }
    }
}

/// Parameters of a head-score request, as received from a client.
///
/// Mode strings stay unparsed here so an unknown value surfaces as
/// [`HeadScopeError::InvalidMode`] rather than a deserialization failure.
/// Both are checked strictly: a `view_mode` other than `"concept"` or
/// `"pair"` is rejected, not treated as the concept view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ViewRequest {
    /// Positive concept phrases.
    #[serde(default)]
    pub positives: Vec<String>,
    /// Negative concept phrases.
    #[serde(default)]
    pub negatives: Vec<String>,
    /// `"final_token"` or `"mean_query"`.
    #[serde(default = "default_score_mode")]
    pub score_mode: String,
    /// `"concept"` or `"pair"`.
    #[serde(default = "default_view_mode")]
    pub view_mode: String,
    /// Query token for the pair view.
    #[serde(default)]
    pub src_index: Option<usize>,
    /// Key token for the pair view.
    #[serde(default)]
    pub dst_index: Option<usize>,
}

fn default_score_mode() -> String {
    ScoreMode::default().to_string()
}

fn default_view_mode() -> String {
    ViewMode::default().to_string()
}

/// Head scores plus the decoded input tokens they align with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutput {
    /// `[n_layers][n_heads]` scores.
    pub scores: HeadScoreMatrix,
    /// Decoded tokens of the input, special tokens included.
    pub tokens: Vec<String>,
}

/// All-pairs scores plus the decoded input tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllPairsOutput {
    /// Scores keyed by `"{src}_{dst}"` when serialized.
    pub all_scores: AllPairsScores,
    /// Decoded tokens of the input, special tokens included.
    pub tokens: Vec<String>,
}

// ---------------------------------------------------------------------------
// AttentionProbe
// ---------------------------------------------------------------------------

/// Runs scoring requests against one backend and tokenizer.
///
/// # Example
///
/// ```no_run
/// use candle_headscope::{AttentionBackend, AttentionProbe, HeadScopeTokenizer, ScoreMode};
///
/// # fn run(backend: &dyn AttentionBackend) -> candle_headscope::Result<()> {
/// let tokenizer = HeadScopeTokenizer::from_path("tokenizer.json")?;
/// let probe = AttentionProbe::new(backend, &tokenizer);
/// let out = probe.head_scores("The cat sat on the mat", &["cat"], &["mat"], ScoreMode::FinalToken)?;
/// assert_eq!(out.scores.n_layers(), backend.num_layers());
/// # Ok(())
/// # }
/// ```
pub struct AttentionProbe<'a, B: ?Sized, T: ?Sized> {
    backend: &'a B,
    tokenizer: &'a T,
}

impl<'a, B, T> AttentionProbe<'a, B, T>
where
    B: AttentionBackend + ?Sized,
    T: TextEncoder + ?Sized,
{
    /// Pair a backend with the tokenizer it was trained with.
    pub const fn new(backend: &'a B, tokenizer: &'a T) -> Self {
        Self { backend, tokenizer }
    }

    /// Concept-contrast scores for every head.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::EmptyInput`] for blank text,
    /// [`HeadScopeError::MissingAttention`] if the backend returns no usable
    /// attention, and propagates tokenizer and tensor errors.
    pub fn head_scores<S: AsRef<str>>(
        &self,
        text: &str,
        positives: &[S],
        negatives: &[S],
        mode: ScoreMode,
    ) -> Result<ProbeOutput> {
        let encoded = self.encode(text)?;
        let pos_mask = build_mask(&encoded.ids, positives, self.tokenizer)?;
        let neg_mask = build_mask(&encoded.ids, negatives, self.tokenizer)?;
        tracing::debug!(
            %mode,
            seq_len = encoded.len(),
            positive_positions = pos_mask.count(),
            negative_positions = neg_mask.count(),
            "scoring concept contrast"
        );
        let cache = self.forward(&encoded)?;
        let scores = score::score(
            &cache,
            Some(encoded.attention_mask.as_slice()),
            &pos_mask,
            &neg_mask,
            mode,
        )?;
        Ok(ProbeOutput {
            scores,
            tokens: encoded.tokens,
        })
    }

    /// Attention from `src_index` (query) to `dst_index` (key) for every head.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::EmptyInput`] for blank text,
    /// [`HeadScopeError::IndexOutOfRange`] for indices outside the encoded
    /// sequence, and [`HeadScopeError::MissingAttention`] if the backend
    /// returns no usable attention.
    pub fn pair_scores(&self, text: &str, src_index: usize, dst_index: usize) -> Result<ProbeOutput> {
        let encoded = self.encode(text)?;
        // Reject bad indices before paying for a forward pass.
        score::check_index(IndexRole::Source, src_index, encoded.len())?;
        score::check_index(IndexRole::Destination, dst_index, encoded.len())?;
        tracing::debug!(src_index, dst_index, seq_len = encoded.len(), "scoring token pair");
        let cache = self.forward(&encoded)?;
        let scores = score::pair_score(&cache, src_index, dst_index)?;
        Ok(ProbeOutput {
            scores,
            tokens: encoded.tokens,
        })
    }

    /// Dispatch a client request to the concept or pair view.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::InvalidMode`] for unknown mode strings,
    /// [`HeadScopeError::MissingPairIndex`] when a pair view lacks an index,
    /// and everything [`head_scores`](Self::head_scores) and
    /// [`pair_scores`](Self::pair_scores) return.
    pub fn view(&self, text: &str, request: &ViewRequest) -> Result<ProbeOutput> {
        let view_mode: ViewMode = request.view_mode.parse()?;
        match view_mode {
            ViewMode::Pair => {
                let src = request
                    .src_index
                    .ok_or(HeadScopeError::MissingPairIndex(IndexRole::Source))?;
                let dst = request
                    .dst_index
                    .ok_or(HeadScopeError::MissingPairIndex(IndexRole::Destination))?;
                self.pair_scores(text, src, dst)
            }
            ViewMode::Concept => {
                let mode: ScoreMode = request.score_mode.parse()?;
                self.head_scores(text, &request.positives, &request.negatives, mode)
            }
        }
    }

    /// Scores for every ordered token pair.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::EmptyInput`] for blank text and
    /// [`HeadScopeError::MissingAttention`] if the backend returns no usable
    /// attention.
    pub fn all_pair_scores(&self, text: &str) -> Result<AllPairsOutput> {
        let encoded = self.encode(text)?;
        tracing::info!(
            seq_len = encoded.len(),
            pairs = encoded.len() * encoded.len(),
            "compiling all-pairs scores"
        );
        let cache = self.forward(&encoded)?;
        let all_scores = score::all_pairs(&cache)?;
        Ok(AllPairsOutput {
            all_scores,
            tokens: encoded.tokens,
        })
    }

    /// Display tokens for `text`, without special tokens.
    ///
    /// # Errors
    ///
    /// Propagates tokenizer errors.
    pub fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        self.tokenizer.tokens(text)
    }

    /// Tokenize, refusing blank input before the tokenizer runs.
    fn encode(&self, text: &str) -> Result<Encoded> {
        if text.trim().is_empty() {
            return Err(HeadScopeError::EmptyInput);
        }
        let encoded = self.tokenizer.encode(text)?;
        if encoded.is_empty() {
            return Err(HeadScopeError::EmptyInput);
        }
        if encoded.attention_mask.len() != encoded.len() || encoded.tokens.len() != encoded.len() {
            return Err(HeadScopeError::Tokenizer(format!(
                "encoding has {} ids, {} tokens and {} mask entries",
                encoded.len(),
                encoded.tokens.len(),
                encoded.attention_mask.len()
            )));
        }
        Ok(encoded)
    }

    /// Forward pass plus the checks that the backend kept its contract.
    fn forward(&self, encoded: &Encoded) -> Result<AttentionCache> {
        // [seq] → [1, seq]
        let input_ids = Tensor::new(encoded.ids.as_slice(), self.backend.device())?.unsqueeze(0)?;
        let cache = self.backend.forward_attention(&input_ids)?;
        if let Err(e) = cache.validate(Some((self.backend.num_layers(), self.backend.num_heads()))) {
            tracing::warn!(error = %e, "backend returned unusable attention");
            return Err(e);
        }
        let seq_len = cache.seq_len()?;
        if seq_len != encoded.len() {
            return Err(HeadScopeError::Shape(format!(
                "attention covers {seq_len} positions, input has {}",
                encoded.len()
            )));
        }
        Ok(cache)
    }
}

impl<B: ?Sized, T: ?Sized> fmt::Debug for AttentionProbe<'_, B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttentionProbe").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn view_mode_parsing() {
        assert_eq!("pair".parse::<ViewMode>().unwrap(), ViewMode::Pair);
        assert_eq!("concept".parse::<ViewMode>().unwrap(), ViewMode::Concept);
        assert!(matches!(
            "grid".parse::<ViewMode>(),
            Err(HeadScopeError::InvalidMode(_))
        ));
    }

    #[test]
    fn request_defaults() {
        let req: ViewRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.score_mode, "final_token");
        assert_eq!(req.view_mode, "concept");
        assert!(req.positives.is_empty());
        assert_eq!(req.src_index, None);
    }

    #[test]
    fn request_fields() {
        let req: ViewRequest = serde_json::from_str(
            r#"{"positives": ["cat"], "view_mode": "pair", "src_index": 3, "dst_index": 0}"#,
        )
        .unwrap();
        assert_eq!(req.positives, vec!["cat".to_owned()]);
        assert_eq!(req.view_mode, "pair");
        assert_eq!((req.src_index, req.dst_index), (Some(3), Some(0)));
    }
}
