// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concept-contrast head scores.
//!
//! For every `(layer, head)`, the score is the mean attention from the
//! selected query row to positive key positions minus the mean attention to
//! negative key positions. A side with no matched position contributes
//! exactly `0.0`: "no evidence" is neutral, not an error.

use std::fmt;
use std::str::FromStr;

use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};

use crate::cache::AttentionCache;
use crate::error::{HeadScopeError, Result};
use crate::mask::InclusionMask;
use crate::score::HeadScoreMatrix;

/// How the query row is chosen for the contrast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMode {
    /// Attention row of the last non-padded token.
    #[default]
    FinalToken,
    /// Per head, the mean of the attention rows over all query positions.
    MeanQuery,
}

impl ScoreMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FinalToken => "final_token",
            Self::MeanQuery => "mean_query",
        }
    }
}

impl fmt::Display for ScoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreMode {
    type Err = HeadScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "final_token" => Ok(Self::FinalToken),
            "mean_query" => Ok(Self::MeanQuery),
            other => Err(HeadScopeError::InvalidMode(other.to_owned())),
        }
    }
}

/// Index of the last real token.
///
/// With a padding mask, the last position whose mask entry is non-zero;
/// without one, `seq_len - 1`.
///
/// # Errors
///
/// Returns [`HeadScopeError::EmptyInput`] if the sequence is empty or the
/// mask marks no real token, and [`HeadScopeError::Shape`] if the mask
/// length differs from `seq_len`.
pub fn last_token_index(attention_mask: Option<&[u32]>, seq_len: usize) -> Result<usize> {
    match attention_mask {
        Some(mask) => {
            if mask.len() != seq_len {
                return Err(HeadScopeError::Shape(format!(
                    "attention mask has {} entries, sequence has {seq_len}",
                    mask.len()
                )));
            }
            mask.iter()
                .rposition(|&m| m != 0)
                .ok_or(HeadScopeError::EmptyInput)
        }
        None => seq_len.checked_sub(1).ok_or(HeadScopeError::EmptyInput),
    }
}

/// Compute the concept-contrast score of every head.
///
/// # Shapes
///
/// - `cache`: per-layer `[batch, heads, seq, seq]` or `[heads, seq, seq]`
/// - `positives`, `negatives`: length `seq`
/// - returns: `[n_layers][n_heads]`
///
/// # Errors
///
/// Returns [`HeadScopeError::MissingAttention`] if the cache holds no usable
/// attention, [`HeadScopeError::Shape`] if a mask length differs from the
/// key length, [`HeadScopeError::EmptyInput`] if the padding mask marks no
/// token, and [`HeadScopeError::Model`] on tensor failures.
pub fn score(
    cache: &AttentionCache,
    attention_mask: Option<&[u32]>,
    positives: &InclusionMask,
    negatives: &InclusionMask,
    mode: ScoreMode,
) -> Result<HeadScoreMatrix> {
    cache.validate(None)?;
    let seq_len = cache.seq_len()?;
    for (side, mask) in [("positive", positives), ("negative", negatives)] {
        if mask.len() != seq_len {
            return Err(HeadScopeError::Shape(format!(
                "{side} mask has {} entries, attention has {seq_len} key positions",
                mask.len()
            )));
        }
    }

    let query = match mode {
        ScoreMode::FinalToken => Some(last_token_index(attention_mask, seq_len)?),
        ScoreMode::MeanQuery => None,
    };
    let pos_positions = positions_u32(positives)?;
    let neg_positions = positions_u32(negatives)?;

    let mut rows = Vec::with_capacity(cache.n_layers());
    for layer in 0..cache.n_layers() {
        // [heads, seq_q, seq_k]
        let view = cache.head_view(layer)?;
        // [heads, seq_k]; index_select below needs a contiguous layout
        let query_slice = match query {
            Some(q) => view.narrow(1, q, 1)?.squeeze(1)?.contiguous()?,
            None => view.mean(1)?,
        };
        let pos = masked_mean(&query_slice, &pos_positions)?;
        let neg = masked_mean(&query_slice, &neg_positions)?;
        let head_scores: Vec<f32> = pos.sub(&neg)?.to_vec1()?;
        rows.push(head_scores);
    }
    Ok(HeadScoreMatrix::new(rows))
}

/// Mean over the selected key positions of a `[heads, seq_k]` slice.
///
/// An empty selection yields zeros of shape `[heads]`.
fn masked_mean(query_slice: &Tensor, positions: &[u32]) -> Result<Tensor> {
    let n_heads = query_slice.dim(0)?;
    if positions.is_empty() {
        return Ok(Tensor::zeros(n_heads, DType::F32, query_slice.device())?);
    }
    let idx = Tensor::new(positions, query_slice.device())?;
    // index_select(dim=1) → [heads, n_selected] → mean → [heads]
    Ok(query_slice.index_select(&idx, 1)?.mean(1)?)
}

fn positions_u32(mask: &InclusionMask) -> Result<Vec<u32>> {
    mask.positions()
        .into_iter()
        .map(|p| {
            u32::try_from(p)
                .map_err(|_| HeadScopeError::Shape(format!("position {p} does not fit in u32")))
        })
        .collect()
}
