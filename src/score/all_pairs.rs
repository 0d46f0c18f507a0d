// SPDX-License-Identifier: MIT OR Apache-2.0

//! Head scores for every ordered token pair.
//!
//! Output size is `seq_len² × layers × heads`; callers bound `seq_len`
//! before compiling. Every entry equals what
//! [`pair_score`](crate::score::pair_score) returns for the same pair.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::ser::SerializeMap;

use crate::cache::AttentionCache;
use crate::error::{HeadScopeError, Result};
use crate::score::{HeadScoreMatrix, TokenPair};

/// How a per-pair [`HeadScoreMatrix`] collapses to one value in a token map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMapMode {
    /// A single head.
    Head {
        /// Layer index.
        layer: usize,
        /// Head index within the layer.
        head: usize,
    },
    /// Mean over the heads of one layer.
    Layer(usize),
    /// Mean over every layer and head.
    Overall,
}

/// Head scores keyed by `(src, dst)` for every ordered pair, self-pairs included.
#[derive(Debug, Clone, PartialEq)]
pub struct AllPairsScores {
    seq_len: usize,
    scores: BTreeMap<TokenPair, HeadScoreMatrix>,
}

impl AllPairsScores {
    /// Sequence length the pairs range over.
    #[must_use]
    pub const fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Number of pairs (`seq_len²`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether there are no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Scores for one ordered pair.
    #[must_use]
    pub fn get(&self, src: usize, dst: usize) -> Option<&HeadScoreMatrix> {
        self.scores.get(&TokenPair::new(src, dst))
    }

    /// Iterate pairs in `(src, dst)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&TokenPair, &HeadScoreMatrix)> {
        self.scores.iter()
    }

    /// Collapse every pair to one value, as a `[src][dst]` grid.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::Shape`] if the selected layer or head does
    /// not exist.
    pub fn token_map(&self, mode: TokenMapMode) -> Result<Vec<Vec<f32>>> {
        let missing = || HeadScopeError::Shape(format!("{mode:?} is not in the scored heads"));
        let mut grid = Vec::with_capacity(self.seq_len);
        let mut values = self.scores.values();
        for _ in 0..self.seq_len {
            let mut row = Vec::with_capacity(self.seq_len);
            for matrix in values.by_ref().take(self.seq_len) {
                let value = match mode {
                    TokenMapMode::Head { layer, head } => matrix.get(layer, head),
                    TokenMapMode::Layer(layer) => matrix.layer_mean(layer),
                    TokenMapMode::Overall => matrix.overall_mean(),
                };
                row.push(value.ok_or_else(missing)?);
            }
            grid.push(row);
        }
        Ok(grid)
    }
}

/// Serializes as a JSON object keyed `"{src}_{dst}"`.
impl Serialize for AllPairsScores {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.scores.len()))?;
        for (pair, matrix) in &self.scores {
            map.serialize_entry(&pair.key(), matrix)?;
        }
        map.end()
    }
}

/// Compile head scores for every ordered token pair.
///
/// Each layer is read once as a dense `[seq_q][seq_k][heads]` array and
/// scattered into the per-pair matrices.
///
/// # Errors
///
/// Returns [`HeadScopeError::MissingAttention`] if the cache holds no usable
/// attention, and [`HeadScopeError::Model`] on tensor failures.
pub fn all_pairs(cache: &AttentionCache) -> Result<AllPairsScores> {
    cache.validate(None)?;
    let seq_len = cache.seq_len()?;
    let n_layers = cache.n_layers();

    let mut per_pair: Vec<Vec<Vec<f32>>> = vec![Vec::with_capacity(n_layers); seq_len * seq_len];
    for layer in 0..n_layers {
        // [heads, seq_q, seq_k] → [seq_q, seq_k, heads]
        let grid: Vec<Vec<Vec<f32>>> = cache
            .head_view(layer)?
            .permute((1, 2, 0))?
            .contiguous()?
            .to_vec3()?;
        for (slot, heads) in per_pair.iter_mut().zip(grid.into_iter().flatten()) {
            slot.push(heads);
        }
    }

    let scores: BTreeMap<TokenPair, HeadScoreMatrix> = per_pair
        .into_iter()
        .enumerate()
        .map(|(i, rows)| {
            (
                TokenPair::new(i / seq_len, i % seq_len),
                HeadScoreMatrix::new(rows),
            )
        })
        .collect();

    tracing::debug!(
        seq_len,
        n_layers,
        pairs = scores.len(),
        "compiled all-pairs head scores"
    );
    Ok(AllPairsScores { seq_len, scores })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::score::pair_score;
    use candle_core::{Device, Tensor};

    /// Two layers, two heads, three tokens; distinct, asymmetric weights.
    fn sample_cache() -> AttentionCache {
        let layer = |offset: f32| {
            let data: Vec<f32> = (0..18_u8)
                .map(|i| f32::from(i).mul_add(0.01, offset))
                .collect();
            Tensor::from_vec(data, (1, 2, 3, 3), &Device::Cpu).unwrap()
        };
        AttentionCache::from_patterns(vec![layer(0.0), layer(0.5)])
    }

    #[test]
    fn covers_every_ordered_pair() {
        let all = all_pairs(&sample_cache()).unwrap();
        assert_eq!(all.seq_len(), 3);
        assert_eq!(all.len(), 9);
        for src in 0..3 {
            for dst in 0..3 {
                assert!(all.get(src, dst).is_some());
            }
        }
        assert!(all.get(3, 0).is_none());
    }

    #[test]
    fn matches_pairwise_extraction_bit_for_bit() {
        let cache = sample_cache();
        let all = all_pairs(&cache).unwrap();
        for src in 0..3 {
            for dst in 0..3 {
                assert_eq!(all.get(src, dst).unwrap(), &pair_score(&cache, src, dst).unwrap());
            }
        }
    }

    #[test]
    fn both_directions_are_distinct_entries() {
        let all = all_pairs(&sample_cache()).unwrap();
        assert_ne!(all.get(0, 2), all.get(2, 0));
    }

    #[test]
    fn shape_per_pair() {
        let all = all_pairs(&sample_cache()).unwrap();
        for (_, m) in all.iter() {
            assert_eq!(m.n_layers(), 2);
            assert_eq!(m.n_heads(), 2);
        }
    }

    #[test]
    fn token_map_modes() {
        let all = all_pairs(&sample_cache()).unwrap();
        let head = all.token_map(TokenMapMode::Head { layer: 1, head: 0 }).unwrap();
        assert_eq!(head.len(), 3);
        // layer 1, head 0, src 2, dst 1 → flat index 7
        assert!((head[2][1] - (0.5 + 0.07)).abs() < 1e-6);

        let layer = all.token_map(TokenMapMode::Layer(0)).unwrap();
        // heads 0 and 1 at (0, 0): 0.00 and 0.09
        assert!((layer[0][0] - 0.045).abs() < 1e-6);

        let overall = all.token_map(TokenMapMode::Overall).unwrap();
        // (0.00 + 0.09 + 0.50 + 0.59) / 4
        assert!((overall[0][0] - 0.295).abs() < 1e-6);

        assert!(all.token_map(TokenMapMode::Layer(5)).is_err());
        assert!(all.token_map(TokenMapMode::Head { layer: 0, head: 9 }).is_err());
    }

    #[test]
    fn serializes_with_pair_keys() {
        let all = all_pairs(&sample_cache()).unwrap();
        let json = serde_json::to_value(&all).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 9);
        assert!(obj.contains_key("2_0"));
        assert_eq!(obj["1_2"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn empty_cache_is_missing_attention() {
        let cache = AttentionCache::with_capacity(0);
        assert!(all_pairs(&cache).unwrap_err().is_missing_attention());
    }
}
