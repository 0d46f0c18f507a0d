// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-to-token head scores.
//!
//! The source token is the attending (query) token and the destination is
//! the attended-to (key) token: `pair_score(cache, s, d)` reads
//! `attention[layer][head][s][d]`.

use candle_core::IndexOp;

use crate::cache::AttentionCache;
use crate::error::{HeadScopeError, IndexRole, Result};
use crate::score::HeadScoreMatrix;

/// Reject an index outside `[0, len)`.
///
/// # Errors
///
/// Returns [`HeadScopeError::IndexOutOfRange`] naming `role` and the range.
pub fn check_index(role: IndexRole, index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(HeadScopeError::IndexOutOfRange { role, index, len })
    }
}

/// Attention weight from `src_index` to `dst_index` for every head.
///
/// # Shapes
///
/// - returns: `[n_layers][n_heads]`
///
/// # Errors
///
/// Returns [`HeadScopeError::IndexOutOfRange`] if either index is outside
/// the sequence, [`HeadScopeError::MissingAttention`] if the cache holds no
/// usable attention, and [`HeadScopeError::Model`] on tensor failures.
pub fn pair_score(
    cache: &AttentionCache,
    src_index: usize,
    dst_index: usize,
) -> Result<HeadScoreMatrix> {
    cache.validate(None)?;
    let seq_len = cache.seq_len()?;
    check_index(IndexRole::Source, src_index, seq_len)?;
    check_index(IndexRole::Destination, dst_index, seq_len)?;

    let mut rows = Vec::with_capacity(cache.n_layers());
    for layer in 0..cache.n_layers() {
        // [heads, seq_q, seq_k] → [heads]
        let weights: Vec<f32> = cache
            .head_view(layer)?
            .i((.., src_index, dst_index))?
            .to_vec1()?;
        rows.push(weights);
    }
    Ok(HeadScoreMatrix::new(rows))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};

    /// One layer, two heads, three tokens; every weight distinct.
    fn sample_cache() -> AttentionCache {
        #[rustfmt::skip]
        let data: Vec<f32> = vec![
            // head 0
            0.50, 0.30, 0.20,
            0.10, 0.80, 0.10,
            0.25, 0.15, 0.60,
            // head 1
            0.05, 0.90, 0.05,
            0.70, 0.20, 0.10,
            0.40, 0.35, 0.25,
        ];
        AttentionCache::from_patterns(vec![
            Tensor::from_vec(data, (1, 2, 3, 3), &Device::Cpu).unwrap(),
        ])
    }

    #[test]
    fn source_is_query_destination_is_key() {
        let cache = sample_cache();
        // row 0 (query), column 1 (key)
        let m = pair_score(&cache, 0, 1).unwrap();
        assert_eq!(m.into_rows(), vec![vec![0.30_f32, 0.90]]);
        // row 1, column 0
        let m = pair_score(&cache, 1, 0).unwrap();
        assert_eq!(m.into_rows(), vec![vec![0.10_f32, 0.70]]);
    }

    #[test]
    fn direction_matters() {
        let cache = sample_cache();
        assert_ne!(pair_score(&cache, 2, 0).unwrap(), pair_score(&cache, 0, 2).unwrap());
    }

    #[test]
    fn self_pair() {
        let cache = sample_cache();
        assert_eq!(
            pair_score(&cache, 2, 2).unwrap().into_rows(),
            vec![vec![0.60_f32, 0.25]]
        );
    }

    #[test]
    fn boundary_indices() {
        let cache = sample_cache();
        assert!(pair_score(&cache, 2, 0).is_ok());
        let err = pair_score(&cache, 3, 0).unwrap_err();
        assert!(matches!(
            err,
            HeadScopeError::IndexOutOfRange { role: IndexRole::Source, index: 3, len: 3 }
        ));
        let err = pair_score(&cache, 0, 7).unwrap_err();
        assert!(matches!(
            err,
            HeadScopeError::IndexOutOfRange { role: IndexRole::Destination, index: 7, len: 3 }
        ));
    }

    #[test]
    fn empty_cache_is_missing_attention() {
        let cache = AttentionCache::with_capacity(0);
        assert!(pair_score(&cache, 0, 0).unwrap_err().is_missing_attention());
    }
}
