// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attention pattern cache: the read-only input of every scoring call.
//!
//! [`AttentionCache`] holds post-softmax attention patterns from each layer
//! of one forward pass. Tensors may be `[batch, heads, seq_q, seq_k]` or
//! `[heads, seq_q, seq_k]`; batch index 0 is the one read.

use candle_core::{DType, Tensor};

use crate::error::{HeadScopeError, Result};

/// Stores per-layer attention weights from a forward pass.
///
/// # Example
///
/// ```
/// use candle_headscope::AttentionCache;
/// use candle_core::{Device, Tensor};
///
/// let mut cache = AttentionCache::with_capacity(2);
/// // shape [batch=1, heads=4, seq=6, seq=6]
/// cache.push(Tensor::zeros((1, 4, 6, 6), candle_core::DType::F32, &Device::Cpu).unwrap());
/// cache.push(Tensor::zeros((1, 4, 6, 6), candle_core::DType::F32, &Device::Cpu).unwrap());
///
/// assert_eq!(cache.n_layers(), 2);
/// assert_eq!(cache.n_heads().unwrap(), 4);
/// assert_eq!(cache.seq_len().unwrap(), 6);
/// ```
#[derive(Debug)]
pub struct AttentionCache {
    /// Attention patterns per layer.
    patterns: Vec<Tensor>,
}

impl AttentionCache {
    /// Create an empty cache with capacity for `n_layers` layers.
    pub fn with_capacity(n_layers: usize) -> Self {
        Self {
            patterns: Vec::with_capacity(n_layers),
        }
    }

    /// Build a cache from per-layer patterns in model order.
    pub const fn from_patterns(patterns: Vec<Tensor>) -> Self {
        Self { patterns }
    }

    /// Add an attention pattern for the next layer.
    ///
    /// # Shapes
    ///
    /// - `pattern`: `[batch, heads, seq_q, seq_k]` or `[heads, seq_q, seq_k]`
    pub fn push(&mut self, pattern: Tensor) {
        self.patterns.push(pattern);
    }

    /// Number of cached layers.
    pub const fn n_layers(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the cache is empty.
    pub const fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Number of heads, read from the first layer.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::MissingAttention`] if the cache is empty or
    /// the first layer is malformed.
    pub fn n_heads(&self) -> Result<usize> {
        Ok(self.head_dims(0)?.0)
    }

    /// Sequence (key) length, read from the first layer.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::MissingAttention`] if the cache is empty or
    /// the first layer is malformed.
    pub fn seq_len(&self) -> Result<usize> {
        Ok(self.head_dims(0)?.2)
    }

    /// Check that the forward pass delivered real attention data.
    ///
    /// Every layer must have rank 3 or 4, a non-zero batch, the same
    /// `(heads, seq_q, seq_k)` as the first layer, and no zero-sized
    /// dimension. When `expected` is given as `(n_layers, n_heads)`, the
    /// cache must match it.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::MissingAttention`] describing the first
    /// violation found, or [`HeadScopeError::Shape`] if the patterns are not
    /// square (`seq_q != seq_k`).
    pub fn validate(&self, expected: Option<(usize, usize)>) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(HeadScopeError::MissingAttention(
                "forward pass returned no attention tensors".into(),
            ));
        }
        let first = self.head_dims(0)?;
        if first.1 != first.2 {
            return Err(HeadScopeError::Shape(format!(
                "self-attention must be square, got seq_q={} seq_k={}",
                first.1, first.2
            )));
        }
        for layer in 1..self.patterns.len() {
            let dims = self.head_dims(layer)?;
            if dims != first {
                return Err(HeadScopeError::MissingAttention(format!(
                    "layer {layer} has (heads, seq_q, seq_k) = {dims:?}, layer 0 has {first:?}"
                )));
            }
        }
        if let Some((n_layers, n_heads)) = expected {
            if self.patterns.len() != n_layers {
                return Err(HeadScopeError::MissingAttention(format!(
                    "expected {n_layers} attention layers, got {}",
                    self.patterns.len()
                )));
            }
            if first.0 != n_heads {
                return Err(HeadScopeError::MissingAttention(format!(
                    "expected {n_heads} attention heads, got {}",
                    first.0
                )));
            }
        }
        Ok(())
    }

    /// `(heads, seq_q, seq_k)` of one layer.
    fn head_dims(&self, layer: usize) -> Result<(usize, usize, usize)> {
        let pattern = self.patterns.get(layer).ok_or_else(|| {
            HeadScopeError::MissingAttention(format!("layer {layer} not in attention cache"))
        })?;
        let dims = match *pattern.dims() {
            [batch, heads, q, k] if batch > 0 => (heads, q, k),
            [heads, q, k] => (heads, q, k),
            _ => {
                return Err(HeadScopeError::MissingAttention(format!(
                    "layer {layer} attention has shape {:?}, expected [batch, heads, seq_q, seq_k]",
                    pattern.dims()
                )));
            }
        };
        if dims.0 == 0 || dims.1 == 0 || dims.2 == 0 {
            return Err(HeadScopeError::MissingAttention(format!(
                "layer {layer} attention is empty: {:?}",
                pattern.dims()
            )));
        }
        Ok(dims)
    }

    /// One layer's pattern as an F32 `[heads, seq_q, seq_k]` tensor (batch 0).
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::MissingAttention`] if the layer is absent or
    /// malformed, and [`HeadScopeError::Model`] on tensor failures.
    pub fn head_view(&self, layer: usize) -> Result<Tensor> {
        self.head_dims(layer)?;
        let pattern = self.patterns.get(layer).ok_or_else(|| {
            HeadScopeError::MissingAttention(format!("layer {layer} not in attention cache"))
        })?;
        // PROMOTE: scores are means and differences of weights; compute in F32
        let attn_f32 = pattern.to_dtype(DType::F32)?;
        if attn_f32.rank() == 4 {
            // narrow(dim=0, start=0, len=1) → [1, heads, seq_q, seq_k] → squeeze
            Ok(attn_f32.narrow(0, 0, 1)?.squeeze(0)?)
        } else {
            Ok(attn_f32)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use candle_core::Device;

    /// Single-layer cache with shape `[1, 2, 4, 4]`:
    /// - Head 0: uniform attention (0.25 everywhere)
    /// - Head 1: identity-like (diagonal = 0.7, off-diagonal = 0.1)
    fn sample_cache() -> AttentionCache {
        #[rustfmt::skip]
        let data: Vec<f32> = vec![
            // Head 0 (uniform)
            0.25, 0.25, 0.25, 0.25,
            0.25, 0.25, 0.25, 0.25,
            0.25, 0.25, 0.25, 0.25,
            0.25, 0.25, 0.25, 0.25,
            // Head 1 (diagonal-heavy)
            0.70, 0.10, 0.10, 0.10,
            0.10, 0.70, 0.10, 0.10,
            0.10, 0.10, 0.70, 0.10,
            0.10, 0.10, 0.10, 0.70,
        ];
        let tensor = Tensor::from_vec(data, (1, 2, 4, 4), &Device::Cpu).unwrap();
        AttentionCache::from_patterns(vec![tensor])
    }

    #[test]
    fn empty_cache_is_missing_attention() {
        let cache = AttentionCache::with_capacity(12);
        assert!(cache.is_empty());
        assert!(cache.validate(None).unwrap_err().is_missing_attention());
        assert!(cache.n_heads().unwrap_err().is_missing_attention());
    }

    #[test]
    fn dims_from_first_layer() {
        let cache = sample_cache();
        assert_eq!(cache.n_layers(), 1);
        assert_eq!(cache.n_heads().unwrap(), 2);
        assert_eq!(cache.seq_len().unwrap(), 4);
        cache.validate(Some((1, 2))).unwrap();
    }

    #[test]
    fn validate_rejects_wrong_counts() {
        let cache = sample_cache();
        assert!(cache.validate(Some((2, 2))).unwrap_err().is_missing_attention());
        assert!(cache.validate(Some((1, 4))).unwrap_err().is_missing_attention());
    }

    #[test]
    fn validate_rejects_zero_sized_layer() {
        let empty = Tensor::zeros((1, 2, 0, 0), DType::F32, &Device::Cpu).unwrap();
        let cache = AttentionCache::from_patterns(vec![empty]);
        assert!(cache.validate(None).unwrap_err().is_missing_attention());
    }

    #[test]
    fn validate_rejects_inconsistent_layers() {
        let mut cache = sample_cache();
        cache.push(Tensor::zeros((1, 3, 4, 4), DType::F32, &Device::Cpu).unwrap());
        assert!(cache.validate(None).unwrap_err().is_missing_attention());
    }

    #[test]
    fn validate_rejects_bad_rank() {
        let flat = Tensor::zeros((4, 4), DType::F32, &Device::Cpu).unwrap();
        let cache = AttentionCache::from_patterns(vec![flat]);
        assert!(cache.validate(None).unwrap_err().is_missing_attention());
    }

    #[test]
    fn validate_rejects_non_square() {
        let t = Tensor::zeros((1, 2, 1, 4), DType::F32, &Device::Cpu).unwrap();
        let cache = AttentionCache::from_patterns(vec![t]);
        assert!(matches!(cache.validate(None), Err(HeadScopeError::Shape(_))));
    }

    #[test]
    fn rank3_patterns_are_accepted() {
        let t = Tensor::zeros((3, 5, 5), DType::F32, &Device::Cpu).unwrap();
        let cache = AttentionCache::from_patterns(vec![t]);
        cache.validate(Some((1, 3))).unwrap();
        assert_eq!(cache.head_view(0).unwrap().dims(), &[3, 5, 5]);
    }

    #[test]
    fn head_view_drops_batch() {
        let cache = sample_cache();
        let view = cache.head_view(0).unwrap();
        assert_eq!(view.dims(), &[2, 4, 4]);
    }

    #[test]
    fn head_view_promotes_half_precision() {
        let cache = sample_cache();
        let f32_view = cache.head_view(0).unwrap();
        for dtype in [DType::BF16, DType::F16] {
            let half = f32_view.unsqueeze(0).unwrap().to_dtype(dtype).unwrap();
            let view = AttentionCache::from_patterns(vec![half]).head_view(0).unwrap();
            assert_eq!(view.dtype(), DType::F32);
            assert_eq!(view.dims(), &[2, 4, 4]);
            let rows: Vec<Vec<Vec<f32>>> = view.to_vec3().unwrap();
            // 0.25 is exact in both formats; 0.7 and 0.1 are within half-precision rounding
            assert_eq!(rows[0][1][2], 0.25);
            assert!((rows[1][3][3] - 0.70).abs() < 1e-2);
            assert!((rows[1][3][0] - 0.10).abs() < 1e-2);
        }
    }
}
