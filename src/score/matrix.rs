// SPDX-License-Identifier: MIT OR Apache-2.0

//! Score containers shared by every scoring variant.

use serde::Serialize;

/// One scalar per `(layer, head)`; layers outer, heads inner.
///
/// Order is the order the attention tensor was produced in. It is the
/// contract with the visualization layer and is never sorted or permuted.
/// Serializes as a nested JSON array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HeadScoreMatrix {
    rows: Vec<Vec<f32>>,
}

impl HeadScoreMatrix {
    /// Wrap per-layer rows of per-head scores.
    #[must_use]
    pub const fn new(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    /// Number of layers.
    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.rows.len()
    }

    /// Number of heads (of the first layer; every layer has the same count).
    #[must_use]
    pub fn n_heads(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Score of one head, if it exists.
    #[must_use]
    pub fn get(&self, layer: usize, head: usize) -> Option<f32> {
        self.rows.get(layer)?.get(head).copied()
    }

    /// Per-layer rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Consume into per-layer rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Vec<f32>> {
        self.rows
    }

    /// Iterate over `(layer, head, score)` in layer-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.rows.iter().enumerate().flat_map(|(layer, heads)| {
            heads
                .iter()
                .enumerate()
                .map(move |(head, &score)| (layer, head, score))
        })
    }

    /// Mean over the heads of one layer, `None` if the layer is absent or
    /// has no heads.
    #[must_use]
    pub fn layer_mean(&self, layer: usize) -> Option<f32> {
        let heads = self.rows.get(layer)?;
        mean(heads.iter().copied())
    }

    /// Mean over every layer and head, `None` when the matrix is empty.
    #[must_use]
    pub fn overall_mean(&self) -> Option<f32> {
        mean(self.iter().map(|(_, _, score)| score))
    }

    /// Whether every score is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.iter().all(|(_, _, score)| score.is_finite())
    }
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0_f64, 0_u32), |(sum, count), v| {
        (sum + f64::from(v), count + 1)
    });
    if count == 0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    let mean = (sum / f64::from(count)) as f32;
    Some(mean)
}

/// An ordered `(source, destination)` token pair.
///
/// `src` is the attending (query) token and `dst` the attended-to (key)
/// token. `(a, b)` and `(b, a)` are different pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenPair {
    /// Query position.
    pub src: usize,
    /// Key position.
    pub dst: usize,
}

impl TokenPair {
    /// Create a pair.
    #[must_use]
    pub const fn new(src: usize, dst: usize) -> Self {
        Self { src, dst }
    }

    /// The `"{src}_{dst}"` key used by the visualization client.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}_{}", self.src, self.dst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn sample() -> HeadScoreMatrix {
        HeadScoreMatrix::new(vec![vec![0.1, 0.3], vec![0.5, 0.7]])
    }

    #[test]
    fn shape_and_lookup() {
        let m = sample();
        assert_eq!(m.n_layers(), 2);
        assert_eq!(m.n_heads(), 2);
        assert_eq!(m.get(1, 0), Some(0.5));
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.get(0, 2), None);
    }

    #[test]
    fn iteration_is_layer_major() {
        let order: Vec<(usize, usize)> = sample().iter().map(|(l, h, _)| (l, h)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn reductions() {
        let m = sample();
        assert!((m.layer_mean(0).unwrap() - 0.2).abs() < 1e-6);
        assert!((m.layer_mean(1).unwrap() - 0.6).abs() < 1e-6);
        assert!((m.overall_mean().unwrap() - 0.4).abs() < 1e-6);
        assert_eq!(m.layer_mean(9), None);
        assert_eq!(HeadScoreMatrix::new(Vec::new()).overall_mean(), None);
    }

    #[test]
    fn serializes_as_nested_array() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, "[[0.1,0.3],[0.5,0.7]]");
    }

    #[test]
    fn pair_key_format() {
        assert_eq!(TokenPair::new(3, 0).key(), "3_0");
        assert!(TokenPair::new(0, 5) < TokenPair::new(1, 0));
    }

    #[test]
    fn finiteness() {
        assert!(sample().is_finite());
        assert!(!HeadScoreMatrix::new(vec![vec![f32::NAN]]).is_finite());
    }
}
