// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phrase-to-token-span resolution.
//!
//! A phrase is located in a tokenized sequence by exact, contiguous match of
//! its token ids. Matching is on ids rather than characters, so a phrase
//! whose standalone encoding differs from its in-context encoding (for
//! example a BPE leading-space merge) will not be found. That limitation is
//! kept for compatibility with existing score outputs.

/// A contiguous half-open range `[start, start + len)` of token positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenSpan {
    /// First covered position.
    pub start: usize,
    /// Number of covered positions.
    pub len: usize,
}

impl TokenSpan {
    /// One past the last covered position.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    /// Covered positions as a range.
    #[must_use]
    pub const fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end()
    }
}

/// Find every start index where `pattern_ids` occurs verbatim in `sequence_ids`.
///
/// Overlapping matches are all reported, in ascending order. An empty
/// pattern, or one longer than the sequence, matches nothing.
///
/// ```
/// use candle_headscope::find_spans;
///
/// assert_eq!(find_spans(&[1, 2, 1, 2, 1], &[1, 2, 1]), vec![0, 2]);
/// assert!(find_spans(&[1, 2, 3], &[]).is_empty());
/// ```
#[must_use]
pub fn find_spans(sequence_ids: &[u32], pattern_ids: &[u32]) -> Vec<usize> {
    if pattern_ids.is_empty() || pattern_ids.len() > sequence_ids.len() {
        return Vec::new();
    }
    sequence_ids
        .windows(pattern_ids.len())
        .enumerate()
        .filter(|(_, window)| *window == pattern_ids)
        .map(|(start, _)| start)
        .collect()
}

/// Resolve every occurrence of `pattern_ids` into a [`TokenSpan`].
#[must_use]
pub fn resolve_spans(sequence_ids: &[u32], pattern_ids: &[u32]) -> Vec<TokenSpan> {
    find_spans(sequence_ids, pattern_ids)
        .into_iter()
        .map(|start| TokenSpan {
            start,
            len: pattern_ids.len(),
        })
        .collect()
}
