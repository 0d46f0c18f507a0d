// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concept masks: which sequence positions belong to a phrase group.
//!
//! A phrase list is an OR-group standing for one side of a contrast
//! (positives or negatives). [`build_mask`] resolves every phrase and unions
//! the covered positions into an [`InclusionMask`].

use crate::error::Result;
use crate::span::resolve_spans;
use crate::tokenizer::TextEncoder;

/// One boolean per sequence position; `true` when covered by a matched span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionMask {
    /// Per-position inclusion flags.
    flags: Vec<bool>,
}

impl InclusionMask {
    /// All-false mask of the given length.
    #[must_use]
    pub fn empty(len: usize) -> Self {
        Self {
            flags: vec![false; len],
        }
    }

    /// Wrap explicit per-position flags.
    #[must_use]
    pub const fn from_flags(flags: Vec<bool>) -> Self {
        Self { flags }
    }

    /// Sequence length the mask covers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether the mask covers zero positions (length zero).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Whether at least one position is included.
    #[must_use]
    pub fn any(&self) -> bool {
        self.flags.iter().any(|&f| f)
    }

    /// Number of included positions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    /// Whether `position` is included. Out-of-range positions are not.
    #[must_use]
    pub fn get(&self, position: usize) -> bool {
        self.flags.get(position).copied().unwrap_or(false)
    }

    /// Included positions in ascending order.
    #[must_use]
    pub fn positions(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
            .collect()
    }

    /// Raw flags.
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.flags
    }

    /// Mark `[start, end)` as included, clamped to the mask length.
    fn include(&mut self, range: std::ops::Range<usize>) {
        let end = range.end.min(self.flags.len());
        if let Some(slots) = self.flags.get_mut(range.start..end) {
            slots.fill(true);
        }
    }
}

/// Build the inclusion mask for a group of phrases over `sequence_ids`.
///
/// Each phrase is trimmed and blank phrases are skipped. The phrase is
/// encoded without special tokens, so it follows the same policy the full
/// text used for its non-special tokens. Phrases that match nothing
/// contribute nothing.
///
/// # Errors
///
/// Returns [`HeadScopeError::Tokenizer`](crate::HeadScopeError::Tokenizer)
/// if a phrase cannot be encoded.
pub fn build_mask<S, T>(sequence_ids: &[u32], phrases: &[S], tokenizer: &T) -> Result<InclusionMask>
where
    S: AsRef<str>,
    T: TextEncoder + ?Sized,
{
    let mut mask = InclusionMask::empty(sequence_ids.len());
    for phrase in phrases {
        let phrase = phrase.as_ref().trim();
        if phrase.is_empty() {
            continue;
        }
        let pattern_ids = tokenizer.encode_phrase(phrase)?;
        for span in resolve_spans(sequence_ids, &pattern_ids) {
            mask.include(span.range());
        }
    }
    Ok(mask)
}
