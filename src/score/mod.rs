// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attention-head scoring variants.
//!
//! - [`score`] — concept contrast (positives minus negatives) per head.
//! - [`pair_score`] — the raw weight between two token positions per head.
//! - [`all_pairs`] — [`pair_score`] for every ordered pair at once.

mod all_pairs;
mod concept;
mod matrix;
mod pair;

pub use all_pairs::{AllPairsScores, TokenMapMode, all_pairs};
pub use concept::{ScoreMode, last_token_index, score};
pub use matrix::{HeadScoreMatrix, TokenPair};
pub use pair::{check_index, pair_score};
