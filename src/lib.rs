// SPDX-License-Identifier: MIT OR Apache-2.0

//! # candle-headscope
//!
//! Per-layer, per-head attention scoring for causal language models, built
//! on [candle](https://github.com/huggingface/candle).
//!
//! Given the attention patterns of one forward pass, candle-headscope
//! reduces them to small score matrices for visualization:
//!
//! - **Concept contrast** — how much more a query position attends to
//!   tokens of "positive" phrases than to tokens of "negative" phrases
//!   ([`score()`], [`AttentionProbe::head_scores`]).
//! - **Token pair** — the raw weight from one token to another
//!   ([`pair_score`], [`AttentionProbe::pair_scores`]).
//! - **All pairs** — every ordered pair at once, for token maps
//!   ([`all_pairs`], [`AttentionProbe::all_pair_scores`]).
//!
//! The engine is stateless: models and tokenizers come in through the
//! [`AttentionBackend`] and [`TextEncoder`] traits, and attention tensors are
//! borrowed for the duration of one call.

#![deny(warnings)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod mask;
pub mod probe;
pub mod score;
pub mod span;
pub mod tokenizer;

pub use cache::AttentionCache;
pub use config::ModelRegistry;
pub use error::{HeadScopeError, IndexRole, Result};
pub use mask::{InclusionMask, build_mask};
pub use probe::{AllPairsOutput, AttentionBackend, AttentionProbe, ProbeOutput, ViewMode, ViewRequest};
pub use score::{
    AllPairsScores, HeadScoreMatrix, ScoreMode, TokenMapMode, TokenPair, all_pairs, pair_score,
    score,
};
pub use span::{TokenSpan, find_spans, resolve_spans};
pub use tokenizer::{Encoded, HeadScopeTokenizer, TextEncoder};
