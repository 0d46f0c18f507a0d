// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attention caching for scoring calls.
//!
//! - [`AttentionCache`] — per-layer post-softmax attention patterns.

mod attention;

pub use attention::AttentionCache;
