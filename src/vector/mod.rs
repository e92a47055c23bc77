// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Vector index
// Exact cosine search over (embedding, chunk) pairs with disk persistence

pub mod index;

pub use index::{ScoredChunk, VectorIndex};
