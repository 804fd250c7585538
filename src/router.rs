//! Deterministic key-to-shard routing.
//!
//! Provides the stable mapping from cache keys to shard indices used by
//! [`Cache`](crate::Cache).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Shard Routing Flow                       │
//! │                                                             │
//! │   "user-123"                                                │
//! │       │                                                     │
//! │       ▼                                                     │
//! │   ┌─────────────────────────────────────────────────┐       │
//! │   │  ShardRouter { shards: 4, seed }                │       │
//! │   │                                                 │       │
//! │   │  1. Create DefaultHasher                        │       │
//! │   │  2. Hash seed                                   │       │
//! │   │  3. Hash key bytes                              │       │
//! │   │  4. finish() % 4                                │       │
//! │   └─────────────────────────────────────────────────┘       │
//! │       │                                                     │
//! │       ▼                                                     │
//! │   ┌─────────┬─────────┬─────────┬─────────┐                 │
//! │   │ Shard 0 │ Shard 1 │ Shard 2 │ Shard 3 │                 │
//! │   └─────────┴─────────┴─────────┴─────────┘                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Properties
//! ──────────
//! - Deterministic: the same `(key, seed, shards)` always yields the same
//!   shard, so an entry is always read from the shard it was written to.
//! - Uniform: for realistic key populations each shard receives its
//!   proportional share to within a few percent.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maps string keys onto a fixed number of shards with a seeded hash.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ShardRouter {
    shards: usize,
    seed: u64,
}

impl ShardRouter {
    /// Creates a router for `shards` shards. The shard count is clamped to
    /// at least 1.
    pub(crate) fn new(shards: usize, seed: u64) -> Self {
        Self {
            shards: shards.max(1),
            seed,
        }
    }

    /// Returns the number of shards.
    pub(crate) fn shard_count(&self) -> usize {
        self.shards
    }

    /// Maps a key to a shard index in `[0, shards)`.
    pub(crate) fn shard_for_key(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards
    }
}
