//! Reduction of independently produced partial results.
//!
//! Each partition's search yields a [`PartialResult`]. The [`Aggregator`]
//! folds exactly `k` of them into one [`AggregateResult`]:
//!
//! - best fitness/position: true minimum over partitions (first on ties)
//! - convergence: element-wise arithmetic mean over partitions
//!
//! The reduction is commutative, so arrival order does not matter. It does
//! not de-duplicate: folding the same result twice counts it twice.

mod aggregator;
mod types;

pub use aggregator::{reduce, Aggregator};
pub use types::{AggregateResult, PartialResult};
