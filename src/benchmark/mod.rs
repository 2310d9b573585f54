//! Benchmark objective functions.
//!
//! A closed registry maps identifiers (`"F1"` .. `"F18"`) to a
//! [`BenchmarkFunction`]: the function plus its dimension and bounds,
//! resolved once at configuration time. Unknown identifiers fail with
//! [`CoaError::UnknownFunction`](crate::CoaError::UnknownFunction).

pub mod functions;
mod registry;

pub use registry::{Benchmark, BenchmarkFunction, DEFAULT_DIM};
