//! Crayfish Optimization Algorithm with scatter/gather execution.
//!
//! A population is initialized inside the search bounds, split into `k`
//! partitions, each partition is optimized by its own COA search, and the
//! partial results are reduced into one best solution and one averaged
//! convergence trace.
//!
//! - [`coa`]: the search engine, bounds and the [`Objective`](coa::Objective) trait
//! - [`benchmark`]: the registered test functions (F1..F18)
//! - [`partition`]: population initialization and partitioning
//! - [`aggregate`]: partial/aggregate results and the reducing [`Aggregator`](aggregate::Aggregator)
//! - [`transport`]: producer/consumer roles, wire formats, an in-process
//!   stream and the gathering loop
//! - [`scatter`]: independent, coupled and distributed execution
//! - [`config`]: run parameters
//!
//! # Examples
//!
//! ```
//! use u_crayfish::config::RunConfig;
//! use u_crayfish::scatter::ScatterRunner;
//!
//! let config = RunConfig::default()
//!     .with_population_size(20)
//!     .with_partitions(4)
//!     .with_iterations(4)
//!     .with_function("F6")
//!     .with_dimension(3)
//!     .with_seed(1);
//! let objective = config.resolve().unwrap();
//! let result = ScatterRunner::run(&objective, &config).unwrap();
//! assert_eq!(result.aggregate.overall_convergence.len(), 4);
//! ```

pub mod aggregate;
pub mod benchmark;
pub mod coa;
pub mod config;
pub mod error;
pub mod partition;
pub mod scatter;
pub mod transport;

pub use error::{CoaError, Result};
