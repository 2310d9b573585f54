//! Execution of a partitioned run.
//!
//! [`ScatterRunner`] initializes one population, partitions it, searches
//! every partition and reduces the partial results. Three modes are
//! provided:
//!
//! - **independent**: each partition runs its whole loop as a rayon task;
//!   one reduction at the end
//! - **coupled**: partitions advance in lockstep, sharing temperature,
//!   shade, food and a lock-guarded best slot; a barrier separates
//!   iterations
//! - **distributed**: a [`WorkerPool`] runs the searches and publishes each
//!   result through a [`Producer`](crate::transport::Producer) while the
//!   caller gathers them from a [`Consumer`](crate::transport::Consumer)
//! - **brokered**: partitions travel as
//!   [`TaskMessage`](crate::transport::TaskMessage)s to workers running
//!   [`serve`], possibly in other processes, which publish results back
//!
//! Every partition draws from its own `StdRng`, seeded from the run's
//! master seed, so seeded runs are reproducible regardless of scheduling.

mod runner;
mod serve;
mod worker;

pub use runner::{ScatterResult, ScatterRunner};
pub use serve::{execute_task, serve, ServeOptions, ServeStats};
pub use worker::WorkerPool;
