//! Crayfish Optimization Algorithm (COA).
//!
//! A population-based metaheuristic modelling crayfish summer-resort,
//! competition and foraging behaviour. Temperature decides the phase:
//! above 30 degrees individuals move toward (or fight for) a cave between
//! the local and global best; otherwise they forage around the best
//! position with an intake that depends on food size and temperature.
//!
//! Users implement [`Objective`] (or use a registered
//! [`BenchmarkFunction`](crate::benchmark::BenchmarkFunction)) and call
//! [`CoaRunner::run`] on an initial population.
//!
//! # References
//!
//! - Jia, Rao, Wen & Mirjalili (2023), "Crayfish optimization algorithm",
//!   *Artificial Intelligence Review* 56, 1919-1979.

mod config;
mod runner;
mod types;

pub use config::CoaConfig;
pub use runner::{CoaResult, CoaRunner};
pub use types::{improves, intake, Bounds, Objective, Population, Vector};

pub(crate) use runner::{cooling_coefficient, midpoint, sample_temperature, SearchState, StepContext};
