//! Units exchanged between searches and the aggregator.

use serde::{Deserialize, Serialize};

use crate::coa::Vector;

/// One partition's final answer. Also the wire payload in distributed mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialResult {
    /// Best position found by the partition.
    pub best_position: Vector,

    /// Fitness of `best_position`.
    pub best_fitness: f64,

    /// Per-iteration global reference fitness, length T.
    ///
    /// Older publishers name this field `globalConverge` or `globalCov`.
    #[serde(alias = "globalConverge", alias = "globalCov")]
    pub convergence: Vec<f64>,
}

impl PartialResult {
    pub fn new(best_position: Vector, best_fitness: f64, convergence: Vec<f64>) -> Self {
        Self {
            best_position,
            best_fitness,
            convergence,
        }
    }
}

/// The reduced answer of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    /// Minimum best fitness over all partitions.
    pub overall_best_fitness: f64,

    /// Position attaining `overall_best_fitness`.
    pub overall_best_position: Vector,

    /// Element-wise mean of the partitions' convergence traces.
    pub overall_convergence: Vec<f64>,
}
