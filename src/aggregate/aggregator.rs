//! Running aggregation state.

use tracing::debug;

use super::types::{AggregateResult, PartialResult};
use crate::coa::improves;
use crate::error::{CoaError, Result};

/// Folds partial results one at a time.
///
/// Keeps only the running minimum and the running convergence sum, plus
/// the folded results themselves so an incomplete run can report them.
///
/// # Examples
///
/// ```
/// use u_crayfish::aggregate::{Aggregator, PartialResult};
///
/// let mut agg = Aggregator::new(2);
/// agg.fold(PartialResult::new(vec![1.0], 3.0, vec![5.0, 3.0])).unwrap();
/// agg.fold(PartialResult::new(vec![2.0], 1.0, vec![4.0, 1.0])).unwrap();
///
/// let result = agg.finish().unwrap();
/// assert_eq!(result.overall_best_fitness, 1.0);
/// assert_eq!(result.overall_best_position, vec![2.0]);
/// assert_eq!(result.overall_convergence, vec![4.5, 2.0]);
/// ```
#[derive(Debug, Clone)]
pub struct Aggregator {
    expected: usize,
    horizon: Option<usize>,
    best: Option<(f64, Vec<f64>)>,
    convergence_sum: Vec<f64>,
    folded: Vec<PartialResult>,
}

impl Aggregator {
    /// Creates an aggregator waiting for `expected` results. The trace
    /// length is taken from the first folded result.
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            horizon: None,
            best: None,
            convergence_sum: Vec::new(),
            folded: Vec::with_capacity(expected),
        }
    }

    /// Creates an aggregator that also requires every trace to have
    /// exactly `iterations` entries.
    pub fn with_horizon(expected: usize, iterations: usize) -> Self {
        Self {
            horizon: Some(iterations),
            convergence_sum: vec![0.0; iterations],
            ..Self::new(expected)
        }
    }

    /// Number of results the aggregation waits for.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Number of results folded so far.
    pub fn received(&self) -> usize {
        self.folded.len()
    }

    /// Whether `expected` results have been folded.
    pub fn is_complete(&self) -> bool {
        self.folded.len() >= self.expected
    }

    /// Folds one result into the running state.
    ///
    /// Fails with [`CoaError::ShapeMismatch`] if its trace length differs
    /// from the horizon; the state is left untouched in that case.
    pub fn fold(&mut self, result: PartialResult) -> Result<()> {
        let len = result.convergence.len();
        match self.horizon {
            Some(expected) if expected != len => {
                return Err(CoaError::ShapeMismatch {
                    expected,
                    actual: len,
                });
            }
            Some(_) => {}
            None => {
                self.horizon = Some(len);
                self.convergence_sum = vec![0.0; len];
            }
        }

        for (sum, v) in self.convergence_sum.iter_mut().zip(&result.convergence) {
            *sum += v;
        }

        let replace = match &self.best {
            None => true,
            Some((best, _)) => improves(result.best_fitness, *best),
        };
        if replace {
            self.best = Some((result.best_fitness, result.best_position.clone()));
        }

        self.folded.push(result);
        debug!(
            received = self.folded.len(),
            expected = self.expected,
            "folded partial result"
        );
        Ok(())
    }

    /// Produces the aggregate.
    ///
    /// Fails with [`CoaError::Incomplete`] (carrying the folded results)
    /// when fewer than `expected` results were folded.
    pub fn finish(self) -> Result<AggregateResult> {
        self.finish_with_partials().map(|(aggregate, _)| aggregate)
    }

    /// Like [`finish`](Self::finish), but also hands back the folded
    /// results in the order they were folded.
    pub fn finish_with_partials(self) -> Result<(AggregateResult, Vec<PartialResult>)> {
        if self.folded.len() < self.expected || self.expected == 0 {
            return Err(CoaError::Incomplete {
                expected: self.expected,
                gathered: self.folded,
            });
        }

        let count = self.folded.len() as f64;
        let (overall_best_fitness, overall_best_position) = self
            .best
            .unwrap_or((f64::INFINITY, Vec::new()));
        let aggregate = AggregateResult {
            overall_best_fitness,
            overall_best_position,
            overall_convergence: self.convergence_sum.iter().map(|s| s / count).collect(),
        };
        Ok((aggregate, self.folded))
    }

    /// Gives up on the remaining results and returns what was folded.
    pub fn into_gathered(self) -> Vec<PartialResult> {
        self.folded
    }
}

/// Reduces exactly `expected` results.
///
/// Fails with [`CoaError::Incomplete`] if `results` holds fewer, and with
/// [`CoaError::ShapeMismatch`] if the traces differ in length.
pub fn reduce(results: Vec<PartialResult>, expected: usize) -> Result<AggregateResult> {
    if results.len() > expected {
        return Err(CoaError::invalid(format!(
            "received {} results, expected {expected}",
            results.len()
        )));
    }
    let mut aggregator = Aggregator::new(expected);
    for result in results {
        aggregator.fold(result)?;
    }
    aggregator.finish()
}
