//! Population initialization and partitioning.
//!
//! The population is split into `k` contiguous, near-equal slices. Each
//! slice is handed by value to one search so it is owned exclusively for
//! the duration of the run.

use rand::Rng;

use crate::coa::{Bounds, Population};
use crate::error::{CoaError, Result};

/// Samples `n` individuals uniformly inside `bounds`.
pub fn initialize_population<R: Rng>(
    n: usize,
    dim: usize,
    bounds: &Bounds,
    rng: &mut R,
) -> Population {
    (0..n).map(|_| bounds.sample(dim, rng)).collect()
}

/// Sizes of the `k` partitions of a population of `n`.
///
/// The first `n % k` partitions get one extra individual.
pub fn partition_sizes(n: usize, k: usize) -> Result<Vec<usize>> {
    if k == 0 {
        return Err(CoaError::invalid("partition count must be at least 1"));
    }
    if k > n {
        return Err(CoaError::invalid(format!(
            "partition count {k} exceeds population size {n}"
        )));
    }
    let base = n / k;
    let remainder = n % k;
    Ok((0..k)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect())
}

/// Splits `population` into `k` contiguous sub-populations, preserving
/// order.
///
/// # Examples
///
/// ```
/// use u_crayfish::partition::partition;
///
/// let population: Vec<Vec<f64>> = (0..7).map(|i| vec![i as f64]).collect();
/// let parts = partition(population, 3).unwrap();
/// let sizes: Vec<usize> = parts.iter().map(Vec::len).collect();
/// assert_eq!(sizes, vec![3, 2, 2]);
/// assert_eq!(parts[1][0], vec![3.0]);
/// ```
pub fn partition(population: Population, k: usize) -> Result<Vec<Population>> {
    let sizes = partition_sizes(population.len(), k)?;
    let mut rest = population.into_iter();
    Ok(sizes
        .into_iter()
        .map(|size| rest.by_ref().take(size).collect())
        .collect())
}
