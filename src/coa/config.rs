//! COA engine configuration.

use crate::error::{CoaError, Result};

/// Configuration for a single COA search.
///
/// # Examples
///
/// ```
/// use u_crayfish::coa::CoaConfig;
///
/// let config = CoaConfig::default()
///     .with_max_iterations(200)
///     .with_seed(42);
/// assert_eq!(config.max_iterations, 200);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CoaConfig {
    /// Number of iterations (T). Also the length of the convergence trace.
    pub max_iterations: usize,

    /// Random seed for reproducibility.
    ///
    /// `None` draws a seed from entropy.
    pub seed: Option<u64>,
}

impl Default for CoaConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            seed: None,
        }
    }
}

impl CoaConfig {
    /// Sets the number of iterations.
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(CoaError::invalid("max_iterations must be at least 1"));
        }
        Ok(())
    }
}
