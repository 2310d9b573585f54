//! Work units sent from the scattering side to remote workers.

use serde::{Deserialize, Serialize};

use crate::benchmark::{Benchmark, BenchmarkFunction};
use crate::coa::{CoaConfig, Population};
use crate::error::{CoaError, Result};

fn default_partitions() -> usize {
    1
}

fn default_iterations() -> usize {
    CoaConfig::default().max_iterations
}

/// One partition's search job.
///
/// The objective travels by registry name; the dimension is the width of
/// the sub-population. JSON keys are camelCase, and the capitalized names
/// `SubPopulation`, `Workers` and `F` used by older publishers are
/// accepted too.
///
/// # Examples
///
/// ```
/// use u_crayfish::benchmark::Benchmark;
/// use u_crayfish::transport::{TaskMessage, WireFormat};
///
/// let task = TaskMessage::from_json_str(
///     r#"{"SubPopulation": [[1.0, 2.0], [-3.0, 0.5]], "Workers": 4, "F": "F6"}"#,
/// )
/// .unwrap();
/// assert_eq!(task.partitions, 4);
/// assert_eq!(task.objective().unwrap().kind(), Benchmark::F6);
///
/// let bytes = WireFormat::Text.encode_task(&task).unwrap();
/// assert_eq!(WireFormat::Text.decode_task(&bytes).unwrap(), task);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessage {
    /// Index of the partition within its run.
    #[serde(default)]
    pub partition: usize,

    /// Number of partitions in the run (k).
    #[serde(default = "default_partitions", alias = "Workers")]
    pub partitions: usize,

    /// Registry identifier of the objective, e.g. `"F6"`.
    #[serde(alias = "F")]
    pub function: String,

    /// Iterations to run (T).
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Seed of the partition's generator; entropy when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// The individuals to search from.
    #[serde(alias = "SubPopulation")]
    pub sub_population: Population,
}

impl TaskMessage {
    /// Parses a JSON task and validates it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let task: TaskMessage =
            serde_json::from_str(json).map_err(|e| CoaError::Decode(e.to_string()))?;
        task.validate()?;
        Ok(task)
    }

    /// Dimension of the sub-population, 0 if it is empty.
    pub fn dim(&self) -> usize {
        self.sub_population.first().map_or(0, Vec::len)
    }

    /// Checks the shape of the job.
    pub fn validate(&self) -> Result<()> {
        if self.sub_population.is_empty() {
            return Err(CoaError::invalid("task carries an empty sub-population"));
        }
        let dim = self.dim();
        if dim == 0 {
            return Err(CoaError::invalid("task individuals must not be empty"));
        }
        if let Some(bad) = self.sub_population.iter().position(|x| x.len() != dim) {
            return Err(CoaError::invalid(format!(
                "task individual {bad} has dimension {}, expected {dim}",
                self.sub_population[bad].len()
            )));
        }
        if self.partitions == 0 || self.partition >= self.partitions {
            return Err(CoaError::invalid(format!(
                "task partition {} is outside 0..{}",
                self.partition, self.partitions
            )));
        }
        if self.iterations == 0 {
            return Err(CoaError::invalid("task iterations must be at least 1"));
        }
        Ok(())
    }

    /// Resolves the objective at the sub-population's dimension.
    pub fn objective(&self) -> Result<BenchmarkFunction> {
        self.function.parse::<Benchmark>()?.function_with_dim(self.dim())
    }

    /// Engine configuration for this job.
    pub fn coa_config(&self) -> CoaConfig {
        let config = CoaConfig::default().with_max_iterations(self.iterations);
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }
}
