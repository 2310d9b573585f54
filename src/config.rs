//! Run-level configuration.
//!
//! [`RunConfig`] is what a caller (CLI flags, a JSON file, or an inbound
//! job message) supplies to start one scatter/gather run. The short keys
//! `n`, `k`, `t` and `f` are accepted as aliases so job payloads of the
//! form `{"n":20,"k":4,"t":4,"f":"F6"}` deserialize directly.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::benchmark::{Benchmark, BenchmarkFunction};
use crate::coa::CoaConfig;
use crate::error::{CoaError, Result};
use crate::transport::{WireFormat, DEFAULT_CHANNEL, DEFAULT_GROUP};

/// How partitions are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Each partition runs its full loop alone; one reduction at the end.
    #[default]
    Independent,
    /// Partitions share temperature, shade and the global best every
    /// iteration, separated by a barrier.
    Coupled,
    /// Partitions run on a worker pool and publish through a transport;
    /// results are gathered from a consumer.
    Distributed,
    /// Partitions are sent as task messages through a transport to
    /// workers, which publish their results back.
    Brokered,
}

impl FromStr for ExecutionMode {
    type Err = CoaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "independent" => Ok(ExecutionMode::Independent),
            "coupled" => Ok(ExecutionMode::Coupled),
            "distributed" => Ok(ExecutionMode::Distributed),
            "brokered" => Ok(ExecutionMode::Brokered),
            other => Err(CoaError::invalid(format!("unknown execution mode: {other}"))),
        }
    }
}

/// Parameters of one run.
///
/// # Examples
///
/// ```
/// use u_crayfish::config::RunConfig;
///
/// let config = RunConfig::from_json_str(r#"{"n": 20, "k": 4, "t": 4, "f": "F6"}"#).unwrap();
/// assert_eq!(config.population_size, 20);
/// assert_eq!(config.partitions, 4);
/// assert_eq!(config.iterations, 4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Total population size (N).
    #[serde(alias = "n")]
    pub population_size: usize,

    /// Number of partitions (k).
    #[serde(alias = "k")]
    pub partitions: usize,

    /// Iterations per search (T).
    #[serde(alias = "t")]
    pub iterations: usize,

    /// Benchmark identifier, e.g. `"F6"`.
    #[serde(alias = "f")]
    pub function: String,

    /// Dimension override for scalable functions.
    pub dimension: Option<usize>,

    /// Master seed. Partition seeds are derived from it.
    pub seed: Option<u64>,

    /// Channel (stream) name for distributed runs.
    pub channel: String,

    /// Consumer-group name for distributed runs.
    pub group: String,

    /// Consumer identity within the group.
    pub consumer: String,

    /// Worker-pool size. `None` uses one worker per partition.
    pub workers: Option<usize>,

    /// Gather deadline in milliseconds.
    pub timeout_ms: u64,

    /// Payload encoding.
    pub format: WireFormat,

    /// Execution mode.
    pub mode: ExecutionMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            partitions: 4,
            iterations: 500,
            function: Benchmark::F6.name().to_string(),
            dimension: None,
            seed: None,
            channel: DEFAULT_CHANNEL.to_string(),
            group: DEFAULT_GROUP.to_string(),
            consumer: uuid::Uuid::new_v4().to_string(),
            workers: None,
            timeout_ms: 30_000,
            format: WireFormat::Json,
            mode: ExecutionMode::Independent,
        }
    }
}

impl RunConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoaError::invalid(format!("run config: {e}")))
    }

    /// Reads and parses a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoaError::invalid(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn with_population_size(mut self, n: usize) -> Self {
        self.population_size = n;
        self
    }

    pub fn with_partitions(mut self, k: usize) -> Self {
        self.partitions = k;
        self
    }

    pub fn with_iterations(mut self, t: usize) -> Self {
        self.iterations = t;
        self
    }

    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.function = name.into();
        self
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = Some(dim);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Effective worker-pool size.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or(self.partitions)
    }

    /// Gather deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Engine configuration for a partition run with `seed`.
    pub fn coa_config(&self, seed: u64) -> CoaConfig {
        CoaConfig::default()
            .with_max_iterations(self.iterations)
            .with_seed(seed)
    }

    /// Checks the numeric parameters.
    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(CoaError::invalid("population size must be at least 1"));
        }
        if self.partitions == 0 || self.partitions > self.population_size {
            return Err(CoaError::invalid(format!(
                "partition count must be in 1..={}, got {}",
                self.population_size, self.partitions
            )));
        }
        if self.iterations == 0 {
            return Err(CoaError::invalid("iterations must be at least 1"));
        }
        if self.worker_count() == 0 {
            return Err(CoaError::invalid("worker count must be at least 1"));
        }
        if self.timeout_ms == 0 {
            return Err(CoaError::invalid("timeout must be positive"));
        }
        Ok(())
    }

    /// Looks up the benchmark function at the requested dimension.
    pub fn resolve(&self) -> Result<BenchmarkFunction> {
        let kind: Benchmark = self.function.parse()?;
        match self.dimension {
            Some(dim) => kind.function_with_dim(dim),
            None => Ok(kind.function()),
        }
    }
}
