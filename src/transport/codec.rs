//! Wire encodings of [`PartialResult`].
//!
//! Two self-describing formats are supported:
//!
//! - **JSON**: `{"bestPosition":[..],"bestFitness":..,"convergence":[..]}`.
//!   Cannot carry `NaN`/`inf`; encoding such a result fails.
//! - **Text**: three `key=value` lines. Vectors are bracketed,
//!   space-separated tokens; floats use Rust's shortest round-trip form so
//!   every `f64`, including `NaN` and `inf`, survives exactly:
//!
//! ```text
//! bestPosition=[1.5 -2.0 0.25]
//! bestFitness=0.5
//! convergence=[3.0 2.0 1.0]
//! ```
//!
//! [`TaskMessage`]s use the same two formats. In text form scalars come
//! first and every individual of the sub-population is one
//! `individual=[..]` line, in order:
//!
//! ```text
//! partition=0
//! partitions=4
//! function=F6
//! iterations=500
//! seed=17
//! individual=[1.0 -3.5]
//! individual=[0.25 8.0]
//! ```

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::TaskMessage;
use crate::aggregate::PartialResult;
use crate::error::{CoaError, Result};

const KEY_POSITION: &str = "bestPosition";
const KEY_FITNESS: &str = "bestFitness";
const KEY_CONVERGENCE: &str = "convergence";
/// Older publishers' names for the convergence trace.
const CONVERGENCE_ALIASES: [&str; 2] = ["globalConverge", "globalCov"];

const KEY_PARTITION: &str = "partition";
const KEY_PARTITIONS: &str = "partitions";
const KEY_FUNCTION: &str = "function";
const KEY_ITERATIONS: &str = "iterations";
const KEY_SEED: &str = "seed";
const KEY_INDIVIDUAL: &str = "individual";

/// Payload encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// `serde_json` object.
    #[default]
    Json,
    /// Line-oriented `key=value` text.
    Text,
}

impl WireFormat {
    /// Encodes a result.
    ///
    /// # Examples
    ///
    /// ```
    /// use u_crayfish::aggregate::PartialResult;
    /// use u_crayfish::transport::WireFormat;
    ///
    /// let result = PartialResult::new(vec![1.5, -2.0], 0.5, vec![3.0, 1.0]);
    /// let bytes = WireFormat::Text.encode(&result).unwrap();
    /// assert_eq!(
    ///     String::from_utf8(bytes.clone()).unwrap(),
    ///     "bestPosition=[1.5 -2.0]\nbestFitness=0.5\nconvergence=[3.0 1.0]\n"
    /// );
    /// assert_eq!(WireFormat::Text.decode(&bytes).unwrap(), result);
    /// ```
    pub fn encode(self, result: &PartialResult) -> Result<Vec<u8>> {
        match self {
            WireFormat::Json => {
                let finite = result.best_fitness.is_finite()
                    && result.best_position.iter().all(|v| v.is_finite())
                    && result.convergence.iter().all(|v| v.is_finite());
                if !finite {
                    return Err(CoaError::invalid(
                        "json payloads cannot carry non-finite values; use the text format",
                    ));
                }
                serde_json::to_vec(result).map_err(|e| CoaError::invalid(e.to_string()))
            }
            WireFormat::Text => {
                let mut out = String::new();
                // Writing into a String cannot fail.
                let _ = writeln!(out, "{KEY_POSITION}={}", format_vector(&result.best_position));
                let _ = writeln!(out, "{KEY_FITNESS}={:?}", result.best_fitness);
                let _ = writeln!(out, "{KEY_CONVERGENCE}={}", format_vector(&result.convergence));
                Ok(out.into_bytes())
            }
        }
    }

    /// Decodes a payload. Fails with [`CoaError::Decode`].
    pub fn decode(self, payload: &[u8]) -> Result<PartialResult> {
        match self {
            WireFormat::Json => {
                serde_json::from_slice(payload).map_err(|e| CoaError::Decode(e.to_string()))
            }
            WireFormat::Text => {
                let text = std::str::from_utf8(payload)
                    .map_err(|e| CoaError::Decode(format!("payload is not utf-8: {e}")))?;
                decode_text(text)
            }
        }
    }
}

impl WireFormat {
    /// Encodes a task.
    pub fn encode_task(self, task: &TaskMessage) -> Result<Vec<u8>> {
        match self {
            WireFormat::Json => {
                if !task.sub_population.iter().flatten().all(|v| v.is_finite()) {
                    return Err(CoaError::invalid(
                        "json payloads cannot carry non-finite values; use the text format",
                    ));
                }
                serde_json::to_vec(task).map_err(|e| CoaError::invalid(e.to_string()))
            }
            WireFormat::Text => {
                let mut out = String::new();
                let _ = writeln!(out, "{KEY_PARTITION}={}", task.partition);
                let _ = writeln!(out, "{KEY_PARTITIONS}={}", task.partitions);
                let _ = writeln!(out, "{KEY_FUNCTION}={}", task.function);
                let _ = writeln!(out, "{KEY_ITERATIONS}={}", task.iterations);
                if let Some(seed) = task.seed {
                    let _ = writeln!(out, "{KEY_SEED}={seed}");
                }
                for individual in &task.sub_population {
                    let _ = writeln!(out, "{KEY_INDIVIDUAL}={}", format_vector(individual));
                }
                Ok(out.into_bytes())
            }
        }
    }

    /// Decodes and validates a task. Fails with [`CoaError::Decode`] on a
    /// malformed payload and [`CoaError::InvalidArgument`] on a
    /// well-formed but unusable one.
    pub fn decode_task(self, payload: &[u8]) -> Result<TaskMessage> {
        let task = match self {
            WireFormat::Json => serde_json::from_slice::<TaskMessage>(payload)
                .map_err(|e| CoaError::Decode(e.to_string()))?,
            WireFormat::Text => {
                let text = std::str::from_utf8(payload)
                    .map_err(|e| CoaError::Decode(format!("payload is not utf-8: {e}")))?;
                decode_task_text(text)?
            }
        };
        task.validate()?;
        Ok(task)
    }
}

impl FromStr for WireFormat {
    type Err = CoaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(WireFormat::Json),
            "text" => Ok(WireFormat::Text),
            other => Err(CoaError::invalid(format!("unknown wire format: {other}"))),
        }
    }
}

fn format_vector(values: &[f64]) -> String {
    let tokens: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
    format!("[{}]", tokens.join(" "))
}

fn parse_scalar(key: &str, token: &str) -> Result<f64> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|e| CoaError::Decode(format!("{key}: invalid number {token:?}: {e}")))
}

fn parse_vector(key: &str, value: &str) -> Result<Vec<f64>> {
    let inner = value
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| CoaError::Decode(format!("{key}: expected a bracketed vector")))?;
    inner
        .split_whitespace()
        .map(|token| parse_scalar(key, token))
        .collect()
}

fn decode_text(text: &str) -> Result<PartialResult> {
    let mut position = None;
    let mut fitness = None;
    let mut convergence = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| CoaError::Decode(format!("malformed line {line:?}")))?;
        let key = key.trim();
        let duplicate = match key {
            KEY_POSITION => position.replace(parse_vector(key, value)?).is_some(),
            KEY_FITNESS => fitness.replace(parse_scalar(key, value)?).is_some(),
            KEY_CONVERGENCE => convergence.replace(parse_vector(key, value)?).is_some(),
            k if CONVERGENCE_ALIASES.contains(&k) => {
                convergence.replace(parse_vector(key, value)?).is_some()
            }
            _ => false,
        };
        if duplicate {
            return Err(CoaError::Decode(format!("duplicate field {key}")));
        }
    }

    let missing = |key: &str| CoaError::Decode(format!("missing field {key}"));
    Ok(PartialResult::new(
        position.ok_or_else(|| missing(KEY_POSITION))?,
        fitness.ok_or_else(|| missing(KEY_FITNESS))?,
        convergence.ok_or_else(|| missing(KEY_CONVERGENCE))?,
    ))
}

fn parse_count<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| CoaError::Decode(format!("{key}: invalid integer {value:?}: {e}")))
}

fn decode_task_text(text: &str) -> Result<TaskMessage> {
    let mut partition = None;
    let mut partitions = None;
    let mut function = None;
    let mut iterations = None;
    let mut seed = None;
    let mut sub_population = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| CoaError::Decode(format!("malformed line {line:?}")))?;
        let key = key.trim();
        let duplicate = match key {
            KEY_PARTITION => partition.replace(parse_count(key, value)?).is_some(),
            KEY_PARTITIONS => partitions.replace(parse_count(key, value)?).is_some(),
            KEY_FUNCTION => function.replace(value.trim().to_string()).is_some(),
            KEY_ITERATIONS => iterations.replace(parse_count(key, value)?).is_some(),
            KEY_SEED => seed.replace(parse_count::<u64>(key, value)?).is_some(),
            KEY_INDIVIDUAL => {
                sub_population.push(parse_vector(key, value)?);
                false
            }
            _ => false,
        };
        if duplicate {
            return Err(CoaError::Decode(format!("duplicate field {key}")));
        }
    }

    let missing = |key: &str| CoaError::Decode(format!("missing field {key}"));
    Ok(TaskMessage {
        partition: partition.ok_or_else(|| missing(KEY_PARTITION))?,
        partitions: partitions.ok_or_else(|| missing(KEY_PARTITIONS))?,
        function: function.ok_or_else(|| missing(KEY_FUNCTION))?,
        iterations: iterations.ok_or_else(|| missing(KEY_ITERATIONS))?,
        seed,
        sub_population,
    })
}
