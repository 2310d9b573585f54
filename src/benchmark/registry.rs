//! Name-to-function registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::functions;
use crate::coa::{Bounds, Objective};
use crate::error::{CoaError, Result};

/// Default dimension of the scalable benchmarks.
pub const DEFAULT_DIM: usize = 30;

/// The closed set of registered benchmark functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Benchmark {
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F16,
    F17,
    F18,
}

impl Benchmark {
    /// Every registered function, in suite order.
    pub const ALL: [Benchmark; 14] = [
        Benchmark::F1,
        Benchmark::F2,
        Benchmark::F3,
        Benchmark::F4,
        Benchmark::F5,
        Benchmark::F6,
        Benchmark::F7,
        Benchmark::F8,
        Benchmark::F9,
        Benchmark::F10,
        Benchmark::F11,
        Benchmark::F16,
        Benchmark::F17,
        Benchmark::F18,
    ];

    /// Registry identifier (`"F6"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Benchmark::F1 => "F1",
            Benchmark::F2 => "F2",
            Benchmark::F3 => "F3",
            Benchmark::F4 => "F4",
            Benchmark::F5 => "F5",
            Benchmark::F6 => "F6",
            Benchmark::F7 => "F7",
            Benchmark::F8 => "F8",
            Benchmark::F9 => "F9",
            Benchmark::F10 => "F10",
            Benchmark::F11 => "F11",
            Benchmark::F16 => "F16",
            Benchmark::F17 => "F17",
            Benchmark::F18 => "F18",
        }
    }

    /// Short description.
    pub fn description(self) -> &'static str {
        match self {
            Benchmark::F1 => "sphere",
            Benchmark::F2 => "Schwefel 2.22",
            Benchmark::F3 => "Schwefel 1.2",
            Benchmark::F4 => "Schwefel 2.21",
            Benchmark::F5 => "Rosenbrock",
            Benchmark::F6 => "shifted step",
            Benchmark::F7 => "quartic with noise (randomized)",
            Benchmark::F8 => "Schwefel",
            Benchmark::F9 => "Rastrigin",
            Benchmark::F10 => "Ackley",
            Benchmark::F11 => "Griewank",
            Benchmark::F16 => "six-hump camel back",
            Benchmark::F17 => "Branin",
            Benchmark::F18 => "Goldstein-Price",
        }
    }

    /// Whether the dimension can be chosen freely.
    pub fn is_scalable(self) -> bool {
        !matches!(self, Benchmark::F16 | Benchmark::F17 | Benchmark::F18)
    }

    /// Whether evaluation draws random noise.
    pub fn is_randomized(self) -> bool {
        self == Benchmark::F7
    }

    /// Dimension used when none is requested.
    pub fn default_dim(self) -> usize {
        if self.is_scalable() {
            DEFAULT_DIM
        } else {
            2
        }
    }

    /// Search-space bounds.
    pub fn bounds(self) -> Bounds {
        let (lower, upper) = match self {
            Benchmark::F1 | Benchmark::F3 | Benchmark::F4 | Benchmark::F6 => (-100.0, 100.0),
            Benchmark::F2 => (-10.0, 10.0),
            Benchmark::F5 => (-30.0, 30.0),
            Benchmark::F7 => (-1.28, 1.28),
            Benchmark::F8 => (-500.0, 500.0),
            Benchmark::F9 => (-5.12, 5.12),
            Benchmark::F10 => (-32.0, 32.0),
            Benchmark::F11 => (-600.0, 600.0),
            Benchmark::F16 => (-5.0, 5.0),
            Benchmark::F18 => (-2.0, 2.0),
            Benchmark::F17 => {
                return Bounds::PerDimension {
                    lower: vec![-5.0, 0.0],
                    upper: vec![10.0, 15.0],
                }
            }
        };
        Bounds::Uniform { lower, upper }
    }

    /// Evaluates the raw function.
    pub fn evaluate(self, x: &[f64]) -> f64 {
        match self {
            Benchmark::F1 => functions::sphere(x),
            Benchmark::F2 => functions::schwefel_2_22(x),
            Benchmark::F3 => functions::schwefel_1_2(x),
            Benchmark::F4 => functions::schwefel_2_21(x),
            Benchmark::F5 => functions::rosenbrock(x),
            Benchmark::F6 => functions::step(x),
            Benchmark::F7 => functions::quartic_noise(x),
            Benchmark::F8 => functions::schwefel(x),
            Benchmark::F9 => functions::rastrigin(x),
            Benchmark::F10 => functions::ackley(x),
            Benchmark::F11 => functions::griewank(x),
            Benchmark::F16 => functions::six_hump_camel(x),
            Benchmark::F17 => functions::branin(x),
            Benchmark::F18 => functions::goldstein_price(x),
        }
    }

    /// Resolves the function at its default dimension.
    pub fn function(self) -> BenchmarkFunction {
        BenchmarkFunction {
            kind: self,
            dim: self.default_dim(),
            bounds: self.bounds(),
        }
    }

    /// Resolves the function at dimension `dim`.
    ///
    /// Fixed-dimension functions only accept their own dimension.
    pub fn function_with_dim(self, dim: usize) -> Result<BenchmarkFunction> {
        if dim == 0 {
            return Err(CoaError::invalid("dimension must be at least 1"));
        }
        if !self.is_scalable() && dim != self.default_dim() {
            return Err(CoaError::invalid(format!(
                "{} is fixed at dimension {}, got {dim}",
                self.name(),
                self.default_dim()
            )));
        }
        Ok(BenchmarkFunction {
            kind: self,
            dim,
            bounds: self.bounds(),
        })
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Benchmark {
    type Err = CoaError;

    /// Case-insensitive lookup by identifier.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Benchmark::ALL
            .iter()
            .copied()
            .find(|b| b.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CoaError::UnknownFunction(s.to_string()))
    }
}

/// A resolved benchmark: function, dimension and bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkFunction {
    kind: Benchmark,
    dim: usize,
    bounds: Bounds,
}

impl BenchmarkFunction {
    /// Looks up `name` in the registry at its default dimension.
    ///
    /// # Examples
    ///
    /// ```
    /// use u_crayfish::benchmark::BenchmarkFunction;
    /// use u_crayfish::coa::Objective;
    ///
    /// let f6 = BenchmarkFunction::lookup("F6").unwrap();
    /// assert_eq!(f6.dim(), 30);
    /// assert!(BenchmarkFunction::lookup("F99").is_err());
    /// ```
    pub fn lookup(name: &str) -> Result<Self> {
        Ok(name.parse::<Benchmark>()?.function())
    }

    pub fn kind(&self) -> Benchmark {
        self.kind
    }
}

impl Objective for BenchmarkFunction {
    fn dim(&self) -> usize {
        self.dim
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn evaluate(&self, x: &[f64]) -> f64 {
        self.kind.evaluate(x)
    }

    fn name(&self) -> &str {
        self.kind.name()
    }
}
