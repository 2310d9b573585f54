//! Classical benchmark objectives.
//!
//! Numbering follows the COA paper's test suite.
//!
//! # References
//!
//! - Yao, Liu & Lin (1999), "Evolutionary Programming Made Faster"
//! - Surjanovic & Bingham, *Virtual Library of Simulation Experiments*

use rand::Rng;
use std::f64::consts::{E, PI};

/// F1, sphere.
pub fn sphere(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

/// F2, Schwefel 2.22: `sum |x| + prod |x|`.
pub fn schwefel_2_22(x: &[f64]) -> f64 {
    let sum: f64 = x.iter().map(|v| v.abs()).sum();
    let product: f64 = x.iter().map(|v| v.abs()).product();
    sum + product
}

/// F3, Schwefel 1.2: sum of squared prefix sums.
pub fn schwefel_1_2(x: &[f64]) -> f64 {
    let mut prefix = 0.0;
    x.iter()
        .map(|v| {
            prefix += v;
            prefix * prefix
        })
        .sum()
}

/// F4, Schwefel 2.21: `max |x|`.
pub fn schwefel_2_21(x: &[f64]) -> f64 {
    x.iter().fold(0.0, |m: f64, v| m.max(v.abs()))
}

/// F5, Rosenbrock.
pub fn rosenbrock(x: &[f64]) -> f64 {
    x.windows(2)
        .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (w[0] - 1.0).powi(2))
        .sum()
}

/// F6, shifted step: `sum (|x + 0.5|)^2`.
pub fn step(x: &[f64]) -> f64 {
    x.iter().map(|v| (v + 0.5).abs().powi(2)).sum()
}

/// F7, quartic with noise: `sum i * x_i^4 + U(0, 1)`.
///
/// Randomized: draws its noise from the thread-local generator, so runs
/// using it are not reproducible even when seeded.
pub fn quartic_noise(x: &[f64]) -> f64 {
    let sum: f64 = x
        .iter()
        .enumerate()
        .map(|(i, v)| (i + 1) as f64 * v.powi(4))
        .sum();
    sum + rand::rng().random::<f64>()
}

/// F8, Schwefel variant: `-sum x sin(sqrt |x|)`.
pub fn schwefel(x: &[f64]) -> f64 {
    -x.iter().map(|v| v * v.abs().sqrt().sin()).sum::<f64>()
}

/// F9, Rastrigin.
pub fn rastrigin(x: &[f64]) -> f64 {
    10.0 * x.len() as f64
        + x.iter()
            .map(|v| v * v - 10.0 * (2.0 * PI * v).cos())
            .sum::<f64>()
}

/// F10, Ackley.
pub fn ackley(x: &[f64]) -> f64 {
    let n = x.len() as f64;
    let squares: f64 = x.iter().map(|v| v * v).sum();
    let cosines: f64 = x.iter().map(|v| (2.0 * PI * v).cos()).sum();
    -20.0 * (-0.2 * (squares / n).sqrt()).exp() - (cosines / n).exp() + 20.0 + E
}

/// F11, Griewank.
pub fn griewank(x: &[f64]) -> f64 {
    let squares: f64 = x.iter().map(|v| v * v).sum();
    let cosines: f64 = x
        .iter()
        .enumerate()
        .map(|(i, v)| (v / ((i + 1) as f64).sqrt()).cos())
        .product();
    squares / 4000.0 - cosines + 1.0
}

/// F16, six-hump camel back. Uses the first two components; shorter
/// inputs evaluate to `0.0`.
pub fn six_hump_camel(x: &[f64]) -> f64 {
    let [x1, x2] = match x {
        [a, b, ..] => [*a, *b],
        _ => return 0.0,
    };
    4.0 * x1.powi(2) - 2.1 * x1.powi(4) + x1.powi(6) / 3.0 + x1 * x2 - 4.0 * x2.powi(2)
        + 4.0 * x2.powi(4)
}

/// F17, Branin. Uses the first two components; shorter inputs evaluate
/// to `0.0`.
pub fn branin(x: &[f64]) -> f64 {
    let [x1, x2] = match x {
        [a, b, ..] => [*a, *b],
        _ => return 0.0,
    };
    let a = x2 - x1 * x1 * 5.1 / (4.0 * PI * PI) + (5.0 / PI) * x1 - 6.0;
    let b = 10.0 * (1.0 - 1.0 / (8.0 * PI)) * x1.cos() + 10.0;
    a * a + b
}

/// F18, Goldstein-Price. Uses the first two components; shorter inputs
/// evaluate to `0.0`.
pub fn goldstein_price(x: &[f64]) -> f64 {
    let [x1, x2] = match x {
        [a, b, ..] => [*a, *b],
        _ => return 0.0,
    };
    let a = 1.0
        + (x1 + x2 + 1.0).powi(2)
            * (19.0 - 14.0 * x1 + 3.0 * x1 * x1 - 14.0 * x2 + 6.0 * x1 * x2 + 3.0 * x2 * x2);
    let b = 30.0
        + (2.0 * x1 - 3.0 * x2).powi(2)
            * (18.0 - 32.0 * x1 + 12.0 * x1 * x1 + 48.0 * x2 - 36.0 * x1 * x2 + 27.0 * x2 * x2);
    a * b
}
