//! COA execution loop.
//!
//! # Algorithm
//!
//! 1. Evaluate the population; the best individual seeds both the local
//!    best and the global reference.
//! 2. At each iteration `t`:
//!    a. Cooling coefficient `C = 2 - t/T`, temperature `U(20, 35)`
//!    b. Shade (cave) point `(X_best + X_global) / 2`, food `X_best`
//!    c. Per individual: summer resort or competition when hot
//!       (`temp > 30`), otherwise foraging with food-size dependent intake
//!    d. Clamp candidates into the bounds
//!    e. Global reference = best candidate of this iteration
//!    f. Greedy per-individual acceptance, local best update
//! 3. Stop after `T` iterations.
//!
//! # Reference
//!
//! Jia, H., Rao, H., Wen, C., Mirjalili, S. (2023). "Crayfish optimization
//! algorithm", *Artificial Intelligence Review* 56, 1919-1979.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::config::CoaConfig;
use super::types::{improves, intake, Objective, Population, Vector};
use crate::aggregate::PartialResult;
use crate::error::{CoaError, Result};

/// Temperature above which crayfish avoid foraging.
const HOT_THRESHOLD: f64 = 30.0;

/// Iterations between progress log lines.
const LOG_INTERVAL: usize = 50;

/// Result of a COA run on one (sub-)population.
#[derive(Debug, Clone)]
pub struct CoaResult {
    /// Best position found.
    pub best_position: Vector,

    /// Fitness of the best position.
    pub best_fitness: f64,

    /// Per-iteration global reference fitness (best candidate of each
    /// iteration). Not necessarily monotone.
    pub convergence: Vec<f64>,

    /// Best fitness at the end of each iteration. Non-increasing.
    pub best_history: Vec<f64>,

    /// Number of iterations executed.
    pub iterations: usize,

    /// Number of objective evaluations, including food evaluations.
    pub evaluations: usize,

    /// Whether the run stopped early on its cancellation token. The
    /// traces then cover only the iterations completed.
    pub cancelled: bool,
}

impl From<CoaResult> for PartialResult {
    fn from(result: CoaResult) -> Self {
        PartialResult::new(result.best_position, result.best_fitness, result.convergence)
    }
}

/// Per-iteration parameters shared by every individual of the population.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepContext<'s> {
    /// Cooling coefficient `C`.
    pub coefficient: f64,
    /// Sampled temperature.
    pub temperature: f64,
    /// Shade (cave) attractor.
    pub shade: &'s [f64],
    /// Initial food position; each proposal works on its own copy.
    pub food: &'s [f64],
}

/// Cooling coefficient `C = 2 - t/T`.
#[inline]
pub(crate) fn cooling_coefficient(t: usize, max_iterations: usize) -> f64 {
    2.0 - t as f64 / max_iterations as f64
}

/// Samples the ambient temperature from `U(20, 35)`.
#[inline]
pub(crate) fn sample_temperature<R: Rng>(rng: &mut R) -> f64 {
    rng.random::<f64>() * 15.0 + 20.0
}

/// Element-wise midpoint of two positions.
pub(crate) fn midpoint(a: &[f64], b: &[f64]) -> Vector {
    a.iter().zip(b.iter()).map(|(x, y)| (x + y) / 2.0).collect()
}

/// Mutable state of one partition's search.
///
/// Owns its population and random stream exclusively. Shared only through
/// the values it exposes at synchronization points.
pub(crate) struct SearchState<'a, O: Objective + ?Sized, R: Rng> {
    objective: &'a O,
    population: Population,
    fitness: Vec<f64>,
    candidates: Population,
    candidate_fitness: Vec<f64>,
    best_position: Vector,
    best_fitness: f64,
    global_position: Vector,
    global_fitness: f64,
    convergence: Vec<f64>,
    best_history: Vec<f64>,
    evaluations: usize,
    rng: R,
}

impl<'a, O: Objective + ?Sized, R: Rng> SearchState<'a, O, R> {
    /// Evaluates `population` and initializes the best bookkeeping.
    pub fn new(population: Population, objective: &'a O, rng: R) -> Result<Self> {
        if population.is_empty() {
            return Err(CoaError::invalid("population must not be empty"));
        }
        let dim = objective.dim();
        objective.bounds().validate_for(dim)?;
        if let Some(bad) = population.iter().position(|x| x.len() != dim) {
            return Err(CoaError::invalid(format!(
                "individual {bad} has dimension {}, objective expects {dim}",
                population[bad].len()
            )));
        }

        let fitness: Vec<f64> = population.iter().map(|x| objective.evaluate(x)).collect();

        let mut best_idx = 0;
        for (i, &f) in fitness.iter().enumerate().skip(1) {
            if improves(f, fitness[best_idx]) {
                best_idx = i;
            }
        }
        let best_position = population[best_idx].clone();
        let best_fitness = fitness[best_idx];

        let n = population.len();
        Ok(Self {
            objective,
            candidates: vec![vec![0.0; dim]; n],
            candidate_fitness: vec![f64::INFINITY; n],
            global_position: best_position.clone(),
            global_fitness: best_fitness,
            best_position,
            best_fitness,
            convergence: Vec::new(),
            best_history: Vec::new(),
            evaluations: n,
            fitness,
            population,
            rng,
        })
    }

    /// Runs one full, self-contained iteration.
    pub fn step(&mut self, t: usize, max_iterations: usize) {
        let coefficient = cooling_coefficient(t, max_iterations);
        let temperature = sample_temperature(&mut self.rng);
        let shade = midpoint(&self.best_position, &self.global_position);
        let food = self.best_position.clone();

        self.propose(&StepContext {
            coefficient,
            temperature,
            shade: &shade,
            food: &food,
        });
        self.refresh_global_from_candidates();
        self.accept();
        self.record(self.global_fitness);
    }

    /// Appends one iteration's entries to the convergence and best traces.
    pub fn record(&mut self, global_fitness: f64) {
        self.convergence.push(global_fitness);
        self.best_history.push(self.best_fitness);
    }

    /// Fills the candidate buffer with repaired, evaluated proposals.
    pub fn propose(&mut self, ctx: &StepContext<'_>) {
        let n = self.population.len();
        let dim = self.objective.dim();
        let p = intake(ctx.temperature);
        let mut food = ctx.food.to_vec();

        for i in 0..n {
            let x = &self.population[i];
            let next = &mut self.candidates[i];

            if ctx.temperature > HOT_THRESHOLD {
                if self.rng.random::<f64>() < 0.5 {
                    // Summer resort: drift toward the cave.
                    for j in 0..dim {
                        next[j] =
                            x[j] + ctx.coefficient * self.rng.random::<f64>() * (ctx.shade[j] - x[j]);
                    }
                } else {
                    // Competition for the cave against a random peer.
                    for j in 0..dim {
                        let z = self.rng.random_range(0..n);
                        next[j] = x[j] - self.population[z][j] + ctx.shade[j];
                    }
                }
            } else {
                let food_fitness = self.objective.evaluate(&food);
                self.evaluations += 1;
                let size = 3.0 * self.rng.random::<f64>() * self.fitness[i] / food_fitness;

                if size > 2.0 {
                    // Food too large: shred it, then forage with a
                    // sinusoidal claw motion.
                    let decay = (-1.0 / size).exp();
                    for j in 0..dim {
                        food[j] *= decay;
                        let a = (2.0 * std::f64::consts::PI * self.rng.random::<f64>()).cos();
                        let b = (2.0 * std::f64::consts::PI * self.rng.random::<f64>()).sin();
                        next[j] = x[j] + a * food[j] * p - b * food[j] * p;
                    }
                } else {
                    for j in 0..dim {
                        next[j] = (x[j] - food[j]) * p + p * self.rng.random::<f64>() * x[j];
                    }
                }
            }
        }

        let bounds = self.objective.bounds();
        for (next, f) in self.candidates.iter_mut().zip(self.candidate_fitness.iter_mut()) {
            bounds.clamp(next);
            *f = self.objective.evaluate(next);
        }
        self.evaluations += n;
    }

    /// Resets the global reference to candidate 0, then scans for the best
    /// candidate of this iteration.
    ///
    /// The previous global reference is discarded even if it was better.
    pub fn refresh_global_from_candidates(&mut self) {
        let mut idx = 0;
        for i in 1..self.candidates.len() {
            if improves(self.candidate_fitness[i], self.candidate_fitness[idx]) {
                idx = i;
            }
        }
        self.global_fitness = self.candidate_fitness[idx];
        self.global_position.copy_from_slice(&self.candidates[idx]);
    }

    /// Greedy acceptance: an individual moves only if its candidate is
    /// strictly better. Returns the number of accepted moves.
    pub fn accept(&mut self) -> usize {
        let mut accepted = 0;
        for i in 0..self.population.len() {
            let f = self.candidate_fitness[i];
            if improves(f, self.fitness[i]) {
                self.population[i].copy_from_slice(&self.candidates[i]);
                self.fitness[i] = f;
                accepted += 1;
                if improves(f, self.best_fitness) {
                    self.best_fitness = f;
                    self.best_position.copy_from_slice(&self.population[i]);
                }
            }
        }
        accepted
    }

    /// Index and fitness of the best candidate in the current buffer.
    pub fn best_candidate(&self) -> (usize, f64) {
        let mut idx = 0;
        for i in 1..self.candidate_fitness.len() {
            if improves(self.candidate_fitness[i], self.candidate_fitness[idx]) {
                idx = i;
            }
        }
        (idx, self.candidate_fitness[idx])
    }

    pub fn candidate(&self, i: usize) -> &[f64] {
        &self.candidates[i]
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn fitness(&self) -> &[f64] {
        &self.fitness
    }

    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    pub fn best_position(&self) -> &[f64] {
        &self.best_position
    }

    pub fn into_result(self) -> CoaResult {
        CoaResult {
            iterations: self.convergence.len(),
            best_position: self.best_position,
            best_fitness: self.best_fitness,
            convergence: self.convergence,
            best_history: self.best_history,
            evaluations: self.evaluations,
            cancelled: false,
        }
    }
}

/// Executes COA on a single population.
pub struct CoaRunner;

impl CoaRunner {
    /// Runs COA on `population`.
    ///
    /// # Examples
    ///
    /// ```
    /// use u_crayfish::benchmark::Benchmark;
    /// use u_crayfish::coa::{CoaConfig, CoaRunner, Objective};
    /// use u_crayfish::partition::initialize_population;
    /// use rand::SeedableRng;
    ///
    /// let f6 = Benchmark::F6.function_with_dim(5).unwrap();
    /// let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    /// let population = initialize_population(10, f6.dim(), f6.bounds(), &mut rng);
    ///
    /// let config = CoaConfig::default().with_max_iterations(20).with_seed(42);
    /// let result = CoaRunner::run(population, &f6, &config).unwrap();
    /// assert_eq!(result.convergence.len(), 20);
    /// assert!(result.best_fitness >= 0.0);
    /// ```
    pub fn run<O: Objective + ?Sized>(
        population: Population,
        objective: &O,
        config: &CoaConfig,
    ) -> Result<CoaResult> {
        Self::run_with_cancel(population, objective, config, None)
    }

    /// Runs COA with an optional cancellation token.
    ///
    /// The flag is checked at the start of every iteration. A cancelled
    /// run returns the best found so far with `cancelled` set.
    pub fn run_with_cancel<O: Objective + ?Sized>(
        population: Population,
        objective: &O,
        config: &CoaConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<CoaResult> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        Self::run_with_rng(population, objective, config.max_iterations, rng, cancel)
    }

    /// Runs COA drawing every random number from `rng`.
    pub fn run_with_rng<O: Objective + ?Sized, R: Rng>(
        population: Population,
        objective: &O,
        max_iterations: usize,
        rng: R,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<CoaResult> {
        if max_iterations == 0 {
            return Err(CoaError::invalid("max_iterations must be at least 1"));
        }
        let mut state = SearchState::new(population, objective, rng)?;
        let mut cancelled = false;

        for t in 0..max_iterations {
            if let Some(ref flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    cancelled = true;
                    break;
                }
            }

            state.step(t, max_iterations);

            if (t + 1) % LOG_INTERVAL == 0 {
                debug!(
                    objective = objective.name(),
                    iteration = t + 1,
                    best_fitness = state.best_fitness(),
                    "coa progress"
                );
            }
        }

        let mut result = state.into_result();
        if cancelled {
            debug!(
                objective = objective.name(),
                iterations = result.iterations,
                "coa cancelled"
            );
        }
        result.cancelled = cancelled;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coa::Bounds;
    use std::sync::atomic::AtomicUsize;
    use crate::partition::initialize_population;

    struct Shifted {
        bounds: Bounds,
        dim: usize,
    }

    impl Objective for Shifted {
        fn dim(&self) -> usize {
            self.dim
        }
        fn bounds(&self) -> &Bounds {
            &self.bounds
        }
        fn evaluate(&self, x: &[f64]) -> f64 {
            x.iter().map(|v| (v + 0.5).powi(2)).sum()
        }
    }

    fn shifted(dim: usize) -> Shifted {
        Shifted {
            bounds: Bounds::uniform(-100.0, 100.0).unwrap(),
            dim,
        }
    }

    fn population(objective: &Shifted, n: usize, seed: u64) -> Population {
        let mut rng = StdRng::seed_from_u64(seed);
        initialize_population(n, objective.dim, &objective.bounds, &mut rng)
    }

    #[test]
    fn test_improves_on_initial_population() {
        let f = shifted(5);
        let pop = population(&f, 20, 1);
        let initial_best = pop
            .iter()
            .map(|x| f.evaluate(x))
            .fold(f64::INFINITY, f64::min);

        let config = CoaConfig::default().with_max_iterations(200).with_seed(42);
        let result = CoaRunner::run(pop, &f, &config).unwrap();

        assert!(
            result.best_fitness < initial_best * 0.1,
            "expected an order of magnitude improvement over {initial_best}, got {}",
            result.best_fitness
        );
        assert!((f.evaluate(&result.best_position) - result.best_fitness).abs() < 1e-9);
    }

    #[test]
    fn test_best_history_non_increasing() {
        let f = shifted(4);
        let config = CoaConfig::default().with_max_iterations(100).with_seed(3);
        let result = CoaRunner::run(population(&f, 12, 2), &f, &config).unwrap();

        assert_eq!(result.best_history.len(), 100);
        for window in result.best_history.windows(2) {
            assert!(
                window[1] <= window[0],
                "best fitness regressed: {} > {}",
                window[1],
                window[0]
            );
        }
        assert_eq!(*result.best_history.last().unwrap(), result.best_fitness);
    }

    #[test]
    fn test_convergence_length_and_lower_bound() {
        let f = shifted(3);
        let config = CoaConfig::default().with_max_iterations(30).with_seed(5);
        let result = CoaRunner::run(population(&f, 8, 4), &f, &config).unwrap();

        assert_eq!(result.convergence.len(), 30);
        assert_eq!(result.iterations, 30);
        // The global reference is a candidate of the same iteration, so it
        // can never beat the best-so-far recorded at that iteration.
        for (g, b) in result.convergence.iter().zip(result.best_history.iter()) {
            assert!(g >= b);
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let f = shifted(6);
        let config = CoaConfig::default().with_max_iterations(40).with_seed(11);
        let a = CoaRunner::run(population(&f, 10, 8), &f, &config).unwrap();
        let b = CoaRunner::run(population(&f, 10, 8), &f, &config).unwrap();

        assert_eq!(a.best_position, b.best_position);
        assert_eq!(a.best_fitness, b.best_fitness);
        assert_eq!(a.convergence, b.convergence);
    }

    #[test]
    fn test_candidates_stay_in_bounds_every_iteration() {
        let f = Shifted {
            bounds: Bounds::per_dimension(vec![-1.0, 0.0, -3.0], vec![1.0, 2.0, 3.0]).unwrap(),
            dim: 3,
        };
        let pop = population(&f, 15, 21);
        let mut state = SearchState::new(pop, &f, StdRng::seed_from_u64(9)).unwrap();

        for t in 0..60 {
            state.step(t, 60);
            for i in 0..15 {
                assert!(f.bounds.contains(state.candidate(i)));
                assert!(f.bounds.contains(&state.population()[i]));
            }
        }
    }

    #[test]
    fn test_fitness_cache_matches_population() {
        let f = shifted(2);
        let pop = population(&f, 6, 30);
        let mut state = SearchState::new(pop, &f, StdRng::seed_from_u64(1)).unwrap();
        for t in 0..20 {
            state.step(t, 20);
        }
        for (x, &fx) in state.population().iter().zip(state.fitness()) {
            assert!((f.evaluate(x) - fx).abs() < 1e-12);
        }
    }

    #[test]
    fn test_single_individual_population() {
        let f = shifted(2);
        let config = CoaConfig::default().with_max_iterations(10).with_seed(1);
        let result = CoaRunner::run(population(&f, 1, 2), &f, &config).unwrap();
        assert_eq!(result.convergence.len(), 10);
    }

    #[test]
    fn test_rejects_empty_and_misshaped_population() {
        let f = shifted(3);
        let config = CoaConfig::default().with_max_iterations(5);
        assert!(matches!(
            CoaRunner::run(Vec::new(), &f, &config),
            Err(CoaError::InvalidArgument(_))
        ));
        assert!(matches!(
            CoaRunner::run(vec![vec![0.0; 2]], &f, &config),
            Err(CoaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_cancellation() {
        let f = shifted(3);
        let config = CoaConfig::default().with_max_iterations(1000).with_seed(1);
        let pop = population(&f, 5, 1);
        let initial_best = pop
            .iter()
            .map(|x| f.evaluate(x))
            .fold(f64::INFINITY, f64::min);
        // Set before running so cancellation is deterministic.
        let cancel = Arc::new(AtomicBool::new(true));
        let result = CoaRunner::run_with_cancel(pop, &f, &config, Some(cancel)).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.iterations, 0);
        assert!(result.convergence.is_empty());
        assert_eq!(result.best_fitness, initial_best);
    }

    /// Raises its cancellation flag once `limit` evaluations have run.
    struct CancelsAfter {
        inner: Shifted,
        calls: AtomicUsize,
        limit: usize,
        flag: Arc<AtomicBool>,
    }

    impl Objective for CancelsAfter {
        fn dim(&self) -> usize {
            self.inner.dim
        }
        fn bounds(&self) -> &Bounds {
            &self.inner.bounds
        }
        fn evaluate(&self, x: &[f64]) -> f64 {
            if self.calls.fetch_add(1, Ordering::Relaxed) + 1 >= self.limit {
                self.flag.store(true, Ordering::Relaxed);
            }
            self.inner.evaluate(x)
        }
    }

    #[test]
    fn test_cancellation_mid_run_keeps_progress() {
        let flag = Arc::new(AtomicBool::new(false));
        let f = CancelsAfter {
            inner: shifted(3),
            calls: AtomicUsize::new(0),
            limit: 200,
            flag: Arc::clone(&flag),
        };
        let pop = population(&f.inner, 10, 3);
        let config = CoaConfig::default().with_max_iterations(1000).with_seed(9);
        let result = CoaRunner::run_with_cancel(pop, &f, &config, Some(flag)).unwrap();

        assert!(result.cancelled);
        assert!(result.iterations > 0 && result.iterations < 1000);
        assert_eq!(result.convergence.len(), result.iterations);
        assert_eq!(result.best_history.len(), result.iterations);
        assert_eq!(result.best_history.last().copied(), Some(result.best_fitness));
        assert!(!CoaRunner::run(population(&f.inner, 10, 3), &f.inner, &config)
            .unwrap()
            .cancelled);
    }

    /// An objective whose bounds were built without the checked constructors.
    struct Unchecked {
        bounds: Bounds,
    }

    impl Objective for Unchecked {
        fn dim(&self) -> usize {
            2
        }
        fn bounds(&self) -> &Bounds {
            &self.bounds
        }
        fn evaluate(&self, x: &[f64]) -> f64 {
            x.iter().map(|v| v * v).sum()
        }
    }

    #[test]
    fn test_malformed_bounds_are_rejected_not_panicking() {
        let pop = vec![vec![0.0, 0.0], vec![0.5, -0.5]];
        let config = CoaConfig::default().with_max_iterations(5).with_seed(1);

        let ragged = Unchecked {
            bounds: Bounds::PerDimension {
                lower: vec![-1.0, -1.0],
                upper: vec![1.0],
            },
        };
        assert!(matches!(
            CoaRunner::run(pop.clone(), &ragged, &config),
            Err(CoaError::InvalidArgument(_))
        ));

        let inverted = Unchecked {
            bounds: Bounds::Uniform {
                lower: 5.0,
                upper: -5.0,
            },
        };
        assert!(matches!(
            CoaRunner::run(pop, &inverted, &config),
            Err(CoaError::InvalidArgument(_))
        ));
    }

    struct NanEverywhere {
        bounds: Bounds,
    }

    impl Objective for NanEverywhere {
        fn dim(&self) -> usize {
            2
        }
        fn bounds(&self) -> &Bounds {
            &self.bounds
        }
        fn evaluate(&self, x: &[f64]) -> f64 {
            if x[0] > 0.0 {
                f64::NAN
            } else {
                x[0].abs() + x[1].abs()
            }
        }
    }

    #[test]
    fn test_nan_never_becomes_best() {
        let f = NanEverywhere {
            bounds: Bounds::uniform(-1.0, 1.0).unwrap(),
        };
        let pop = vec![vec![0.5, 0.5], vec![-0.5, 0.5], vec![0.9, -0.1]];
        let config = CoaConfig::default().with_max_iterations(50).with_seed(4);
        let result = CoaRunner::run(pop, &f, &config).unwrap();
        assert!(!result.best_fitness.is_nan());
        assert!(result.best_history.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_partial_result_conversion() {
        let f = shifted(2);
        let config = CoaConfig::default().with_max_iterations(5).with_seed(1);
        let result = CoaRunner::run(population(&f, 4, 1), &f, &config).unwrap();
        let expected_fitness = result.best_fitness;
        let partial: PartialResult = result.into();
        assert_eq!(partial.best_fitness, expected_fitness);
        assert_eq!(partial.convergence.len(), 5);
    }

    #[test]
    fn test_cooling_and_temperature() {
        assert_eq!(cooling_coefficient(0, 10), 2.0);
        assert!((cooling_coefficient(5, 10) - 1.5).abs() < 1e-15);
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..1000 {
            let t = sample_temperature(&mut rng);
            assert!((20.0..35.0).contains(&t));
        }
    }
}
