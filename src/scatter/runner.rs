//! Scatter/gather drivers for the three execution modes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::serve::{serve, ServeOptions, ServeStats};
use super::worker::WorkerPool;
use crate::aggregate::{reduce, AggregateResult, PartialResult};
use crate::coa::{
    cooling_coefficient, improves, midpoint, sample_temperature, CoaRunner, Objective, Population,
    SearchState, StepContext, Vector,
};
use crate::config::{ExecutionMode, RunConfig};
use crate::error::Result;
use crate::partition::{initialize_population, partition};
use crate::transport::{
    gather_partials, publish, publish_task, Consumer, GatherOptions, MemoryStream, Producer,
    TaskMessage,
};

/// Outcome of a scatter/gather run.
#[derive(Debug, Clone)]
pub struct ScatterResult {
    /// Reduced answer.
    pub aggregate: AggregateResult,

    /// Per-partition results: in partition order for the in-process
    /// modes, in arrival order for the transported ones.
    pub partials: Vec<PartialResult>,
}

/// One partition's work unit.
#[derive(Debug, Clone)]
pub(crate) struct PartitionTask {
    pub population: Population,
    pub seed: u64,
}

/// Initializes the population and splits it into seeded partition tasks.
///
/// A master `StdRng` (from `config.seed`, or entropy) draws the initial
/// population first, then one seed per partition.
///
/// The master generator is returned for draws shared by all partitions.
pub(crate) fn prepare<O: Objective + ?Sized>(
    objective: &O,
    config: &RunConfig,
) -> Result<(Vec<PartitionTask>, StdRng)> {
    config.validate()?;
    objective.bounds().validate_for(objective.dim())?;

    let mut master = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::seed_from_u64(rand::random()),
    };
    let population = initialize_population(
        config.population_size,
        objective.dim(),
        objective.bounds(),
        &mut master,
    );
    let tasks = partition(population, config.partitions)?
        .into_iter()
        .map(|population| PartitionTask {
            population,
            seed: master.random(),
        })
        .collect();
    Ok((tasks, master))
}

/// One coupled iteration of a single partition: propose, publish the best
/// candidate into the shared slot, accept.
fn coupled_step<O: Objective + ?Sized>(
    state: &mut SearchState<'_, O, StdRng>,
    ctx: &StepContext<'_>,
    slot: &Mutex<(f64, Vector)>,
) {
    state.propose(ctx);
    let (idx, fitness) = state.best_candidate();
    {
        let mut best = slot.lock();
        if improves(fitness, best.0) {
            best.0 = fitness;
            best.1.copy_from_slice(state.candidate(idx));
        }
    }
    state.accept();
}

/// Gather parameters for a run whose results travel through a transport.
fn gather_options(config: &RunConfig, abort: &Arc<AtomicBool>) -> GatherOptions {
    GatherOptions::new(config.partitions)
        .with_timeout(config.timeout())
        .with_iterations(config.iterations)
        .with_cancel(Arc::clone(abort))
}

fn search<O: Objective + ?Sized>(
    objective: &O,
    config: &RunConfig,
    index: usize,
    task: PartitionTask,
) -> Result<PartialResult> {
    debug!(
        partition = index,
        size = task.population.len(),
        "partition search started"
    );
    let result = CoaRunner::run(task.population, objective, &config.coa_config(task.seed))?;
    debug!(
        partition = index,
        best_fitness = result.best_fitness,
        evaluations = result.evaluations,
        "partition search finished"
    );
    Ok(result.into())
}

/// Drives a run in one of the [`ExecutionMode`]s.
///
/// # Examples
///
/// ```
/// use u_crayfish::config::RunConfig;
/// use u_crayfish::scatter::ScatterRunner;
///
/// let config = RunConfig::default()
///     .with_population_size(20)
///     .with_partitions(4)
///     .with_iterations(10)
///     .with_dimension(3)
///     .with_seed(7);
/// let f6 = config.resolve().unwrap();
///
/// let result = ScatterRunner::run_independent(&f6, &config).unwrap();
/// assert_eq!(result.partials.len(), 4);
/// assert_eq!(result.aggregate.overall_convergence.len(), 10);
/// ```
pub struct ScatterRunner;

impl ScatterRunner {
    /// Runs the mode selected in `config`.
    ///
    /// Distributed mode uses an in-process [`MemoryStream`] named after
    /// `config.channel`. Brokered mode ships tasks by registry name, so it
    /// searches `config.function` and does not consult `objective`.
    pub fn run<O: Objective + ?Sized>(objective: &O, config: &RunConfig) -> Result<ScatterResult> {
        match config.mode {
            ExecutionMode::Independent => Self::run_independent(objective, config),
            ExecutionMode::Coupled => Self::run_coupled(objective, config),
            ExecutionMode::Distributed => {
                let stream = MemoryStream::new(config.channel.clone());
                let mut consumer = stream.consumer(config.group.clone(), config.consumer.clone());
                let result = Self::run_distributed(objective, config, &stream.producer(), &mut consumer);
                stream.close();
                result
            }
            ExecutionMode::Brokered => Self::run_brokered_local(config),
        }
    }

    /// Partitions, searches every partition to completion on its own, and
    /// reduces once.
    pub fn run_independent<O: Objective + ?Sized>(
        objective: &O,
        config: &RunConfig,
    ) -> Result<ScatterResult> {
        let (tasks, _) = prepare(objective, config)?;
        info!(
            function = objective.name(),
            population = config.population_size,
            partitions = tasks.len(),
            iterations = config.iterations,
            "independent run started"
        );

        #[cfg(feature = "parallel")]
        let outcomes: Vec<Result<PartialResult>> = tasks
            .into_par_iter()
            .enumerate()
            .map(|(index, task)| search(objective, config, index, task))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<Result<PartialResult>> = tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| search(objective, config, index, task))
            .collect();

        let partials = outcomes.into_iter().collect::<Result<Vec<_>>>()?;
        let aggregate = reduce(partials.clone(), config.partitions)?;
        info!(
            best_fitness = aggregate.overall_best_fitness,
            "independent run finished"
        );
        Ok(ScatterResult {
            aggregate,
            partials,
        })
    }

    /// Runs all partitions in lockstep.
    ///
    /// Every iteration draws one temperature and coefficient for all
    /// partitions and derives shade and food from the shared best and the
    /// shared global reference. Partitions then propose, publish their best
    /// candidate into the shared best slot and accept in parallel. After the
    /// barrier the global reference is rescanned over every partition's
    /// population, starting from the first individual of the first
    /// partition, and recorded as the iteration's convergence value.
    ///
    /// The aggregate's convergence is that shared trace; its best is the
    /// shared slot.
    pub fn run_coupled<O: Objective + ?Sized>(
        objective: &O,
        config: &RunConfig,
    ) -> Result<ScatterResult> {
        let (tasks, mut master) = prepare(objective, config)?;
        let max_iterations = config.iterations;
        info!(
            function = objective.name(),
            population = config.population_size,
            partitions = tasks.len(),
            iterations = max_iterations,
            "coupled run started"
        );

        let mut states = tasks
            .into_iter()
            .map(|task| {
                SearchState::new(task.population, objective, StdRng::seed_from_u64(task.seed))
            })
            .collect::<Result<Vec<_>>>()?;

        let (mut best_fitness, mut best_position) = (f64::INFINITY, Vector::new());
        for state in &states {
            if best_position.is_empty() || improves(state.best_fitness(), best_fitness) {
                best_fitness = state.best_fitness();
                best_position = state.best_position().to_vec();
            }
        }
        let slot = Mutex::new((best_fitness, best_position));
        let mut global = slot.lock().1.clone();
        let mut convergence = Vec::with_capacity(max_iterations);

        for t in 0..max_iterations {
            let coefficient = cooling_coefficient(t, max_iterations);
            let temperature = sample_temperature(&mut master);
            let food = slot.lock().1.clone();
            let shade = midpoint(&food, &global);
            let ctx = StepContext {
                coefficient,
                temperature,
                shade: &shade,
                food: &food,
            };

            #[cfg(feature = "parallel")]
            states
                .par_iter_mut()
                .for_each(|state| coupled_step(state, &ctx, &slot));
            #[cfg(not(feature = "parallel"))]
            states
                .iter_mut()
                .for_each(|state| coupled_step(state, &ctx, &slot));

            // Barrier passed: rescan populations in partition order.
            let mut global_fitness = states[0].fitness()[0];
            global.copy_from_slice(&states[0].population()[0]);
            for state in &states {
                for (x, &f) in state.population().iter().zip(state.fitness()) {
                    if improves(f, global_fitness) {
                        global_fitness = f;
                        global.copy_from_slice(x);
                    }
                }
            }
            for state in &mut states {
                state.record(global_fitness);
            }
            convergence.push(global_fitness);

            if (t + 1) % 50 == 0 {
                debug!(
                    iteration = t + 1,
                    global_fitness,
                    best_fitness = slot.lock().0,
                    "coupled progress"
                );
            }
        }

        let (overall_best_fitness, overall_best_position) = slot.into_inner();
        let partials: Vec<PartialResult> = states
            .into_iter()
            .map(|state| state.into_result().into())
            .collect();
        info!(best_fitness = overall_best_fitness, "coupled run finished");
        Ok(ScatterResult {
            aggregate: AggregateResult {
                overall_best_fitness,
                overall_best_position,
                overall_convergence: convergence,
            },
            partials,
        })
    }

    /// Runs partitions on a worker pool that publishes each result through
    /// `producer`, while this thread gathers them from `consumer`.
    ///
    /// A failed search or publish is reported back from the pool; it stops
    /// the gather and becomes the run's error. Otherwise the gather ends
    /// with the aggregate, or [`CoaError::Incomplete`](crate::CoaError::Incomplete)
    /// at the deadline.
    pub fn run_distributed<O, P, C>(
        objective: &O,
        config: &RunConfig,
        producer: &P,
        consumer: &mut C,
    ) -> Result<ScatterResult>
    where
        O: Objective + ?Sized,
        P: Producer + ?Sized,
        C: Consumer + ?Sized,
    {
        let (tasks, _) = prepare(objective, config)?;
        let pool = WorkerPool::new(config.worker_count())?;
        info!(
            function = objective.name(),
            partitions = tasks.len(),
            workers = pool.size(),
            channel = %config.channel,
            group = %config.group,
            consumer = %config.consumer,
            "distributed run started"
        );

        let abort = Arc::new(AtomicBool::new(false));
        let options = gather_options(config, &abort);

        let (gathered, outcomes) = thread::scope(|scope| {
            let scatter = scope.spawn(|| {
                let outcomes = pool.execute(tasks, |index, task| {
                    let partial = search(objective, config, index, task)?;
                    if let Err(e) = publish(producer, config.format, &partial) {
                        warn!(partition = index, error = %e, "failed to publish partial result");
                        return Err(e);
                    }
                    Ok(partial)
                });
                let failed = match &outcomes {
                    Ok(results) => results.iter().any(|r| r.is_err()),
                    Err(_) => true,
                };
                if failed {
                    abort.store(true, Ordering::Relaxed);
                }
                outcomes
            });
            let gathered = gather_partials(consumer, config.format, &options);
            let outcomes = match scatter.join() {
                Ok(outcomes) => outcomes,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (gathered, outcomes)
        });

        // Worker failures take precedence; the reported partials are the
        // ones the aggregate was built from.
        for outcome in outcomes? {
            outcome?;
        }
        let (aggregate, partials) = gathered?;
        info!(
            best_fitness = aggregate.overall_best_fitness,
            "distributed run finished"
        );
        Ok(ScatterResult {
            aggregate,
            partials,
        })
    }

    /// Initializes and partitions the population for `config`'s registered
    /// function and returns one [`TaskMessage`] per partition.
    pub fn tasks(config: &RunConfig) -> Result<Vec<TaskMessage>> {
        let objective = config.resolve()?;
        let (tasks, _) = prepare(&objective, config)?;
        Ok(tasks
            .into_iter()
            .enumerate()
            .map(|(partition, task)| TaskMessage {
                partition,
                partitions: config.partitions,
                function: objective.name().to_string(),
                iterations: config.iterations,
                seed: Some(task.seed),
                sub_population: task.population,
            })
            .collect())
    }

    /// Publishes one task per partition to `producer`. Returns the number
    /// published.
    pub fn publish_tasks<P: Producer + ?Sized>(config: &RunConfig, producer: &P) -> Result<usize> {
        let tasks = Self::tasks(config)?;
        for task in &tasks {
            publish_task(producer, config.format, task)?;
        }
        info!(
            function = %config.function,
            partitions = tasks.len(),
            "tasks published"
        );
        Ok(tasks.len())
    }

    /// Scatters tasks through `tasks` and gathers the results that remote
    /// workers (see [`serve`](super::serve)) publish to `results`.
    ///
    /// Seeds travel with the tasks, so a seeded brokered run reproduces the
    /// independent run of the same configuration.
    pub fn run_brokered<P, C>(config: &RunConfig, tasks: &P, results: &mut C) -> Result<ScatterResult>
    where
        P: Producer + ?Sized,
        C: Consumer + ?Sized,
    {
        Self::run_brokered_until(config, tasks, results, &Arc::new(AtomicBool::new(false)))
    }

    fn run_brokered_until<P, C>(
        config: &RunConfig,
        tasks: &P,
        results: &mut C,
        abort: &Arc<AtomicBool>,
    ) -> Result<ScatterResult>
    where
        P: Producer + ?Sized,
        C: Consumer + ?Sized,
    {
        Self::publish_tasks(config, tasks)?;
        let (aggregate, partials) =
            gather_partials(results, config.format, &gather_options(config, abort))?;
        info!(
            best_fitness = aggregate.overall_best_fitness,
            "brokered run finished"
        );
        Ok(ScatterResult {
            aggregate,
            partials,
        })
    }

    /// Brokered run inside this process: tasks and results each travel
    /// through a [`MemoryStream`] (`<channel>.tasks` and `<channel>`), and a
    /// pool of `config.worker_count()` workers serves the task stream.
    pub fn run_brokered_local(config: &RunConfig) -> Result<ScatterResult> {
        config.validate()?;
        let task_stream = MemoryStream::new(format!("{}.tasks", config.channel));
        let result_stream = MemoryStream::new(config.channel.clone());
        let mut results = result_stream.consumer(config.group.clone(), config.consumer.clone());
        let pool = WorkerPool::new(config.worker_count())?;
        let stop = Arc::new(AtomicBool::new(false));
        let abort = Arc::new(AtomicBool::new(false));
        info!(
            function = %config.function,
            partitions = config.partitions,
            workers = pool.size(),
            channel = %config.channel,
            "brokered run started"
        );

        let options = ServeOptions::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_stop(Arc::clone(&stop));
        let (gathered, served) = thread::scope(|scope| {
            let workers = scope.spawn(|| {
                pool.execute((0..pool.size()).collect(), |_, id: usize| {
                    let mut inbox = task_stream.consumer("workers", format!("worker-{id}"));
                    let served = serve(&mut inbox, &result_stream.producer(), config.format, &options);
                    if served.is_err() {
                        abort.store(true, Ordering::Relaxed);
                    }
                    served
                })
            });
            let gathered =
                Self::run_brokered_until(config, &task_stream.producer(), &mut results, &abort);
            stop.store(true, Ordering::Relaxed);
            task_stream.close();
            let served = match workers.join() {
                Ok(served) => served,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            (gathered, served)
        });
        result_stream.close();

        let mut completed = 0;
        for stats in served? {
            let ServeStats { completed: done, .. } = stats?;
            completed += done;
        }
        debug!(completed, "workers drained");
        gathered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkFunction;
    use crate::coa::CoaConfig;
    use crate::error::CoaError;
    use crate::transport::{DeliveryId, Delivery, WireFormat};
    use std::time::Duration;

    fn scenario_a() -> (RunConfig, BenchmarkFunction) {
        let config = RunConfig::default()
            .with_population_size(20)
            .with_partitions(4)
            .with_iterations(4)
            .with_function("F6")
            .with_dimension(3)
            .with_seed(2024);
        let f = config.resolve().unwrap();
        (config, f)
    }

    #[test]
    fn test_prepare_is_deterministic() {
        let (config, f) = scenario_a();
        let (a, _) = prepare(&f, &config).unwrap();
        let (b, _) = prepare(&f, &config).unwrap();
        assert_eq!(a.len(), 4);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.population, y.population);
            assert_eq!(x.seed, y.seed);
            assert_eq!(x.population.len(), 5);
        }
        assert_ne!(a[0].seed, a[1].seed);
    }

    #[test]
    fn test_independent_scenario() {
        let (config, f) = scenario_a();
        let result = ScatterRunner::run_independent(&f, &config).unwrap();

        assert_eq!(result.partials.len(), 4);
        let min = result
            .partials
            .iter()
            .map(|p| p.best_fitness)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(result.aggregate.overall_best_fitness, min);
        assert_eq!(result.aggregate.overall_convergence.len(), 4);
        assert!(f.bounds().contains(&result.aggregate.overall_best_position));
        assert!(result.aggregate.overall_best_fitness >= 0.0);

        for t in 0..4 {
            let mean = result.partials.iter().map(|p| p.convergence[t]).sum::<f64>() / 4.0;
            assert!((result.aggregate.overall_convergence[t] - mean).abs() < 1e-9 * mean.max(1.0));
        }
    }

    #[test]
    fn test_independent_is_reproducible() {
        let (config, f) = scenario_a();
        let a = ScatterRunner::run_independent(&f, &config).unwrap();
        let b = ScatterRunner::run_independent(&f, &config).unwrap();
        assert_eq!(a.aggregate, b.aggregate);
    }

    #[test]
    fn test_single_partition_matches_plain_search() {
        let (config, f) = scenario_a();
        let config = config.with_partitions(1).with_iterations(25);

        let task = prepare(&f, &config).unwrap().0.remove(0);
        let direct = CoaRunner::run(
            task.population,
            &f,
            &CoaConfig::default()
                .with_max_iterations(25)
                .with_seed(task.seed),
        )
        .unwrap();

        let scattered = ScatterRunner::run_independent(&f, &config).unwrap();
        assert_eq!(scattered.aggregate.overall_best_fitness, direct.best_fitness);
        assert_eq!(scattered.aggregate.overall_best_position, direct.best_position);
        assert_eq!(scattered.aggregate.overall_convergence, direct.convergence);
    }

    #[test]
    fn test_invalid_partition_count() {
        let (config, f) = scenario_a();
        assert!(matches!(
            ScatterRunner::run_independent(&f, &config.with_partitions(21)),
            Err(CoaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_coupled_run() {
        let (config, f) = scenario_a();
        let config = config.with_iterations(30);
        let result = ScatterRunner::run_coupled(&f, &config).unwrap();

        assert_eq!(result.aggregate.overall_convergence.len(), 30);
        assert_eq!(result.partials.len(), 4);
        assert!(f.bounds().contains(&result.aggregate.overall_best_position));
        assert_eq!(
            f.evaluate(&result.aggregate.overall_best_position),
            result.aggregate.overall_best_fitness
        );
        // The shared slot sees every candidate, so it is never worse than
        // any partition's accepted best or any recorded global reference.
        for p in &result.partials {
            assert!(result.aggregate.overall_best_fitness <= p.best_fitness);
        }
        for g in &result.aggregate.overall_convergence {
            assert!(result.aggregate.overall_best_fitness <= *g);
        }
    }

    #[test]
    fn test_coupled_is_reproducible() {
        let (config, f) = scenario_a();
        let a = ScatterRunner::run_coupled(&f, &config).unwrap();
        let b = ScatterRunner::run_coupled(&f, &config).unwrap();
        assert_eq!(a.aggregate, b.aggregate);
    }

    #[test]
    fn test_distributed_over_memory_stream() {
        let (config, f) = scenario_a();
        let config = config
            .with_workers(2)
            .with_format(WireFormat::Text)
            .with_timeout(Duration::from_secs(10));
        let stream = MemoryStream::new("optimization_results");
        let mut consumer = stream.consumer("optimization-consumer-group", "aggregator");

        let result =
            ScatterRunner::run_distributed(&f, &config, &stream.producer(), &mut consumer).unwrap();
        let local = ScatterRunner::run_independent(&f, &config).unwrap();

        // Partials arrive in completion order; as a set they match.
        assert_eq!(by_fitness(result.partials), by_fitness(local.partials));
        assert_eq!(
            result.aggregate.overall_best_fitness,
            local.aggregate.overall_best_fitness
        );
        assert_eq!(stream.len(), 4);
        assert_eq!(stream.pending("optimization-consumer-group"), 0);
    }

    fn by_fitness(mut partials: Vec<PartialResult>) -> Vec<PartialResult> {
        partials.sort_by(|a, b| a.best_fitness.total_cmp(&b.best_fitness));
        partials
    }

    /// Delivers the first entry twice under distinct ids, the way a
    /// broker without dedup would after a producer retry.
    struct Duplicating {
        inner: crate::transport::StreamConsumer,
        repeat: Option<Delivery>,
    }

    impl Consumer for Duplicating {
        fn receive(&mut self, timeout: Duration) -> Result<Option<Delivery>> {
            if let Some(mut d) = self.repeat.take() {
                d.id = DeliveryId(d.id.0 + 1_000);
                return Ok(Some(d));
            }
            let d = self.inner.receive(timeout)?;
            if let Some(first) = &d {
                if first.id == DeliveryId(1) {
                    self.repeat = Some(first.clone());
                }
            }
            Ok(d)
        }

        fn ack(&mut self, id: DeliveryId) -> Result<()> {
            self.inner.ack(id)
        }
    }

    #[test]
    fn test_distributed_partials_are_the_aggregated_ones() {
        let (config, f) = scenario_a();
        let config = config.with_workers(1).with_timeout(Duration::from_secs(10));
        let stream = MemoryStream::new("dup");
        let mut consumer = Duplicating {
            inner: stream.consumer("g", "agg"),
            repeat: None,
        };

        let result =
            ScatterRunner::run_distributed(&f, &config, &stream.producer(), &mut consumer).unwrap();

        // The duplicate filled one of the k slots, so the partials must
        // show it rather than the per-partition outcomes.
        assert_eq!(result.partials.len(), 4);
        assert_eq!(result.partials[0], result.partials[1]);
        let reduced = reduce(result.partials.clone(), 4).unwrap();
        assert_eq!(reduced, result.aggregate);
    }

    #[test]
    fn test_tasks_carry_the_prepared_partitions() {
        let (config, f) = scenario_a();
        let tasks = ScatterRunner::tasks(&config).unwrap();
        let (prepared, _) = prepare(&f, &config).unwrap();

        assert_eq!(tasks.len(), 4);
        for (i, (task, part)) in tasks.iter().zip(&prepared).enumerate() {
            assert_eq!(task.partition, i);
            assert_eq!(task.partitions, 4);
            assert_eq!(task.function, "F6");
            assert_eq!(task.iterations, 4);
            assert_eq!(task.seed, Some(part.seed));
            assert_eq!(task.sub_population, part.population);
        }
    }

    #[test]
    fn test_brokered_over_memory_streams() {
        let (config, _) = scenario_a();
        let config = config
            .with_format(WireFormat::Text)
            .with_timeout(Duration::from_secs(10));
        let task_stream = MemoryStream::new("tasks");
        let result_stream = MemoryStream::new("results");
        let mut results = result_stream.consumer("aggregator", "a");

        let result = thread::scope(|scope| {
            for id in 0..2 {
                let mut inbox = task_stream.consumer("workers", format!("w{id}"));
                let outbox = result_stream.producer();
                let format = config.format;
                scope.spawn(move || {
                    serve(&mut inbox, &outbox, format, &ServeOptions::default()).unwrap()
                });
            }
            let result =
                ScatterRunner::run_brokered(&config, &task_stream.producer(), &mut results);
            task_stream.close();
            result
        })
        .unwrap();

        let local = ScatterRunner::run_independent(&config.resolve().unwrap(), &config).unwrap();
        assert_eq!(by_fitness(result.partials), by_fitness(local.partials));
        assert_eq!(
            result.aggregate.overall_best_fitness,
            local.aggregate.overall_best_fitness
        );
        assert_eq!(task_stream.len(), 4);
        assert_eq!(task_stream.pending("workers"), 0);
    }

    #[test]
    fn test_brokered_local_in_text_format() {
        let (config, _) = scenario_a();
        let config = config
            .with_workers(2)
            .with_format(WireFormat::Text)
            .with_timeout(Duration::from_secs(10));
        let result = ScatterRunner::run_brokered_local(&config).unwrap();
        let local = ScatterRunner::run_independent(&config.resolve().unwrap(), &config).unwrap();
        assert_eq!(by_fitness(result.partials), by_fitness(local.partials));
        assert_eq!(result.aggregate.overall_convergence.len(), 4);
    }

    #[test]
    fn test_brokered_rejects_unknown_function() {
        let (config, _) = scenario_a();
        let stream = MemoryStream::new("tasks");
        assert!(matches!(
            ScatterRunner::publish_tasks(&config.with_function("F42"), &stream.producer()),
            Err(CoaError::UnknownFunction(_))
        ));
        assert!(stream.is_empty());
    }

    #[test]
    fn test_run_dispatches_on_mode() {
        let (config, f) = scenario_a();
        for mode in [
            ExecutionMode::Independent,
            ExecutionMode::Coupled,
            ExecutionMode::Distributed,
            ExecutionMode::Brokered,
        ] {
            let result = ScatterRunner::run(&f, &config.clone().with_mode(mode)).unwrap();
            assert_eq!(result.aggregate.overall_convergence.len(), 4, "{mode:?}");
        }
    }

    /// Accepts sends but never delivers them.
    struct BlackHole;

    impl Producer for BlackHole {
        fn send(&self, _payload: Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    impl Consumer for BlackHole {
        fn receive(&mut self, timeout: Duration) -> Result<Option<Delivery>> {
            thread::sleep(timeout);
            Ok(None)
        }

        fn ack(&mut self, _id: DeliveryId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_distributed_times_out_incomplete() {
        let (config, f) = scenario_a();
        let config = config.with_timeout(Duration::from_millis(100));
        let mut consumer = BlackHole;
        match ScatterRunner::run_distributed(&f, &config, &BlackHole, &mut consumer) {
            Err(CoaError::Incomplete { expected, gathered }) => {
                assert_eq!(expected, 4);
                assert!(gathered.is_empty());
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
    }

    #[test]
    fn test_distributed_publish_failure_is_reported() {
        let (config, f) = scenario_a();
        let stream = MemoryStream::new("closed");
        stream.close();
        let mut consumer = stream.consumer("g", "c");
        let result = ScatterRunner::run_distributed(
            &f,
            &config.with_timeout(Duration::from_secs(30)),
            &stream.producer(),
            &mut consumer,
        );
        assert!(matches!(result, Err(CoaError::Unavailable(_))));
    }
}
