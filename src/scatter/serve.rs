//! Worker side of a brokered run: consume tasks, search, publish results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::aggregate::PartialResult;
use crate::coa::CoaRunner;
use crate::error::Result;
use crate::transport::{publish, Consumer, Producer, TaskMessage, WireFormat};

/// Parameters of one [`serve`] loop.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Upper bound on a single `receive` wait, so the stop flag is noticed.
    pub poll_interval: Duration,

    /// Stop after this many tasks have been completed.
    pub max_tasks: Option<usize>,

    /// Stop flag checked between tasks.
    pub stop: Option<Arc<AtomicBool>>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_tasks: None,
            stop: None,
        }
    }
}

impl ServeOptions {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = Some(max_tasks);
        self
    }

    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    fn stopped(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Counters of a finished [`serve`] loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Tasks searched and published.
    pub completed: usize,

    /// Tasks dropped because they could not be decoded or run.
    pub rejected: usize,
}

/// Runs one task to completion.
pub fn execute_task(task: &TaskMessage) -> Result<PartialResult> {
    task.validate()?;
    let objective = task.objective()?;
    let result = CoaRunner::run(task.sub_population.clone(), &objective, &task.coa_config())?;
    debug!(
        partition = task.partition,
        best_fitness = result.best_fitness,
        evaluations = result.evaluations,
        "task finished"
    );
    Ok(result.into())
}

/// Consumes tasks from `tasks`, searches each and publishes the result to
/// `results`, until the task channel is closed and drained, the stop flag
/// is set, or `max_tasks` have completed.
///
/// A task is acknowledged only after its result was published, so a
/// worker that dies mid-search leaves it to be redelivered. Tasks that
/// cannot be decoded or run are logged, acknowledged and counted as
/// rejected.
///
/// # Errors
///
/// A failed publish or a consumer error ends the loop.
///
/// # Examples
///
/// ```
/// use u_crayfish::scatter::{serve, ServeOptions};
/// use u_crayfish::transport::{
///     gather, publish_task, GatherOptions, MemoryStream, TaskMessage, WireFormat,
/// };
///
/// let tasks = MemoryStream::new("tasks");
/// let results = MemoryStream::new("results");
/// let task = TaskMessage {
///     partition: 0,
///     partitions: 1,
///     function: "F1".into(),
///     iterations: 5,
///     seed: Some(3),
///     sub_population: vec![vec![10.0, -4.0], vec![2.0, 2.0]],
/// };
/// publish_task(&tasks.producer(), WireFormat::Json, &task).unwrap();
/// tasks.close();
///
/// let mut inbox = tasks.consumer("workers", "w1");
/// let stats = serve(&mut inbox, &results.producer(), WireFormat::Json, &ServeOptions::default())
///     .unwrap();
/// assert_eq!(stats.completed, 1);
///
/// let mut outbox = results.consumer("aggregator", "a");
/// let aggregate = gather(&mut outbox, WireFormat::Json, &GatherOptions::new(1)).unwrap();
/// assert_eq!(aggregate.overall_convergence.len(), 5);
/// ```
pub fn serve<C, P>(
    tasks: &mut C,
    results: &P,
    format: WireFormat,
    options: &ServeOptions,
) -> Result<ServeStats>
where
    C: Consumer + ?Sized,
    P: Producer + ?Sized,
{
    let mut stats = ServeStats::default();
    info!(?format, "worker waiting for tasks");

    loop {
        if options.stopped() {
            debug!("worker stopped");
            break;
        }
        if options.max_tasks.is_some_and(|max| stats.completed >= max) {
            break;
        }

        let Some(delivery) = tasks.receive(options.poll_interval)? else {
            if tasks.is_closed() {
                debug!("task channel closed");
                break;
            }
            continue;
        };

        let outcome = format
            .decode_task(&delivery.payload)
            .and_then(|task| execute_task(&task).map(|partial| (task.partition, partial)));
        match outcome {
            Ok((partition, partial)) => {
                publish(results, format, &partial)?;
                tasks.ack(delivery.id)?;
                stats.completed += 1;
                debug!(partition, id = delivery.id.0, "task completed");
            }
            Err(e) => {
                warn!(
                    id = delivery.id.0,
                    attempt = delivery.attempt,
                    error = %e,
                    "dropping unusable task"
                );
                tasks.ack(delivery.id)?;
                stats.rejected += 1;
            }
        }
    }

    info!(
        completed = stats.completed,
        rejected = stats.rejected,
        "worker finished"
    );
    Ok(stats)
}
