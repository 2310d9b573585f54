//! Aggregator side of the distributed mode.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{Consumer, WireFormat};
use crate::aggregate::{AggregateResult, Aggregator, PartialResult};
use crate::error::{CoaError, Result};

/// When a delivery is acknowledged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckPolicy {
    /// After the payload has been folded (or rejected as malformed).
    #[default]
    Explicit,
    /// As soon as it is received, before decoding. A crash between
    /// receipt and fold loses the result.
    OnReceive,
}

/// Parameters of one [`gather`] call.
#[derive(Debug, Clone)]
pub struct GatherOptions {
    /// Number of partial results to wait for (`k`).
    pub expected: usize,

    /// Overall deadline, measured from the start of the call.
    pub timeout: Duration,

    /// Required trace length, if known up front.
    pub iterations: Option<usize>,

    /// Upper bound on a single `receive` wait, so cancellation is noticed.
    pub poll_interval: Duration,

    /// Acknowledgement policy.
    pub ack: AckPolicy,

    /// Cancellation token checked between receives.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl GatherOptions {
    /// Waits for `expected` results with a 30 s deadline.
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            timeout: Duration::from_secs(30),
            iterations: None,
            poll_interval: Duration::from_millis(100),
            ack: AckPolicy::Explicit,
            cancel: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_ack_policy(mut self, ack: AckPolicy) -> Self {
        self.ack = ack;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Receives and folds partial results until `expected` have arrived or
/// the deadline passes.
///
/// Payloads that fail to decode or do not match the trace length are
/// logged, acknowledged and skipped so they are not redelivered forever.
/// A redelivery of an id already folded in this call is acknowledged and
/// ignored. A timeout too large to represent as an instant means no
/// deadline.
///
/// # Errors
///
/// - [`CoaError::Incomplete`] on timeout, or when the consumer reports
///   that nothing more can arrive, carrying the results gathered
/// - [`CoaError::Cancelled`] when the token is set
/// - any error from the consumer itself
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use u_crayfish::aggregate::PartialResult;
/// use u_crayfish::transport::{gather, publish, GatherOptions, MemoryStream, WireFormat};
///
/// let stream = MemoryStream::new("optimization_results");
/// let mut consumer = stream.consumer("group", "aggregator");
/// let producer = stream.producer();
/// for fitness in [3.0, 1.0] {
///     let result = PartialResult::new(vec![fitness], fitness, vec![fitness * 2.0, fitness]);
///     publish(&producer, WireFormat::Json, &result).unwrap();
/// }
///
/// let options = GatherOptions::new(2).with_timeout(Duration::from_secs(1));
/// let aggregate = gather(&mut consumer, WireFormat::Json, &options).unwrap();
/// assert_eq!(aggregate.overall_best_fitness, 1.0);
/// assert_eq!(aggregate.overall_convergence, vec![4.0, 2.0]);
/// ```
pub fn gather<C: Consumer + ?Sized>(
    consumer: &mut C,
    format: WireFormat,
    options: &GatherOptions,
) -> Result<AggregateResult> {
    gather_partials(consumer, format, options).map(|(aggregate, _)| aggregate)
}

/// Like [`gather`], but also returns the folded partial results in
/// arrival order.
pub fn gather_partials<C: Consumer + ?Sized>(
    consumer: &mut C,
    format: WireFormat,
    options: &GatherOptions,
) -> Result<(AggregateResult, Vec<PartialResult>)> {
    if options.expected == 0 {
        return Err(CoaError::invalid("expected result count must be at least 1"));
    }

    let deadline = Instant::now().checked_add(options.timeout);
    let mut aggregator = match options.iterations {
        Some(t) => Aggregator::with_horizon(options.expected, t),
        None => Aggregator::new(options.expected),
    };
    let mut folded_ids = HashSet::new();

    info!(expected = options.expected, ?format, "gathering partial results");

    while !aggregator.is_complete() {
        if options.is_cancelled() {
            warn!(received = aggregator.received(), "gather cancelled");
            return Err(CoaError::Cancelled);
        }

        let now = Instant::now();
        if deadline.is_some_and(|d| now >= d) {
            warn!(
                received = aggregator.received(),
                expected = options.expected,
                "gather timed out"
            );
            return aggregator.finish_with_partials();
        }

        let wait = deadline.map_or(options.poll_interval, |d| {
            (d - now).min(options.poll_interval)
        });
        let Some(delivery) = consumer.receive(wait)? else {
            if consumer.is_closed() {
                warn!(
                    received = aggregator.received(),
                    expected = options.expected,
                    "channel closed before all results arrived"
                );
                return aggregator.finish_with_partials();
            }
            continue;
        };

        if options.ack == AckPolicy::OnReceive {
            consumer.ack(delivery.id)?;
        }

        if folded_ids.contains(&delivery.id) {
            debug!(id = delivery.id.0, "ignoring redelivered result");
        } else {
            match format
                .decode(&delivery.payload)
                .and_then(|result| aggregator.fold(result))
            {
                Ok(()) => {
                    folded_ids.insert(delivery.id);
                }
                Err(e) => warn!(
                    id = delivery.id.0,
                    attempt = delivery.attempt,
                    error = %e,
                    "dropping malformed partial result"
                ),
            }
        }

        if options.ack == AckPolicy::Explicit {
            consumer.ack(delivery.id)?;
        }
    }

    info!(received = aggregator.received(), "all partial results gathered");
    aggregator.finish_with_partials()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{publish, Delivery, DeliveryId, MemoryStream, Producer};

    fn partial(fitness: f64) -> PartialResult {
        PartialResult::new(vec![fitness, -fitness], fitness, vec![fitness + 1.0, fitness])
    }

    fn fast(expected: usize) -> GatherOptions {
        GatherOptions::new(expected)
            .with_timeout(Duration::from_millis(200))
            .with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_gathers_expected_results() {
        let stream = MemoryStream::new("s");
        let producer = stream.producer();
        for f in [5.0, 2.0, 9.0] {
            publish(&producer, WireFormat::Text, &partial(f)).unwrap();
        }
        let mut consumer = stream.consumer("g", "agg");
        let aggregate = gather(&mut consumer, WireFormat::Text, &fast(3)).unwrap();

        assert_eq!(aggregate.overall_best_fitness, 2.0);
        assert_eq!(aggregate.overall_best_position, vec![2.0, -2.0]);
        let expected = [19.0 / 3.0, 16.0 / 3.0];
        for (got, want) in aggregate.overall_convergence.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
        assert_eq!(stream.pending("g"), 0);
    }

    #[test]
    fn test_timeout_reports_gathered() {
        let stream = MemoryStream::new("s");
        publish(&stream.producer(), WireFormat::Json, &partial(1.0)).unwrap();
        let mut consumer = stream.consumer("g", "agg");

        match gather(&mut consumer, WireFormat::Json, &fast(3)) {
            Err(CoaError::Incomplete { expected, gathered }) => {
                assert_eq!(expected, 3);
                assert_eq!(gathered, vec![partial(1.0)]);
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_payload_is_acked_and_skipped() {
        let stream = MemoryStream::new("s");
        let producer = stream.producer();
        producer.send(b"not a result".to_vec()).unwrap();
        publish(&producer, WireFormat::Json, &partial(4.0)).unwrap();

        let mut consumer = stream.consumer("g", "agg");
        let aggregate = gather(&mut consumer, WireFormat::Json, &fast(1)).unwrap();
        assert_eq!(aggregate.overall_best_fitness, 4.0);
        assert_eq!(stream.pending("g"), 0);
    }

    #[test]
    fn test_wrong_trace_length_is_skipped() {
        let stream = MemoryStream::new("s");
        let producer = stream.producer();
        let short = PartialResult::new(vec![0.0], 0.0, vec![0.0]);
        publish(&producer, WireFormat::Json, &short).unwrap();
        publish(&producer, WireFormat::Json, &partial(3.0)).unwrap();

        let mut consumer = stream.consumer("g", "agg");
        let options = fast(1).with_iterations(2);
        let aggregate = gather(&mut consumer, WireFormat::Json, &options).unwrap();
        assert_eq!(aggregate.overall_best_fitness, 3.0);
    }

    #[test]
    fn test_cancelled() {
        let stream = MemoryStream::new("s");
        let mut consumer = stream.consumer("g", "agg");
        let options = fast(2).with_cancel(Arc::new(AtomicBool::new(true)));
        assert!(matches!(
            gather(&mut consumer, WireFormat::Json, &options),
            Err(CoaError::Cancelled)
        ));
    }

    #[test]
    fn test_zero_expected_rejected() {
        let stream = MemoryStream::new("s");
        let mut consumer = stream.consumer("g", "agg");
        assert!(matches!(
            gather(&mut consumer, WireFormat::Json, &fast(0)),
            Err(CoaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unbounded_timeout_does_not_overflow() {
        let stream = MemoryStream::new("s");
        let producer = stream.producer();
        for f in [6.0, 2.0] {
            publish(&producer, WireFormat::Json, &partial(f)).unwrap();
        }
        let mut consumer = stream.consumer("g", "agg");
        let options = GatherOptions::new(2).with_timeout(Duration::MAX);
        let (aggregate, partials) =
            gather_partials(&mut consumer, WireFormat::Json, &options).unwrap();
        assert_eq!(aggregate.overall_best_fitness, 2.0);
        assert_eq!(partials, vec![partial(6.0), partial(2.0)]);
    }

    #[test]
    fn test_unbounded_timeout_still_cancels() {
        let stream = MemoryStream::new("s");
        let mut consumer = stream.consumer("g", "agg");
        let cancel = Arc::new(AtomicBool::new(false));
        let options = GatherOptions::new(1)
            .with_timeout(Duration::MAX)
            .with_poll_interval(Duration::from_millis(5))
            .with_cancel(Arc::clone(&cancel));

        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            cancel.store(true, Ordering::Relaxed);
        });
        assert!(matches!(
            gather(&mut consumer, WireFormat::Json, &options),
            Err(CoaError::Cancelled)
        ));
        setter.join().unwrap();
    }

    #[test]
    fn test_closed_channel_ends_gather() {
        let stream = MemoryStream::new("s");
        publish(&stream.producer(), WireFormat::Json, &partial(1.0)).unwrap();
        stream.close();
        let mut consumer = stream.consumer("g", "agg");
        let options = GatherOptions::new(3).with_timeout(Duration::MAX);
        match gather(&mut consumer, WireFormat::Json, &options) {
            Err(CoaError::Incomplete { gathered, .. }) => assert_eq!(gathered, vec![partial(1.0)]),
            other => panic!("expected Incomplete, got {other:?}"),
        }
    }

    /// Delivers the same payload twice under one id before anything else.
    struct Stutter {
        queue: Vec<Delivery>,
        acked: Vec<DeliveryId>,
    }

    impl Consumer for Stutter {
        fn receive(&mut self, _timeout: Duration) -> Result<Option<Delivery>> {
            Ok(if self.queue.is_empty() {
                None
            } else {
                Some(self.queue.remove(0))
            })
        }

        fn ack(&mut self, id: DeliveryId) -> Result<()> {
            self.acked.push(id);
            Ok(())
        }
    }

    #[test]
    fn test_redelivered_id_counted_once() {
        let payload = WireFormat::Json.encode(&partial(1.0)).unwrap();
        let other = WireFormat::Json.encode(&partial(8.0)).unwrap();
        let delivery = |id, payload: &Vec<u8>, attempt| Delivery {
            id: DeliveryId(id),
            payload: payload.clone(),
            attempt,
        };
        let mut consumer = Stutter {
            queue: vec![
                delivery(1, &payload, 1),
                delivery(1, &payload, 2),
                delivery(2, &other, 1),
            ],
            acked: Vec::new(),
        };

        let aggregate = gather(&mut consumer, WireFormat::Json, &fast(2)).unwrap();
        assert_eq!(aggregate.overall_best_fitness, 1.0);
        assert_eq!(aggregate.overall_convergence, vec![5.5, 4.5]);
        assert_eq!(consumer.acked, vec![DeliveryId(1), DeliveryId(1), DeliveryId(2)]);
    }

    #[test]
    fn test_on_receive_acks_before_fold() {
        let payload = b"garbage".to_vec();
        let mut consumer = Stutter {
            queue: vec![Delivery {
                id: DeliveryId(7),
                payload,
                attempt: 1,
            }],
            acked: Vec::new(),
        };
        let options = fast(1)
            .with_timeout(Duration::from_millis(30))
            .with_ack_policy(AckPolicy::OnReceive);
        assert!(gather(&mut consumer, WireFormat::Json, &options).is_err());
        assert_eq!(consumer.acked, vec![DeliveryId(7)]);
    }
}
