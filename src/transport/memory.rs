//! In-process stream with consumer groups.
//!
//! Models an append-only log (one per optimization run) read through
//! consumer groups. Within a group each entry is handed to one consumer
//! and stays *pending* until acknowledged. A pending entry left idle
//! longer than the claim timeout is claimed by whichever consumer of the
//! group asks next, so a crashed consumer's work is redelivered: delivery
//! is at least once.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::{Consumer, Delivery, DeliveryId, Producer};
use crate::error::{CoaError, Result};

/// Default idle time after which a pending entry can be claimed.
const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Pending {
    consumer: String,
    delivered_at: Instant,
    attempts: u32,
}

#[derive(Debug, Default)]
struct GroupState {
    next: usize,
    pending: BTreeMap<u64, Pending>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: Vec<Vec<u8>>,
    groups: HashMap<String, GroupState>,
    closed: bool,
}

#[derive(Debug)]
struct StreamInner {
    name: String,
    claim_timeout: Duration,
    state: Mutex<StreamState>,
    arrived: Condvar,
}

/// An in-memory, multi-producer, consumer-group stream.
///
/// Cloning yields another handle to the same stream.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use u_crayfish::transport::{Consumer, MemoryStream, Producer};
///
/// let stream = MemoryStream::new("optimization_results");
/// let mut consumer = stream.consumer("group", "c1");
/// stream.producer().send(b"hello".to_vec()).unwrap();
///
/// let delivery = consumer.receive(Duration::from_millis(10)).unwrap().unwrap();
/// assert_eq!(delivery.payload, b"hello");
/// consumer.ack(delivery.id).unwrap();
/// assert_eq!(stream.pending("group"), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStream {
    inner: Arc<StreamInner>,
}

impl MemoryStream {
    /// Creates an empty stream with the default claim timeout.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_claim_timeout(name, DEFAULT_CLAIM_TIMEOUT)
    }

    /// Creates an empty stream whose unacknowledged entries become
    /// claimable after `claim_timeout` of idleness.
    pub fn with_claim_timeout(name: impl Into<String>, claim_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                name: name.into(),
                claim_timeout,
                state: Mutex::new(StreamState::default()),
                arrived: Condvar::new(),
            }),
        }
    }

    /// Stream name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// A sending handle.
    pub fn producer(&self) -> StreamProducer {
        StreamProducer {
            inner: Arc::clone(&self.inner),
        }
    }

    /// A receiving handle identified as `consumer` within `group`.
    ///
    /// The group is created on first use and starts reading from the
    /// beginning of the stream.
    pub fn consumer(&self, group: impl Into<String>, consumer: impl Into<String>) -> StreamConsumer {
        let group = group.into();
        self.inner
            .state
            .lock()
            .groups
            .entry(group.clone())
            .or_default();
        StreamConsumer {
            inner: Arc::clone(&self.inner),
            group,
            name: consumer.into(),
        }
    }

    /// Refuses further sends. Entries already appended stay readable.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.arrived.notify_all();
    }

    /// Number of entries ever appended.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of delivered but unacknowledged entries in `group`.
    pub fn pending(&self, group: &str) -> usize {
        self.inner
            .state
            .lock()
            .groups
            .get(group)
            .map_or(0, |g| g.pending.len())
    }
}

/// Sending handle of a [`MemoryStream`].
#[derive(Debug, Clone)]
pub struct StreamProducer {
    inner: Arc<StreamInner>,
}

impl Producer for StreamProducer {
    fn send(&self, payload: Vec<u8>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(CoaError::Unavailable(format!(
                "stream {} is closed",
                self.inner.name
            )));
        }
        state.entries.push(payload);
        drop(state);
        self.inner.arrived.notify_all();
        Ok(())
    }
}

/// Receiving handle of a [`MemoryStream`], bound to one group.
#[derive(Debug)]
pub struct StreamConsumer {
    inner: Arc<StreamInner>,
    group: String,
    name: String,
}

impl StreamConsumer {
    /// Consumer identity within its group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group this consumer reads through.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Claims an idle pending entry, or takes the next new one.
    ///
    /// Returns the delivery, or the instant at which the earliest pending
    /// entry becomes claimable.
    fn next_delivery(&self, state: &mut StreamState, now: Instant) -> std::result::Result<Delivery, Option<Instant>> {
        let claim_timeout = self.inner.claim_timeout;
        let StreamState { entries, groups, .. } = state;
        let group = groups.entry(self.group.clone()).or_default();

        let mut earliest: Option<Instant> = None;
        for (&id, pending) in group.pending.iter_mut() {
            let claimable_at = pending.delivered_at + claim_timeout;
            if claimable_at <= now {
                if pending.consumer != self.name {
                    warn!(
                        stream = %self.inner.name,
                        id,
                        from = %pending.consumer,
                        to = %self.name,
                        "claiming idle pending entry"
                    );
                }
                pending.consumer = self.name.clone();
                pending.delivered_at = now;
                pending.attempts += 1;
                return Ok(Delivery {
                    id: DeliveryId(id),
                    payload: entries[(id - 1) as usize].clone(),
                    attempt: pending.attempts,
                });
            }
            earliest = Some(earliest.map_or(claimable_at, |e| e.min(claimable_at)));
        }

        if group.next < entries.len() {
            let id = (group.next + 1) as u64;
            group.next += 1;
            group.pending.insert(
                id,
                Pending {
                    consumer: self.name.clone(),
                    delivered_at: now,
                    attempts: 1,
                },
            );
            return Ok(Delivery {
                id: DeliveryId(id),
                payload: entries[id as usize - 1].clone(),
                attempt: 1,
            });
        }

        Err(earliest)
    }
}

impl Consumer for StreamConsumer {
    fn receive(&mut self, timeout: Duration) -> Result<Option<Delivery>> {
        // `None` when the timeout is too large to represent: wait indefinitely.
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.state.lock();
        loop {
            let now = Instant::now();
            match self.next_delivery(&mut state, now) {
                Ok(delivery) => {
                    debug!(
                        stream = %self.inner.name,
                        consumer = %self.name,
                        id = delivery.id.0,
                        attempt = delivery.attempt,
                        "delivered entry"
                    );
                    return Ok(Some(delivery));
                }
                Err(claimable_at) => {
                    if deadline.is_some_and(|d| now >= d) {
                        return Ok(None);
                    }
                    if state.closed && claimable_at.is_none() {
                        return Ok(None);
                    }
                    let wake = match (claimable_at, deadline) {
                        (Some(c), Some(d)) => Some(c.min(d)),
                        (c, d) => c.or(d),
                    };
                    match wake {
                        Some(wake) => {
                            self.inner.arrived.wait_until(&mut state, wake);
                        }
                        None => self.inner.arrived.wait(&mut state),
                    }
                }
            }
        }
    }

    fn is_closed(&self) -> bool {
        let state = self.inner.state.lock();
        state.closed
            && state
                .groups
                .get(&self.group)
                .map_or(true, |g| g.next >= state.entries.len() && g.pending.is_empty())
    }

    fn ack(&mut self, id: DeliveryId) -> Result<()> {
        let mut state = self.inner.state.lock();
        if let Some(group) = state.groups.get_mut(&self.group) {
            group.pending.remove(&id.0);
        }
        Ok(())
    }
}
