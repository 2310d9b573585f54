//! Message transport between searches and the aggregator.
//!
//! Concrete brokers are external collaborators; this module defines the
//! two roles the engine needs from them:
//!
//! - [`Producer`]: hands an encoded payload to the channel (best effort,
//!   may fail with [`CoaError::Unavailable`])
//! - [`Consumer`]: receives payloads at least once and takes an explicit
//!   acknowledgement per delivery
//!
//! plus an in-process [`MemoryStream`] implementing both with consumer
//! groups and claim-on-idle redelivery, a newline-delimited pipe transport
//! ([`LineProducer`], [`LineConsumer`]), the [`WireFormat`] codecs for
//! results and [`TaskMessage`]s, and the [`gather`] loop that folds
//! deliveries into an [`Aggregator`](crate::aggregate::Aggregator).

mod codec;
mod gather;
mod lines;
mod memory;
mod task;

pub use codec::WireFormat;
pub use gather::{gather, gather_partials, AckPolicy, GatherOptions};
pub use lines::{LineConsumer, LineProducer};
pub use memory::{MemoryStream, StreamConsumer, StreamProducer};
pub use task::TaskMessage;

use std::time::Duration;

use tracing::debug;

use crate::aggregate::PartialResult;
use crate::error::{CoaError, Result};

/// Default channel name for one optimization run.
pub const DEFAULT_CHANNEL: &str = "optimization_results";

/// Default consumer-group name.
pub const DEFAULT_GROUP: &str = "optimization-consumer-group";

/// Identifier of one delivery, used for acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryId(pub u64);

/// A payload handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Identifier to acknowledge.
    pub id: DeliveryId,
    /// Encoded payload.
    pub payload: Vec<u8>,
    /// How many times this payload has been delivered (1 on first delivery).
    pub attempt: u32,
}

/// Sending side of the transport.
pub trait Producer: Send + Sync {
    /// Sends one payload.
    fn send(&self, payload: Vec<u8>) -> Result<()>;
}

/// Receiving side of the transport.
pub trait Consumer: Send {
    /// Waits up to `timeout` for the next delivery. `Ok(None)` means
    /// nothing arrived in time.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Delivery>>;

    /// Acknowledges a delivery so it is not redelivered.
    fn ack(&mut self, id: DeliveryId) -> Result<()>;

    /// Whether the channel is closed and drained, so no delivery can
    /// arrive any more.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<P: Producer + ?Sized> Producer for std::sync::Arc<P> {
    fn send(&self, payload: Vec<u8>) -> Result<()> {
        (**self).send(payload)
    }
}

impl<C: Consumer + ?Sized> Consumer for Box<C> {
    fn receive(&mut self, timeout: Duration) -> Result<Option<Delivery>> {
        (**self).receive(timeout)
    }

    fn ack(&mut self, id: DeliveryId) -> Result<()> {
        (**self).ack(id)
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Encodes `result` and sends it.
///
/// Failures are returned to the caller; retrying is the caller's choice.
pub fn publish<P: Producer + ?Sized>(
    producer: &P,
    format: WireFormat,
    result: &PartialResult,
) -> Result<()> {
    let payload = format.encode(result)?;
    debug!(
        bytes = payload.len(),
        best_fitness = result.best_fitness,
        "publishing partial result"
    );
    producer.send(payload).map_err(|e| match e {
        CoaError::Unavailable(_) => e,
        other => CoaError::Unavailable(other.to_string()),
    })
}

/// Encodes `task` and sends it.
pub fn publish_task<P: Producer + ?Sized>(
    producer: &P,
    format: WireFormat,
    task: &TaskMessage,
) -> Result<()> {
    let payload = format.encode_task(task)?;
    debug!(
        partition = task.partition,
        individuals = task.sub_population.len(),
        "publishing task"
    );
    producer.send(payload).map_err(|e| match e {
        CoaError::Unavailable(_) => e,
        other => CoaError::Unavailable(other.to_string()),
    })
}
