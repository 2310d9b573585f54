//! Newline-delimited transport over byte streams.
//!
//! Lets separate processes form a pipeline through pipes, one payload per
//! line:
//!
//! ```text
//! crayfish tasks -k 4 | crayfish worker | crayfish gather -k 4
//! ```
//!
//! Only single-line payloads fit, so this pairs with [`WireFormat::Json`].
//! Reads block, so `receive` ignores its timeout, and a pipe has no
//! redelivery, so `ack` is a no-op.
//!
//! [`WireFormat::Json`]: super::WireFormat::Json

use std::io::{BufRead, Write};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::{Consumer, Delivery, DeliveryId, Producer};
use crate::error::{CoaError, Result};

/// Writes each payload as one line.
#[derive(Debug)]
pub struct LineProducer<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> LineProducer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> Producer for LineProducer<W> {
    fn send(&self, payload: Vec<u8>) -> Result<()> {
        if payload.contains(&b'\n') {
            return Err(CoaError::invalid(
                "line transport needs single-line payloads; use the json format",
            ));
        }
        let mut writer = self.writer.lock();
        writer
            .write_all(&payload)
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush())
            .map_err(|e| CoaError::Unavailable(format!("write failed: {e}")))
    }
}

/// Reads one payload per non-blank line until end of input.
#[derive(Debug)]
pub struct LineConsumer<R> {
    reader: R,
    next_id: u64,
    eof: bool,
}

impl<R: BufRead + Send> LineConsumer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            next_id: 1,
            eof: false,
        }
    }
}

impl<R: BufRead + Send> Consumer for LineConsumer<R> {
    fn receive(&mut self, _timeout: Duration) -> Result<Option<Delivery>> {
        let mut line = String::new();
        while !self.eof {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| CoaError::Unavailable(format!("read failed: {e}")))?;
            if read == 0 {
                debug!(lines = self.next_id - 1, "end of input");
                self.eof = true;
                break;
            }
            let payload = line.trim();
            if payload.is_empty() {
                continue;
            }
            let id = DeliveryId(self.next_id);
            self.next_id += 1;
            return Ok(Some(Delivery {
                id,
                payload: payload.as_bytes().to_vec(),
                attempt: 1,
            }));
        }
        Ok(None)
    }

    fn ack(&mut self, _id: DeliveryId) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const WAIT: Duration = Duration::from_millis(1);

    #[test]
    fn test_lines_become_deliveries() {
        let mut consumer = LineConsumer::new(Cursor::new(b"one\n\n  two  \nthree".to_vec()));
        let mut seen = Vec::new();
        while let Some(d) = consumer.receive(WAIT).unwrap() {
            seen.push((d.id.0, String::from_utf8(d.payload).unwrap()));
        }
        assert_eq!(
            seen,
            vec![(1, "one".into()), (2, "two".into()), (3, "three".into())]
        );
        assert!(consumer.is_closed());
        assert!(consumer.receive(WAIT).unwrap().is_none());
    }

    #[test]
    fn test_producer_writes_one_line_per_payload() {
        let producer = LineProducer::new(Vec::new());
        producer.send(b"{\"a\":1}".to_vec()).unwrap();
        producer.send(b"{\"b\":2}".to_vec()).unwrap();
        assert!(matches!(
            producer.send(b"x=1\ny=2".to_vec()),
            Err(CoaError::InvalidArgument(_))
        ));
        assert_eq!(producer.into_inner(), b"{\"a\":1}\n{\"b\":2}\n".to_vec());
    }
}
