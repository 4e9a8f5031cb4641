// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Consumers: the bounded push protocol between workers and the monitor.
//!
//! Executor workers push `(key, value)` records as they go; a consumer
//! decides what to do with them. The daemon wires a [`QueueConsumer`] in
//! front of the monitor storage so that slow storage never stalls task
//! execution — the queue is bounded, and when it overflows the push fails
//! with a consumption error that the agent logs and drops.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::errors::{Error, Result};
use crate::runtime::Context;

/// A record on its way to the monitor storage.
pub type Record = (String, String);

/// Something that accepts pushed records.
pub trait Consumer: Send + Sync {
    /// Push a record.
    ///
    /// Fails with [`Error::Consumption`] if the consumer cannot accept it.
    fn push(&self, record: Record) -> Result<()>;
}

/// A consumer that simply applies a handler to each record.
pub struct BasicConsumer {
    handler: Box<dyn Fn(Record) -> Result<()> + Send + Sync>,
}

impl BasicConsumer {
    pub fn new(handler: impl Fn(Record) -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }
}

impl Consumer for BasicConsumer {
    fn push(&self, record: Record) -> Result<()> {
        (self.handler)(record)
            .map_err(|error| Error::Consumption(format!("failed to handle a record: {error}")))
    }
}

/// A consumer that buffers records in a bounded queue.
///
/// Call [`QueueConsumer::consume`] somewhere to drain the queue into the
/// handler. Handling failures are logged at the debug level and retried
/// after a backoff; the record is not lost.
pub struct QueueConsumer {
    handler: Box<dyn Fn(Record) -> Result<()> + Send + Sync>,
    backoff: Duration,
    sender: mpsc::Sender<Record>,
    receiver: Mutex<mpsc::Receiver<Record>>,
}

impl QueueConsumer {
    /// Create a consumer with room for `capacity` pending records.
    pub fn new(
        handler: impl Fn(Record) -> Result<()> + Send + Sync + 'static,
        capacity: usize,
        backoff: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            handler: Box::new(handler),
            backoff,
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Run the consumption loop until cancelled.
    pub async fn consume(&self, context: &Context) -> Result<()> {
        let mut receiver = self.receiver.lock().await;
        loop {
            context.checkpoint()?;
            let record = tokio::select! {
                _ = context.cancelled() => {
                    return Err(Error::Interrupted("cancellation requested".into()));
                }
                received = receiver.recv() => match received {
                    Some(record) => record,
                    // every producer hung up
                    None => return Ok(()),
                },
            };
            loop {
                match (self.handler)(record.clone()) {
                    Ok(()) => break,
                    Err(error) => {
                        tracing::debug!("failed to handle a record: {error}");
                        context.sleep(self.backoff).await?;
                    }
                }
            }
        }
    }
}

impl Consumer for QueueConsumer {
    fn push(&self, record: Record) -> Result<()> {
        self.sender
            .try_send(record)
            .map_err(|_| Error::Consumption("the queue is full".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_basic_consumer_wraps_handler_errors() {
        let consumer = BasicConsumer::new(|_| Err(Error::StorageOperation("down".into())));
        let error = consumer.push(("k".into(), "v".into())).unwrap_err();
        assert!(matches!(error, Error::Consumption(_)));
        let fine = BasicConsumer::new(|_| Ok(()));
        assert!(fine.push(("k".into(), "v".into())).is_ok());
    }

    #[test]
    fn test_queue_consumer_rejects_when_full() {
        let consumer = QueueConsumer::new(|_| Ok(()), 2, Duration::from_millis(1));
        consumer.push(("a".into(), "1".into())).unwrap();
        consumer.push(("b".into(), "2".into())).unwrap();
        let error = consumer.push(("c".into(), "3".into())).unwrap_err();
        assert!(matches!(error, Error::Consumption(_)));
    }

    #[tokio::test]
    async fn test_queue_consumer_drains_to_the_handler() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let consumer = Arc::new(QueueConsumer::new(
            move |record: Record| {
                sink.lock().unwrap().push(record.0);
                Ok(())
            },
            8,
            Duration::from_millis(1),
        ));
        consumer.push(("a".into(), "1".into())).unwrap();
        consumer.push(("b".into(), "2".into())).unwrap();
        let context = Context::root();
        let loop_context = context.clone();
        let worker = consumer.clone();
        let handle =
            tokio::spawn(async move { worker.consume(&loop_context).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        context.cancel();
        let outcome = handle.await.unwrap();
        assert!(outcome.unwrap_err().is_interruption());
        assert_eq!(seen.lock().unwrap().as_slice(), ["a", "b"]);
    }
}
