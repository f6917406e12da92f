//! In-process bus backed by tokio channels.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::{BusError, Message, MessageBus, MessageStream};

/// Single-subscriber in-memory bus.
///
/// Messages injected with [`MemoryBus::inject`] are delivered to the
/// subscriber; published messages are recorded for inspection.
pub struct MemoryBus {
    inbound_tx: Mutex<Option<mpsc::Sender<Message>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    published: Mutex<Vec<Message>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: Mutex::new(Some(rx)),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Deliver a message to the subscriber.
    pub async fn inject(&self, subject: &str, payload: impl Into<Vec<u8>>) -> Result<(), BusError> {
        let tx = lock(&self.inbound_tx).clone().ok_or(BusError::Closed)?;
        tx.send(Message::new(subject, payload))
            .await
            .map_err(|_| BusError::Closed)
    }

    /// Stop accepting injections. The subscription ends once drained.
    pub fn close(&self) {
        lock(&self.inbound_tx).take();
    }

    /// Messages published so far, in order.
    pub fn published(&self) -> Vec<Message> {
        lock(&self.published).clone()
    }

    /// Messages published on `subject`.
    pub fn published_on(&self, subject: &str) -> Vec<Message> {
        lock(&self.published)
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn subscribe(&self, subject: &str) -> Result<MessageStream, BusError> {
        let rx = lock(&self.inbound_rx)
            .take()
            .ok_or(BusError::AlreadySubscribed)?;
        let subject = subject.to_string();
        Ok(Box::pin(
            ReceiverStream::new(rx).filter(move |m| m.subject == subject),
        ))
    }

    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), BusError> {
        lock(&self.published).push(Message::new(subject, payload));
        Ok(())
    }
}
