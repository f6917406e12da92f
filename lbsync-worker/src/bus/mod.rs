//! Message bus collaborator.
//!
//! Requests arrive on one subject; results go to `<subject>.done` and
//! failures to `<subject>.error`. The worker only sees this trait:
//! - `MemoryBus`: in-process, for tests and embedding
//! - `StdioBus`: stdin/stdout lines, the binary's local transport

pub mod memory;
pub mod stdio;

pub use memory::MemoryBus;
pub use stdio::StdioBus;

use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio_stream::Stream;

/// A message on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(subject: &str, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.to_string(),
            payload: payload.into(),
        }
    }
}

/// Inbound messages for one subscription.
pub type MessageStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("subscription already taken")]
    AlreadySubscribed,

    #[error("bus closed")]
    Closed,

    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Subjects used by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    pub request: String,
    pub done: String,
    pub error: String,
}

impl Subjects {
    pub fn from_request(subject: &str) -> Self {
        Self {
            request: subject.to_string(),
            done: format!("{subject}.done"),
            error: format!("{subject}.error"),
        }
    }
}

impl Default for Subjects {
    fn default() -> Self {
        Self::from_request("elb.update.aws")
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Subscribe to inbound messages on `subject`.
    async fn subscribe(&self, subject: &str) -> Result<MessageStream, BusError>;

    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_subjects() {
        let subjects = Subjects::default();
        assert_eq!(subjects.request, "elb.update.aws");
        assert_eq!(subjects.done, "elb.update.aws.done");
        assert_eq!(subjects.error, "elb.update.aws.error");
    }

    #[test]
    fn test_subjects_derive_from_request() {
        let subjects = Subjects::from_request("lb.sync");
        assert_eq!(subjects.done, "lb.sync.done");
        assert_eq!(subjects.error, "lb.sync.error");
    }
}
