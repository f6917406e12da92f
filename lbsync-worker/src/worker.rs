//! Worker - subscribes to request messages and reconciles each one.
//!
//! Every inbound message is handled by its own task. Tasks share nothing
//! but the bus and the provider connector, and run in no particular order.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

use crate::bus::{BusError, MessageBus, Subjects};
use crate::lifecycle::{Disposition, Outcome, Processor};

pub struct Worker {
    bus: Arc<dyn MessageBus>,
    processor: Processor,
    subjects: Subjects,
}

impl Worker {
    pub fn new(bus: Arc<dyn MessageBus>, processor: Processor, subjects: Subjects) -> Self {
        Self {
            bus,
            processor,
            subjects,
        }
    }

    /// Run until the subscription ends, then wait for in-flight requests.
    pub async fn run(&self) -> Result<(), BusError> {
        self.run_until(std::future::pending()).await
    }

    /// Run until the subscription ends or `shutdown` resolves. In-flight
    /// requests are always drained before returning.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<(), BusError> {
        let mut inbound = self.bus.subscribe(&self.subjects.request).await?;
        info!("Listening for {}", self.subjects.request);

        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                msg = inbound.next() => {
                    let Some(msg) = msg else {
                        info!("Subscription ended");
                        break;
                    };
                    debug!("Received {} bytes on {}", msg.payload.len(), msg.subject);
                    let bus = Arc::clone(&self.bus);
                    let processor = self.processor.clone();
                    let subjects = self.subjects.clone();
                    tasks.spawn(async move {
                        let processed = processor.process(&msg.payload).await;
                        publish(bus.as_ref(), &subjects, processed.disposition).await;
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Request task failed: {}", e);
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        if !tasks.is_empty() {
            info!("Waiting for {} in-flight requests", tasks.len());
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Request task failed: {}", e);
            }
        }

        Ok(())
    }
}

/// Publish a processed request on the done or error subject.
async fn publish(bus: &dyn MessageBus, subjects: &Subjects, disposition: Disposition) {
    let (subject, payload) = route(subjects, disposition);
    if let Err(e) = bus.publish(subject, &payload).await {
        error!("Failed to publish on {}: {}", subject, e);
    }
}

/// Pick the subject and payload for a disposition.
fn route(subjects: &Subjects, disposition: Disposition) -> (&str, Vec<u8>) {
    match disposition {
        Disposition::Rejected(raw) => (subjects.error.as_str(), raw),
        Disposition::Finished(outcome) => {
            let subject = match outcome {
                Outcome::Completed(_) => subjects.done.as_str(),
                Outcome::Failed { .. } => subjects.error.as_str(),
            };
            match outcome.encode() {
                Ok(payload) => (subject, payload),
                Err(e) => (
                    subjects.error.as_str(),
                    encode_failure(&outcome.state().request_id, &e),
                ),
            }
        }
    }
}

/// Minimal error document for a result that could not be encoded, so the
/// request is still answered.
fn encode_failure(request_id: &str, e: &serde_json::Error) -> Vec<u8> {
    error!("Failed to encode result for request {}: {}", request_id, e);
    let body = serde_json::json!({
        "request_id": request_id,
        "error_message": format!("Failed to encode result: {e}"),
    });
    body.to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DesiredState;

    fn state(id: &str) -> DesiredState {
        DesiredState {
            request_id: id.to_string(),
            lb_name: "web".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_route_by_outcome() {
        let subjects = Subjects::default();

        let (subject, payload) = route(&subjects, Disposition::Rejected(b"junk".to_vec()));
        assert_eq!(subject, "elb.update.aws.error");
        assert_eq!(payload, b"junk".to_vec());

        let done = Disposition::Finished(Outcome::Completed(state("req-1")));
        let (subject, _) = route(&subjects, done);
        assert_eq!(subject, "elb.update.aws.done");
    }

    #[test]
    fn test_encode_failure_still_answers() {
        let e = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        let payload = encode_failure("req-1", &e);

        let body: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(body["request_id"], "req-1");
        assert!(body["error_message"]
            .as_str()
            .unwrap()
            .starts_with("Failed to encode result:"));
    }
}
