//! Request lifecycle.
//!
//! Every inbound payload moves through
//! `Received -> Validated -> Reconciling -> Completed | Failed` exactly once.
//! There is no retry transition: a failed request is reported and dropped.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::model::DesiredState;
use crate::provider::ProviderConnector;
use crate::reconciler::{self, ReconcileError};
use crate::validation::{self, ValidationError};

/// Lifecycle stages of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Reconciling,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    fn can_advance_to(&self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Received, Stage::Validated)
                | (Stage::Received, Stage::Failed)
                | (Stage::Validated, Stage::Reconciling)
                | (Stage::Validated, Stage::Failed)
                | (Stage::Reconciling, Stage::Completed)
                | (Stage::Reconciling, Stage::Failed)
        )
    }
}

/// Rejected stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid request transition: {from:?} -> {to:?}")]
pub struct LifecycleError {
    pub from: Stage,
    pub to: Stage,
}

/// Stage tracker for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLifecycle {
    trail: Vec<Stage>,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            trail: vec![Stage::Received],
        }
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.trail.last().copied().unwrap_or(Stage::Received)
    }

    /// Every stage visited, oldest first.
    pub fn trail(&self) -> &[Stage] {
        &self.trail
    }

    pub fn advance(&mut self, next: Stage) -> Result<(), LifecycleError> {
        let from = self.stage();
        if !from.can_advance_to(next) {
            return Err(LifecycleError { from, to: next });
        }
        self.trail.push(next);
        Ok(())
    }
}

/// Failure classes reported with a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation(ValidationError),
    LbNotFound,
    Provider,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation(e) => write!(f, "validation: {e}"),
            ErrorKind::LbNotFound => write!(f, "lb not found"),
            ErrorKind::Provider => write!(f, "provider"),
        }
    }
}

impl From<&ReconcileError> for ErrorKind {
    fn from(e: &ReconcileError) -> Self {
        match e {
            ReconcileError::LbNotFound { .. } => ErrorKind::LbNotFound,
            ReconcileError::Describe(_) | ReconcileError::Apply { .. } => ErrorKind::Provider,
        }
    }
}

/// Terminal result of a decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Converged. The state carries provider-filled fields such as the DNS name.
    Completed(DesiredState),
    Failed {
        state: DesiredState,
        kind: ErrorKind,
        message: String,
    },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn state(&self) -> &DesiredState {
        match self {
            Outcome::Completed(state) | Outcome::Failed { state, .. } => state,
        }
    }

    /// Serialize for publishing. Only failures carry `error_message`.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Outcome::Completed(state) if state.error_message.is_some() => {
                let mut state = state.clone();
                state.error_message = None;
                state.encode()
            }
            Outcome::Completed(state) => state.encode(),
            Outcome::Failed { state, message, .. } => {
                let mut state = state.clone();
                state.error_message = Some(message.clone());
                state.encode()
            }
        }
    }
}

/// What to publish for an inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The payload was not a request document; it is forwarded unchanged.
    Rejected(Vec<u8>),
    Finished(Outcome),
}

/// A processed request and the stages it went through.
#[derive(Debug, Clone)]
pub struct Processed {
    pub lifecycle: RequestLifecycle,
    pub disposition: Disposition,
}

/// Runs inbound payloads through validation and reconciliation.
#[derive(Clone)]
pub struct Processor {
    connector: Arc<dyn ProviderConnector>,
    dry_run: bool,
}

impl Processor {
    pub fn new(connector: Arc<dyn ProviderConnector>, dry_run: bool) -> Self {
        Self { connector, dry_run }
    }

    pub async fn process(&self, payload: &[u8]) -> Processed {
        let mut lifecycle = RequestLifecycle::new();

        let state = match DesiredState::decode(payload) {
            Ok(state) => state,
            Err(e) => {
                warn!("Discarding malformed request ({} bytes): {}", payload.len(), e);
                return Processed {
                    lifecycle,
                    disposition: Disposition::Rejected(payload.to_vec()),
                };
            }
        };

        let outcome = self.run(&mut lifecycle, state).await;
        Processed {
            lifecycle,
            disposition: Disposition::Finished(outcome),
        }
    }

    async fn run(&self, lifecycle: &mut RequestLifecycle, mut state: DesiredState) -> Outcome {
        info!(
            "Received request {} for load balancer {}",
            state.request_id, state.lb_name
        );

        if let Err(e) = validation::validate(&state) {
            transition(lifecycle, Stage::Failed);
            let kind = ErrorKind::Validation(e);
            warn!("Request {} rejected [{}]", state.request_id, kind);
            return Outcome::Failed {
                state,
                kind,
                message: e.to_string(),
            };
        }
        transition(lifecycle, Stage::Validated);

        transition(lifecycle, Stage::Reconciling);
        match reconciler::converge(&state, self.connector.as_ref(), self.dry_run).await {
            Ok(result) => {
                transition(lifecycle, Stage::Completed);
                info!("Request {} completed ({})", state.request_id, result.plan);
                state.lb_dns_name = Some(result.dns_name);
                state.error_message = None;
                Outcome::Completed(state)
            }
            Err(e) => {
                transition(lifecycle, Stage::Failed);
                let kind = ErrorKind::from(&e);
                error!("Request {} failed [{}]: {}", state.request_id, kind, e);
                Outcome::Failed {
                    state,
                    kind,
                    message: e.to_string(),
                }
            }
        }
    }
}

fn transition(lifecycle: &mut RequestLifecycle, next: Stage) {
    if let Err(e) = lifecycle.advance(next) {
        error!("{}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DatacenterIdentity, Listener, ObservedState};
    use crate::provider::{MemoryProvider, Operation};

    fn request() -> DesiredState {
        DesiredState {
            request_id: "req-1".to_string(),
            batch_id: "batch-1".to_string(),
            provider_type: "aws".to_string(),
            datacenter_identity: DatacenterIdentity {
                vpc_id: "vpc-1".to_string(),
                region: "eu-west-1".to_string(),
                access_key: "key".to_string(),
                access_secret: "secret".to_string(),
            },
            lb_name: "web".to_string(),
            listeners: vec![Listener::new(80, 8080, "HTTP")],
            instance_ids: vec!["i-1".to_string()],
            ..Default::default()
        }
    }

    fn fleet() -> MemoryProvider {
        let provider = MemoryProvider::new();
        provider.insert(
            "eu-west-1",
            ObservedState {
                lb_name: "web".to_string(),
                dns_name: "web.elb.example".to_string(),
                ..Default::default()
            },
        );
        provider
    }

    fn payload(state: &DesiredState) -> Vec<u8> {
        state.encode().unwrap()
    }

    #[test]
    fn test_lifecycle_legal_path() {
        let mut lc = RequestLifecycle::new();
        assert_eq!(lc.stage(), Stage::Received);
        lc.advance(Stage::Validated).unwrap();
        lc.advance(Stage::Reconciling).unwrap();
        lc.advance(Stage::Completed).unwrap();
        assert!(lc.stage().is_terminal());
        assert_eq!(
            lc.trail(),
            &[
                Stage::Received,
                Stage::Validated,
                Stage::Reconciling,
                Stage::Completed
            ]
        );
    }

    #[test]
    fn test_lifecycle_rejects_illegal_transitions() {
        let mut lc = RequestLifecycle::new();
        assert_eq!(
            lc.advance(Stage::Completed),
            Err(LifecycleError {
                from: Stage::Received,
                to: Stage::Completed,
            })
        );
        assert_eq!(lc.stage(), Stage::Received);

        lc.advance(Stage::Failed).unwrap();
        // Terminal: no retry transition.
        assert!(lc.advance(Stage::Validated).is_err());
        assert!(lc.advance(Stage::Reconciling).is_err());
    }

    #[test]
    fn test_completed_outcome_drops_stale_error() {
        let mut state = request();
        state.error_message = Some("Could not find ELB web (0 matches)".to_string());

        let encoded: serde_json::Value =
            serde_json::from_slice(&Outcome::Completed(state).encode().unwrap()).unwrap();
        assert!(encoded.get("error_message").is_none());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(
            ErrorKind::Validation(ValidationError::InvalidProtocol).to_string(),
            "validation: ELB protocol invalid"
        );
        assert_eq!(ErrorKind::LbNotFound.to_string(), "lb not found");
        assert_eq!(ErrorKind::Provider.to_string(), "provider");
    }

    #[tokio::test]
    async fn test_process_completes_with_dns_name() {
        let provider = fleet();
        let processor = Processor::new(Arc::new(provider.clone()), false);

        let processed = processor.process(&payload(&request())).await;
        assert_eq!(processed.lifecycle.stage(), Stage::Completed);

        let Disposition::Finished(Outcome::Completed(state)) = processed.disposition else {
            panic!("expected completion");
        };
        assert_eq!(state.lb_dns_name.as_deref(), Some("web.elb.example"));
        assert_eq!(state.error_message, None);
        assert_eq!(state.request_id, "req-1");

        let lb = provider.get("eu-west-1", "web").unwrap();
        assert_eq!(lb.instance_ids, vec!["i-1".to_string()]);
    }

    #[tokio::test]
    async fn test_process_malformed_payload() {
        let provider = fleet();
        let processor = Processor::new(Arc::new(provider.clone()), false);

        let raw = b"{not json".to_vec();
        let processed = processor.process(&raw).await;
        assert_eq!(processed.disposition, Disposition::Rejected(raw));
        assert_eq!(processed.lifecycle.trail(), &[Stage::Received]);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_process_validation_failure() {
        let provider = fleet();
        let processor = Processor::new(Arc::new(provider.clone()), false);

        let mut bad = request();
        bad.listeners[0].protocol = "UDP".to_string();
        let processed = processor.process(&payload(&bad)).await;

        assert_eq!(
            processed.lifecycle.trail(),
            &[Stage::Received, Stage::Failed]
        );
        let Disposition::Finished(outcome) = processed.disposition else {
            panic!("expected outcome");
        };
        assert_eq!(
            outcome,
            Outcome::Failed {
                state: bad,
                kind: ErrorKind::Validation(ValidationError::InvalidProtocol),
                message: "ELB protocol invalid".to_string(),
            }
        );
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_process_lb_not_found() {
        let processor = Processor::new(Arc::new(MemoryProvider::new()), false);

        let processed = processor.process(&payload(&request())).await;
        assert_eq!(
            processed.lifecycle.trail(),
            &[
                Stage::Received,
                Stage::Validated,
                Stage::Reconciling,
                Stage::Failed
            ]
        );
        let Disposition::Finished(Outcome::Failed { kind, .. }) = processed.disposition else {
            panic!("expected failure");
        };
        assert_eq!(kind, ErrorKind::LbNotFound);
    }

    #[tokio::test]
    async fn test_process_apply_failure_message() {
        let provider = fleet();
        provider.fail_on(Operation::RegisterInstances, "Throttling: rate exceeded");
        let processor = Processor::new(Arc::new(provider), false);

        let processed = processor.process(&payload(&request())).await;
        let Disposition::Finished(outcome) = processed.disposition else {
            panic!("expected outcome");
        };
        assert!(!outcome.is_completed());

        let encoded: serde_json::Value =
            serde_json::from_slice(&outcome.encode().unwrap()).unwrap();
        let message = encoded["error_message"].as_str().unwrap();
        assert!(message.contains("Throttling: rate exceeded"));
        assert_eq!(encoded["request_id"], "req-1");
    }

    #[tokio::test]
    async fn test_process_dry_run_leaves_fleet_untouched() {
        let provider = fleet();
        let processor = Processor::new(Arc::new(provider.clone()), true);

        let processed = processor.process(&payload(&request())).await;
        assert_eq!(processed.lifecycle.stage(), Stage::Completed);
        assert_eq!(provider.operations(), vec![Operation::Describe]);
        assert!(provider
            .get("eu-west-1", "web")
            .unwrap()
            .instance_ids
            .is_empty());
    }
}
