//! lbsync worker library.
//!
//! Reconciles the desired configuration of a load balancer (listeners,
//! instances, subnets, security groups) against the provider's live state:
//! - `validation`: request document checks
//! - `diff`: per-dimension desired vs. observed comparison
//! - `reconciler`: ordered apply with stop-on-first-failure
//! - `lifecycle`: request state machine and outcomes
//! - `worker`: bus subscription and per-request tasks

pub mod bus;
pub mod config;
pub mod diff;
pub mod lifecycle;
pub mod model;
pub mod provider;
pub mod reconciler;
pub mod validation;
pub mod worker;

pub use bus::{Message, MessageBus, Subjects};
pub use config::Config;
pub use lifecycle::{Disposition, ErrorKind, Outcome, Processor, RequestLifecycle, Stage};
pub use model::{DesiredState, Listener, ObservedState, Protocol};
pub use provider::{LoadBalancerApi, MemoryProvider, ProviderConnector, ProviderError};
pub use reconciler::{ReconcileError, ReconcileReport, Step};
pub use validation::{validate, ValidationError};
pub use worker::Worker;
