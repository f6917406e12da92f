//! Cloud provider collaborator surface.
//!
//! The reconciler only talks to the provider through these traits:
//! - `ProviderConnector`: builds a handle scoped to one request's region
//!   and credentials
//! - `LoadBalancerApi`: describe plus the apply calls, one per resource class

pub mod memory;

pub use memory::{FleetFile, MemoryProvider};

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{DatacenterIdentity, Listener, ObservedState};

/// Provider calls, used for error reporting and the memory provider journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Describe,
    ApplySecurityGroups,
    AttachSubnets,
    DetachSubnets,
    RegisterInstances,
    DeregisterInstances,
    CreateListeners,
    DeleteListeners,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Describe => "describe",
            Operation::ApplySecurityGroups => "apply_security_groups",
            Operation::AttachSubnets => "attach_subnets",
            Operation::DetachSubnets => "detach_subnets",
            Operation::RegisterInstances => "register_instances",
            Operation::DeregisterInstances => "deregister_instances",
            Operation::CreateListeners => "create_listeners",
            Operation::DeleteListeners => "delete_listeners",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed provider call. The message is the provider's own error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct ProviderError {
    pub operation: Operation,
    pub message: String,
}

impl ProviderError {
    pub fn new(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Result type for provider calls.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Load balancer management calls for one region and account.
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// All load balancers matching `lb_name`. Callers decide what a count
    /// other than one means.
    async fn describe(&self, lb_name: &str) -> Result<Vec<ObservedState>>;

    /// Replace the full security group set.
    async fn apply_security_groups(&self, lb_name: &str, group_ids: &[String]) -> Result<()>;

    async fn attach_subnets(&self, lb_name: &str, subnet_ids: &[String]) -> Result<()>;

    async fn detach_subnets(&self, lb_name: &str, subnet_ids: &[String]) -> Result<()>;

    async fn register_instances(&self, lb_name: &str, instance_ids: &[String]) -> Result<()>;

    async fn deregister_instances(&self, lb_name: &str, instance_ids: &[String]) -> Result<()>;

    async fn create_listeners(&self, lb_name: &str, listeners: &[Listener]) -> Result<()>;

    /// Delete listeners by load-balancer-side port.
    async fn delete_listeners(&self, lb_name: &str, ports: &[i64]) -> Result<()>;
}

/// Builds request-scoped provider handles.
pub trait ProviderConnector: Send + Sync {
    fn connect(&self, identity: &DatacenterIdentity) -> Box<dyn LoadBalancerApi>;
}
