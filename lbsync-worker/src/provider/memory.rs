//! In-process load balancer fleet.
//!
//! Stands in for the cloud provider: load balancers are kept per region,
//! every call is journaled, and any operation can be made to fail. The
//! fleet can be seeded from a JSON file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::{LoadBalancerApi, Operation, ProviderConnector, ProviderError, Result};
use crate::model::{DatacenterIdentity, Listener, ObservedState};

/// Errors reading a fleet file.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("failed to read fleet file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid fleet file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Credentials accepted by the fleet.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub access_key: String,
    pub access_secret: String,
}

/// A load balancer entry in a fleet file.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetEntry {
    pub region: String,
    #[serde(flatten)]
    pub state: ObservedState,
}

/// On-disk fleet description.
///
/// ```json
/// {
///   "accounts": [{"access_key": "AKIA...", "access_secret": "..."}],
///   "load_balancers": [
///     {"region": "eu-west-1", "lb_name": "web", "instance_ids": ["i-1"]}
///   ]
/// }
/// ```
///
/// With no accounts, any credentials are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetFile {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub load_balancers: Vec<FleetEntry>,
}

impl FleetFile {
    pub async fn load(path: &Path) -> std::result::Result<Self, FleetError> {
        let display = path.display().to_string();
        let data = tokio::fs::read(path).await.map_err(|source| FleetError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| FleetError::Parse {
            path: display,
            source,
        })
    }
}

/// A journaled provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub region: String,
    pub lb_name: String,
    pub operation: Operation,
    pub args: Vec<String>,
}

#[derive(Default)]
struct Fleet {
    /// region -> load balancers. Names are not unique on purpose so that
    /// ambiguous lookups can be represented.
    regions: HashMap<String, Vec<ObservedState>>,
    accounts: Vec<Account>,
    failures: HashMap<Operation, String>,
    journal: Vec<Call>,
}

/// Shared in-memory fleet. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    fleet: Arc<Mutex<Fleet>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fleet(file: FleetFile) -> Self {
        let provider = Self::new();
        {
            let mut fleet = provider.lock();
            fleet.accounts = file.accounts;
        }
        for entry in file.load_balancers {
            provider.insert(&entry.region, entry.state);
        }
        provider
    }

    fn lock(&self) -> MutexGuard<'_, Fleet> {
        self.fleet.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a load balancer. A missing DNS name is generated.
    pub fn insert(&self, region: &str, mut state: ObservedState) {
        if state.dns_name.is_empty() {
            state.dns_name = format!(
                "{}-{}.{}.elb.amazonaws.com",
                state.lb_name,
                Uuid::new_v4().simple(),
                region
            );
        }
        self.lock()
            .regions
            .entry(region.to_string())
            .or_default()
            .push(state);
    }

    /// Only accept these credentials from now on.
    pub fn add_account(&self, access_key: &str, access_secret: &str) {
        self.lock().accounts.push(Account {
            access_key: access_key.to_string(),
            access_secret: access_secret.to_string(),
        });
    }

    /// Make every future `operation` call fail with `message`.
    pub fn fail_on(&self, operation: Operation, message: &str) {
        self.lock().failures.insert(operation, message.to_string());
    }

    /// Current state of a load balancer (first match).
    pub fn get(&self, region: &str, lb_name: &str) -> Option<ObservedState> {
        self.lock()
            .regions
            .get(region)
            .and_then(|lbs| lbs.iter().find(|lb| lb.lb_name == lb_name))
            .cloned()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().journal.clone()
    }

    /// Operations called so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().journal.iter().map(|c| c.operation).collect()
    }

    fn authorized(&self, identity: &DatacenterIdentity) -> bool {
        let fleet = self.lock();
        fleet.accounts.is_empty()
            || fleet.accounts.iter().any(|a| {
                a.access_key == identity.access_key && a.access_secret == identity.access_secret
            })
    }
}

impl ProviderConnector for MemoryProvider {
    fn connect(&self, identity: &DatacenterIdentity) -> Box<dyn LoadBalancerApi> {
        Box::new(MemoryHandle {
            provider: self.clone(),
            region: identity.region.clone(),
            authorized: self.authorized(identity),
        })
    }
}

/// Request-scoped view of the fleet.
struct MemoryHandle {
    provider: MemoryProvider,
    region: String,
    authorized: bool,
}

impl MemoryHandle {
    /// Journal the call, then apply `f` to the named load balancer unless an
    /// injected failure, bad credentials or a missing load balancer stop it.
    fn call<T>(
        &self,
        operation: Operation,
        lb_name: &str,
        args: Vec<String>,
        f: impl FnOnce(&mut ObservedState) -> Result<T>,
    ) -> Result<T> {
        debug!(
            "memory provider: {} {} in {} {:?}",
            operation, lb_name, self.region, args
        );
        let mut fleet = self.provider.lock();
        fleet.journal.push(Call {
            region: self.region.clone(),
            lb_name: lb_name.to_string(),
            operation,
            args,
        });

        if !self.authorized {
            return Err(ProviderError::new(
                operation,
                "InvalidClientTokenId: the security token included in the request is invalid",
            ));
        }

        if let Some(message) = fleet.failures.get(&operation) {
            return Err(ProviderError::new(operation, message.clone()));
        }

        let lb = fleet
            .regions
            .get_mut(&self.region)
            .and_then(|lbs| lbs.iter_mut().find(|lb| lb.lb_name == lb_name))
            .ok_or_else(|| {
                ProviderError::new(
                    operation,
                    format!("LoadBalancerNotFound: cannot find load balancer {}", lb_name),
                )
            })?;

        f(lb)
    }
}

fn add_missing(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn remove_all(target: &mut Vec<String>, items: &[String]) {
    target.retain(|existing| !items.contains(existing));
}

#[async_trait]
impl LoadBalancerApi for MemoryHandle {
    async fn describe(&self, lb_name: &str) -> Result<Vec<ObservedState>> {
        debug!("memory provider: describe {} in {}", lb_name, self.region);
        let mut fleet = self.provider.lock();
        fleet.journal.push(Call {
            region: self.region.clone(),
            lb_name: lb_name.to_string(),
            operation: Operation::Describe,
            args: vec![],
        });

        if !self.authorized {
            return Err(ProviderError::new(
                Operation::Describe,
                "InvalidClientTokenId: the security token included in the request is invalid",
            ));
        }

        if let Some(message) = fleet.failures.get(&Operation::Describe) {
            return Err(ProviderError::new(Operation::Describe, message.clone()));
        }

        Ok(fleet
            .regions
            .get(&self.region)
            .map(|lbs| {
                lbs.iter()
                    .filter(|lb| lb.lb_name == lb_name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn apply_security_groups(&self, lb_name: &str, group_ids: &[String]) -> Result<()> {
        self.call(
            Operation::ApplySecurityGroups,
            lb_name,
            group_ids.to_vec(),
            |lb| {
                lb.security_group_ids = group_ids.to_vec();
                Ok(())
            },
        )
    }

    async fn attach_subnets(&self, lb_name: &str, subnet_ids: &[String]) -> Result<()> {
        self.call(Operation::AttachSubnets, lb_name, subnet_ids.to_vec(), |lb| {
            add_missing(&mut lb.subnet_ids, subnet_ids);
            Ok(())
        })
    }

    async fn detach_subnets(&self, lb_name: &str, subnet_ids: &[String]) -> Result<()> {
        self.call(Operation::DetachSubnets, lb_name, subnet_ids.to_vec(), |lb| {
            remove_all(&mut lb.subnet_ids, subnet_ids);
            Ok(())
        })
    }

    async fn register_instances(&self, lb_name: &str, instance_ids: &[String]) -> Result<()> {
        self.call(
            Operation::RegisterInstances,
            lb_name,
            instance_ids.to_vec(),
            |lb| {
                add_missing(&mut lb.instance_ids, instance_ids);
                Ok(())
            },
        )
    }

    async fn deregister_instances(&self, lb_name: &str, instance_ids: &[String]) -> Result<()> {
        self.call(
            Operation::DeregisterInstances,
            lb_name,
            instance_ids.to_vec(),
            |lb| {
                remove_all(&mut lb.instance_ids, instance_ids);
                Ok(())
            },
        )
    }

    async fn create_listeners(&self, lb_name: &str, listeners: &[Listener]) -> Result<()> {
        let args = listeners.iter().map(|l| l.to_string()).collect();
        self.call(Operation::CreateListeners, lb_name, args, |lb| {
            // The whole call is rejected if any port is already bound.
            if let Some(dup) = listeners
                .iter()
                .find(|new| lb.listeners.iter().any(|l| l.from_port == new.from_port))
            {
                return Err(ProviderError::new(
                    Operation::CreateListeners,
                    format!(
                        "DuplicateListener: a listener already exists for {} with port {}",
                        lb.lb_name, dup.from_port
                    ),
                ));
            }
            lb.listeners.extend(listeners.iter().cloned());
            Ok(())
        })
    }

    async fn delete_listeners(&self, lb_name: &str, ports: &[i64]) -> Result<()> {
        let args = ports.iter().map(|p| p.to_string()).collect();
        self.call(Operation::DeleteListeners, lb_name, args, |lb| {
            lb.listeners.retain(|l| !ports.contains(&l.from_port));
            Ok(())
        })
    }
}
