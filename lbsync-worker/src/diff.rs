//! Desired vs. observed comparison for each load balancer dimension.
//!
//! Every dimension is an independent set difference over a natural identity.
//! Resource counts per load balancer are small, so the comparisons are plain
//! nested scans. Outputs keep first-seen input order and never repeat an
//! identity.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use crate::model::{DesiredState, Listener, ObservedState};

/// Items to add and items to remove for one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDiff<T> {
    pub to_add: Vec<T>,
    pub to_remove: Vec<T>,
}

impl<T> SetDiff<T> {
    /// True when neither side needs a provider call.
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Listener changes. Listeners are identified by `from_port` alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerDiff {
    /// Ports whose listeners must be deleted.
    pub to_delete: Vec<i64>,
    /// Listeners to create after the deletions.
    pub to_create: Vec<Listener>,
}

impl ListenerDiff {
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty()
    }
}

/// Replace-all security group assignment. No diff is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupChange {
    pub group_ids: Vec<String>,
}

impl SecurityGroupChange {
    /// The provider cannot apply an empty group set, so an empty desired
    /// set means the step is skipped.
    pub fn is_noop(&self) -> bool {
        self.group_ids.is_empty()
    }
}

fn unique<T: Eq + Hash + Clone>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert((*item).clone()))
        .cloned()
        .collect()
}

/// Items of `left` not present in `right`.
fn missing_from<T: Eq + Hash + Clone>(left: &[T], right: &[T]) -> Vec<T> {
    unique(left)
        .into_iter()
        .filter(|item| !right.contains(item))
        .collect()
}

/// Instances to register and deregister, keyed by instance ID.
pub fn diff_instances(desired: &[String], observed: &[String]) -> SetDiff<String> {
    SetDiff {
        to_add: missing_from(desired, observed),
        to_remove: missing_from(observed, desired),
    }
}

/// Subnets to attach and detach, keyed by subnet ID.
pub fn diff_subnets(desired: &[String], observed: &[String]) -> SetDiff<String> {
    SetDiff {
        to_add: missing_from(desired, observed),
        to_remove: missing_from(observed, desired),
    }
}

/// Listener changes keyed by `from_port`.
///
/// Changing only the protocol, instance port or certificate of an existing
/// `from_port` is not detected: both sides share the same identity.
pub fn diff_listeners(desired: &[Listener], observed: &[Listener]) -> ListenerDiff {
    let port_in_use = |port: i64| observed.iter().any(|l| l.from_port == port);
    let port_removed = |port: i64| !desired.iter().any(|l| l.from_port == port);

    let mut to_delete: Vec<i64> = Vec::new();
    for listener in observed {
        if port_removed(listener.from_port) && !to_delete.contains(&listener.from_port) {
            to_delete.push(listener.from_port);
        }
    }

    let mut to_create: Vec<Listener> = Vec::new();
    for listener in desired {
        let queued = to_create.iter().any(|l| l.from_port == listener.from_port);
        if !port_in_use(listener.from_port) && !queued {
            to_create.push(listener.clone());
        }
    }

    ListenerDiff {
        to_delete,
        to_create,
    }
}

/// The full group set to apply.
pub fn security_groups(desired: &[String]) -> SecurityGroupChange {
    SecurityGroupChange {
        group_ids: unique(desired),
    }
}

/// All changes needed to converge one load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub security_groups: SecurityGroupChange,
    pub subnets: SetDiff<String>,
    pub instances: SetDiff<String>,
    pub listeners: ListenerDiff,
}

impl Plan {
    pub fn compute(desired: &DesiredState, observed: &ObservedState) -> Self {
        Self {
            security_groups: security_groups(&desired.security_group_ids),
            subnets: diff_subnets(&desired.subnet_ids, &observed.subnet_ids),
            instances: diff_instances(&desired.instance_ids, &observed.instance_ids),
            listeners: diff_listeners(&desired.listeners, &observed.listeners),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.security_groups.is_noop()
            && self.subnets.is_noop()
            && self.instances.is_noop()
            && self.listeners.is_noop()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sgs={}, subnets=+{}/-{}, instances=+{}/-{}, listeners=+{}/-{}",
            self.security_groups.group_ids.len(),
            self.subnets.to_add.len(),
            self.subnets.to_remove.len(),
            self.instances.to_add.len(),
            self.instances.to_remove.len(),
            self.listeners.to_create.len(),
            self.listeners.to_delete.len(),
        )
    }
}
