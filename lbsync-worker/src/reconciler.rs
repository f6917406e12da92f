//! Reconciler - applies a plan to one load balancer.
//!
//! Steps run in a fixed order and each later step assumes the earlier ones
//! converged:
//! 1. Security groups (replace-all)
//! 2. Subnets (attach, then detach)
//! 3. Instances (register, then deregister)
//! 4. Listeners (delete removed ports, then create new ones)
//!
//! A step with nothing to do makes no provider call. The first failing call
//! stops the run; steps already applied stay applied.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::diff::Plan;
use crate::model::{DesiredState, ObservedState};
use crate::provider::{LoadBalancerApi, ProviderConnector, ProviderError};

/// Apply steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SecurityGroups,
    Subnets,
    Instances,
    Listeners,
}

impl Step {
    pub const ORDER: [Step; 4] = [
        Step::SecurityGroups,
        Step::Subnets,
        Step::Instances,
        Step::Listeners,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::SecurityGroups => "security groups",
            Step::Subnets => "subnets",
            Step::Instances => "instances",
            Step::Listeners => "listeners",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Zero or several load balancers carry the requested name.
    #[error("Could not find ELB {name} ({matches} matches)")]
    LbNotFound { name: String, matches: usize },

    /// The provider could not describe the load balancer.
    #[error(transparent)]
    Describe(ProviderError),

    /// An apply call failed. Earlier steps remain applied.
    #[error("{step} step failed: {source}")]
    Apply { step: Step, source: ProviderError },
}

/// Steps applied and skipped by one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub applied: Vec<Step>,
    pub skipped: Vec<Step>,
}

/// Result of a successful convergence.
#[derive(Debug, Clone)]
pub struct Convergence {
    pub dns_name: String,
    pub plan: Plan,
    /// `None` for dry runs.
    pub report: Option<ReconcileReport>,
}

/// Fetch the single load balancer named in `desired`.
pub async fn fetch_observed(
    desired: &DesiredState,
    api: &dyn LoadBalancerApi,
) -> Result<ObservedState, ReconcileError> {
    let mut found = api
        .describe(&desired.lb_name)
        .await
        .map_err(ReconcileError::Describe)?;

    match found.len() {
        1 => Ok(found.remove(0)),
        matches => Err(ReconcileError::LbNotFound {
            name: desired.lb_name.clone(),
            matches,
        }),
    }
}

/// Apply the changes needed to move `observed` to `desired`.
pub async fn reconcile(
    desired: &DesiredState,
    observed: &ObservedState,
    api: &dyn LoadBalancerApi,
) -> Result<ReconcileReport, ReconcileError> {
    let plan = Plan::compute(desired, observed);
    apply_plan(&desired.lb_name, &plan, api).await
}

/// Apply a computed plan in step order.
pub async fn apply_plan(
    lb_name: &str,
    plan: &Plan,
    api: &dyn LoadBalancerApi,
) -> Result<ReconcileReport, ReconcileError> {
    let mut report = ReconcileReport::default();

    for step in Step::ORDER {
        if step_is_noop(plan, step) {
            debug!("{}: {} unchanged, skipping", lb_name, step);
            report.skipped.push(step);
            continue;
        }

        info!("{}: applying {}", lb_name, step);
        if let Err(source) = apply_step(lb_name, plan, step, api).await {
            warn!("{}: {} step failed: {}", lb_name, step, source);
            return Err(ReconcileError::Apply { step, source });
        }
        report.applied.push(step);
    }

    Ok(report)
}

fn step_is_noop(plan: &Plan, step: Step) -> bool {
    match step {
        Step::SecurityGroups => plan.security_groups.is_noop(),
        Step::Subnets => plan.subnets.is_noop(),
        Step::Instances => plan.instances.is_noop(),
        Step::Listeners => plan.listeners.is_noop(),
    }
}

async fn apply_step(
    lb_name: &str,
    plan: &Plan,
    step: Step,
    api: &dyn LoadBalancerApi,
) -> Result<(), ProviderError> {
    match step {
        Step::SecurityGroups => {
            api.apply_security_groups(lb_name, &plan.security_groups.group_ids)
                .await
        }
        Step::Subnets => {
            let diff = &plan.subnets;
            if !diff.to_add.is_empty() {
                api.attach_subnets(lb_name, &diff.to_add).await?;
            }
            if !diff.to_remove.is_empty() {
                api.detach_subnets(lb_name, &diff.to_remove).await?;
            }
            Ok(())
        }
        Step::Instances => {
            let diff = &plan.instances;
            if !diff.to_add.is_empty() {
                api.register_instances(lb_name, &diff.to_add).await?;
            }
            if !diff.to_remove.is_empty() {
                api.deregister_instances(lb_name, &diff.to_remove).await?;
            }
            Ok(())
        }
        Step::Listeners => {
            // A reassigned port must be freed before it can be bound again.
            let diff = &plan.listeners;
            if !diff.to_delete.is_empty() {
                api.delete_listeners(lb_name, &diff.to_delete).await?;
            }
            if !diff.to_create.is_empty() {
                api.create_listeners(lb_name, &diff.to_create).await?;
            }
            Ok(())
        }
    }
}

/// Connect, fetch the current state, and converge it to `desired`.
///
/// With `dry_run` the plan is computed and logged but nothing is applied.
pub async fn converge(
    desired: &DesiredState,
    connector: &dyn ProviderConnector,
    dry_run: bool,
) -> Result<Convergence, ReconcileError> {
    let api = connector.connect(&desired.datacenter_identity);
    let observed = fetch_observed(desired, api.as_ref()).await?;
    let plan = Plan::compute(desired, &observed);

    info!(
        "Reconciling {} in {} ({})",
        desired.lb_name, desired.datacenter_identity.region, plan
    );

    if dry_run {
        info!("{}: dry run, not applying", desired.lb_name);
        return Ok(Convergence {
            dns_name: observed.dns_name,
            plan,
            report: None,
        });
    }

    let report = apply_plan(&desired.lb_name, &plan, api.as_ref()).await?;
    Ok(Convergence {
        dns_name: observed.dns_name,
        plan,
        report: Some(report),
    })
}
