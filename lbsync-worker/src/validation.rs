//! Request document validation.
//!
//! Checks run in a fixed order and the first failure wins, so a document
//! with several problems always reports the same one.

use thiserror::Error;

use crate::model::{DesiredState, Listener};

const MIN_PORT: i64 = 1;
const MAX_PORT: i64 = 65535;

/// A violated request invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Datacenter VPC ID invalid")]
    InvalidDatacenterId,

    #[error("Datacenter Region invalid")]
    InvalidRegion,

    #[error("Datacenter credentials invalid")]
    InvalidCredentials,

    #[error("ELB name is invalid")]
    InvalidLbName,

    #[error("ELB protocol invalid")]
    InvalidProtocol,

    #[error("ELB from port invalid")]
    InvalidFromPort,

    #[error("ELB to port invalid")]
    InvalidToPort,
}

/// Validate a desired state document.
pub fn validate(state: &DesiredState) -> Result<(), ValidationError> {
    let dc = &state.datacenter_identity;

    if dc.vpc_id.is_empty() {
        return Err(ValidationError::InvalidDatacenterId);
    }

    if dc.region.is_empty() {
        return Err(ValidationError::InvalidRegion);
    }

    if dc.access_key.is_empty() || dc.access_secret.is_empty() {
        return Err(ValidationError::InvalidCredentials);
    }

    if state.lb_name.is_empty() {
        return Err(ValidationError::InvalidLbName);
    }

    state.listeners.iter().try_for_each(validate_listener)
}

fn validate_listener(listener: &Listener) -> Result<(), ValidationError> {
    if listener.protocol.is_empty() {
        return Err(ValidationError::InvalidProtocol);
    }

    if !(MIN_PORT..=MAX_PORT).contains(&listener.from_port) {
        return Err(ValidationError::InvalidFromPort);
    }

    if !(MIN_PORT..=MAX_PORT).contains(&listener.to_port) {
        return Err(ValidationError::InvalidToPort);
    }

    if listener.protocol().is_none() {
        return Err(ValidationError::InvalidProtocol);
    }

    Ok(())
}
