//! Desired and observed load balancer state.
//!
//! `DesiredState` is the document carried on the message bus. It is decoded
//! once per inbound message, validated, handed to exactly one reconciliation
//! and then republished on the done or error subject.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Listener protocols accepted by the load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    Ssl,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Tcp => "TCP",
            Protocol::Ssl => "SSL",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP" => Ok(Protocol::Http),
            "HTTPS" => Ok(Protocol::Https),
            "TCP" => Ok(Protocol::Tcp),
            "SSL" => Ok(Protocol::Ssl),
            _ => Err(()),
        }
    }
}

/// A load balancer listener (a "port" in request documents).
///
/// Ports are kept wider than `u16` so that out-of-range values survive
/// decoding and are rejected by validation with a specific error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    /// Load-balancer-side port. This is the listener's identity.
    pub from_port: i64,
    /// Instance-side port.
    pub to_port: i64,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert_id: Option<String>,
}

impl Listener {
    pub fn new(from_port: i64, to_port: i64, protocol: &str) -> Self {
        Self {
            from_port,
            to_port,
            protocol: protocol.to_string(),
            ssl_cert_id: None,
        }
    }

    /// Parsed protocol, if it is one of the supported values.
    pub fn protocol(&self) -> Option<Protocol> {
        self.protocol.parse().ok()
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}->{}", self.protocol, self.from_port, self.to_port)
    }
}

/// Where the load balancer lives and how to reach the provider.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterIdentity {
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub access_secret: String,
}

impl fmt::Debug for DatacenterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatacenterIdentity")
            .field("vpc_id", &self.vpc_id)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("access_secret", &"<redacted>")
            .finish()
    }
}

/// Target configuration of one load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub batch_id: String,
    #[serde(default)]
    pub provider_type: String,
    #[serde(default)]
    pub datacenter_identity: DatacenterIdentity,
    #[serde(default)]
    pub lb_name: String,
    #[serde(default)]
    pub lb_is_private: bool,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    /// Filled in from the provider on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lb_dns_name: Option<String>,
    #[serde(default)]
    pub instance_ids: Vec<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DesiredState {
    /// Decode a request document.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Encode the document for publishing.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// The provider's current description of a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub lb_name: String,
    #[serde(default)]
    pub dns_name: String,
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default)]
    pub instance_ids: Vec<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
}
