//! Test helpers for lbsync-worker integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use lbsync_worker::bus::{MemoryBus, Message};
use lbsync_worker::model::{DatacenterIdentity, DesiredState, Listener, ObservedState};
use lbsync_worker::provider::MemoryProvider;
use lbsync_worker::{Processor, Subjects, Worker};

pub const REGION: &str = "eu-west-1";

pub fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A valid request for the `web` load balancer.
pub fn request(request_id: &str) -> DesiredState {
    DesiredState {
        request_id: request_id.to_string(),
        batch_id: "batch-1".to_string(),
        provider_type: "aws".to_string(),
        datacenter_identity: DatacenterIdentity {
            vpc_id: "vpc-1".to_string(),
            region: REGION.to_string(),
            access_key: "key".to_string(),
            access_secret: "secret".to_string(),
        },
        lb_name: "web".to_string(),
        lb_is_private: false,
        listeners: vec![Listener::new(80, 8080, "HTTP")],
        instance_ids: ids(&["i-1", "i-2"]),
        subnet_ids: ids(&["subnet-a"]),
        security_group_ids: ids(&["sg-1"]),
        ..Default::default()
    }
}

/// The `web` load balancer as the provider currently sees it.
pub fn observed(name: &str) -> ObservedState {
    ObservedState {
        lb_name: name.to_string(),
        dns_name: format!("{name}.elb.example"),
        listeners: vec![Listener::new(80, 8080, "HTTP")],
        instance_ids: ids(&["i-2", "i-3"]),
        subnet_ids: ids(&["subnet-a"]),
        security_group_ids: ids(&["sg-0"]),
    }
}

/// A worker wired to an in-memory bus and fleet.
pub struct TestWorker {
    pub bus: Arc<MemoryBus>,
    pub provider: MemoryProvider,
    pub subjects: Subjects,
    worker: Worker,
}

impl TestWorker {
    pub fn new(provider: MemoryProvider) -> Self {
        let bus = Arc::new(MemoryBus::new(64));
        let subjects = Subjects::default();
        let processor = Processor::new(Arc::new(provider.clone()), false);
        let worker = Worker::new(bus.clone(), processor, subjects.clone());
        Self {
            bus,
            provider,
            subjects,
            worker,
        }
    }

    /// Send raw payloads, close the bus, and run the worker to completion.
    pub async fn run(&self, payloads: Vec<Vec<u8>>) -> Vec<Message> {
        for payload in payloads {
            self.bus
                .inject(&self.subjects.request, payload)
                .await
                .unwrap();
        }
        self.bus.close();
        self.worker.run().await.unwrap();
        self.bus.published()
    }
}
