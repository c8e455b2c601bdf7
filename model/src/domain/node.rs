use super::resources::ResourceQuantity;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Ready,
    NotReady,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NodeStatus::Ready => write!(f, "Ready"),
            NodeStatus::NotReady => write!(f, "NotReady"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeResources {
    pub capacity:                    ResourceQuantity,
    pub allocatable:                 ResourceQuantity,
    pub requested:                   ResourceQuantity,
    pub limited:                     ResourceQuantity,
    pub allocated:                   ResourceQuantity,
    pub usage:                       ResourceQuantity,
    /// GPU units the device plugin exposes on top of the physical devices
    /// when GPUs are shared between pods.
    pub fractional_gpu_units_in_use: f64,
    /// Shared devices in use plus whole GPUs held through limits.
    pub allocated_gpu_units:         f64,
}

impl NodeResources {
    pub fn unhealthy_gpus(&self) -> f64 {
        (self.capacity.gpus - self.allocatable.gpus).max(0.0)
    }

    pub fn is_unhealthy(&self) -> bool { self.unhealthy_gpus() > 0.0 }
}

/// Resource view of one node, rebuilt on every aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub name:       String,
    /// Comma separated roles, empty when the node has none.
    pub role:       String,
    pub ip_address: String,
    pub status:     NodeStatus,
    pub resources:  NodeResources,
}

impl NodeView {
    pub fn is_ready(&self) -> bool { self.status == NodeStatus::Ready }
}
