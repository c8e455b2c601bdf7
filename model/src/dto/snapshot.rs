//! Plain records read from the cluster in one pass. Every view is computed
//! from a [`ClusterSnapshot`], nothing is fetched lazily.

use crate::domain::job::WorkloadKind;
use crate::domain::resources::ResourceQuantity;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use uom::si::f64::{Information, Ratio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl PodPhase {
    /// Succeeded and Failed pods no longer hold resources on their node.
    pub fn is_active(&self) -> bool {
        !matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl FromStr for PodPhase {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        })
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let phase = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        write!(f, "{phase}")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeRecord {
    pub name:        String,
    pub labels:      BTreeMap<String, String>,
    pub internal_ip: Option<String>,
    pub ready:       bool,
    pub capacity:    ResourceQuantity,
    pub allocatable: ResourceQuantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OwnerRecord {
    pub kind: String,
    pub name: String,
    pub uid:  String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerRecord {
    pub name:     String,
    pub image:    Option<String>,
    pub requests: ResourceQuantity,
    pub limits:   ResourceQuantity,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PodRecord {
    pub name:                String,
    pub namespace:           String,
    pub node_name:           Option<String>,
    pub host_ip:             Option<String>,
    pub phase:               PodPhase,
    pub labels:              BTreeMap<String, String>,
    pub annotations:         BTreeMap<String, String>,
    pub owners:              Vec<OwnerRecord>,
    pub scheduler_name:      Option<String>,
    pub containers:          Vec<ContainerRecord>,
    /// Reasons of the containers currently in the Waiting state, in
    /// container status order.
    pub waiting_reasons:     Vec<String>,
    pub created_at:          Option<DateTime<Utc>>,
    pub initialized_at:      Option<DateTime<Utc>>,
    pub ready_transition_at: Option<DateTime<Utc>>,
}

impl PodRecord {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn owner(&self, kind: &str) -> Option<&OwnerRecord> {
        self.owners.iter().find(|owner| owner.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobRecord {
    pub kind:        WorkloadKind,
    pub name:        String,
    pub namespace:   String,
    pub uid:         String,
    pub labels:      BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub created_at:  Option<DateTime<Utc>>,
    /// Set once a deletion timestamp is present.
    pub deleted:     bool,
    /// Containers of the pod template.
    pub template:    Vec<ContainerRecord>,
}

/// Usage reported by the metrics backend for one node. Each value may be
/// missing on its own.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSample {
    pub used_cpus:        Option<Ratio>,
    pub used_memory:      Option<Information>,
    pub used_gpus:        Option<f64>,
    pub used_gpu_memory:  Option<Information>,
    pub total_gpu_memory: Option<Information>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSnapshot {
    pub nodes:    Vec<NodeRecord>,
    pub pods:     Vec<PodRecord>,
    pub jobs:     Vec<JobRecord>,
    /// Keyed by node name.
    pub metrics:  HashMap<String, MetricsSample>,
    pub taken_at: DateTime<Utc>,
}

impl ClusterSnapshot {
    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        Self {
            nodes: Vec::new(),
            pods: Vec::new(),
            jobs: Vec::new(),
            metrics: HashMap::new(),
            taken_at,
        }
    }
}
