use model::domain::keys::{
    GPU_FRACTION_ANNOTATION, GPU_INDEX_ANNOTATION, ROLE_LABEL,
    ROLE_LABEL_PREFIX,
};
use model::domain::node::{NodeResources, NodeStatus, NodeView};
use model::domain::resources::{PodResourceContribution, ResourceQuantity};
use model::dto::snapshot::{
    ClusterSnapshot, MetricsSample, NodeRecord, PodPhase, PodRecord,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Fraction of a GPU requested through the pod annotation, 0 when absent or
/// unreadable.
pub fn gpu_fraction(pod: &PodRecord) -> f64 {
    pod.annotation(GPU_FRACTION_ANNOTATION)
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|fraction| fraction.is_finite() && *fraction > 0.0)
        .unwrap_or(0.0)
}

pub fn pod_contribution(pod: &PodRecord) -> PodResourceContribution {
    let requests: ResourceQuantity =
        pod.containers.iter().map(|container| container.requests).sum();
    let limited: ResourceQuantity =
        pod.containers.iter().map(|container| container.limits).sum();

    // A fractional pod holds no whole device, the annotation wins.
    let fraction = gpu_fraction(pod);
    let gpus = if fraction > 0.0 { fraction } else { limited.gpus };
    let requested = ResourceQuantity { gpus, ..requests };

    let allocated = if pod.phase == PodPhase::Running {
        requested
    } else {
        ResourceQuantity::zero()
    };

    PodResourceContribution { requested, limited, allocated, gpu_fraction: fraction }
}

/// Roles of a node, sorted and without duplicates.
pub fn node_roles(labels: &BTreeMap<String, String>) -> Vec<String> {
    let mut roles = BTreeSet::new();
    for (key, value) in labels {
        if let Some(role) = key.strip_prefix(ROLE_LABEL_PREFIX) {
            if !role.is_empty() {
                roles.insert(role.to_string());
            }
        } else if key == ROLE_LABEL && !value.is_empty() {
            roles.insert(value.clone());
        }
    }
    roles.into_iter().collect()
}

/// Pods holding resources on the node.
pub fn pods_on_node<'a>(
    node_name: &str,
    pods: &'a [PodRecord],
) -> Vec<&'a PodRecord> {
    pods.iter()
        .filter(|pod| pod.phase.is_active())
        .filter(|pod| pod.node_name.as_deref() == Some(node_name))
        .collect()
}

/// Pods asking for any amount of GPU.
pub fn gpu_pods<'a>(pods: &[&'a PodRecord]) -> Vec<&'a PodRecord> {
    pods.iter()
        .copied()
        .filter(|pod| pod_contribution(pod).requested.gpus > 0.0)
        .collect()
}

fn apply_sample(
    resources: &mut NodeResources,
    sample: &MetricsSample,
    node: &str,
) {
    match sample.used_cpus {
        Some(cpus) => resources.usage.cpus = cpus,
        None => debug!("No CPU usage reported for node {}", node),
    }
    match sample.used_memory {
        Some(memory) => resources.usage.memory = memory,
        None => debug!("No memory usage reported for node {}", node),
    }
    match sample.used_gpus {
        Some(gpus) => resources.usage.gpus = gpus,
        None => debug!("No GPU usage reported for node {}", node),
    }
    match sample.used_gpu_memory {
        Some(memory) => resources.usage.gpu_memory = memory,
        None => debug!("No GPU memory usage reported for node {}", node),
    }
    match sample.total_gpu_memory {
        Some(memory) => resources.capacity.gpu_memory = memory,
        None => debug!("No GPU memory total reported for node {}", node),
    }
}

/// Builds the resource view of a node from its record, the pods scheduled
/// on it and an optional metrics sample.
pub fn aggregate(
    node: &NodeRecord,
    pods: &[&PodRecord],
    metrics: Option<&MetricsSample>,
) -> NodeView {
    let mut resources = NodeResources {
        capacity: node.capacity,
        allocatable: node.allocatable,
        ..NodeResources::default()
    };

    // Shared GPUs are advertised as extra allocatable units.
    if node.allocatable.gpus > node.capacity.gpus {
        resources.fractional_gpu_units_in_use =
            node.allocatable.gpus - node.capacity.gpus;
        resources.capacity.gpus = node.allocatable.gpus;
    }

    let mut shared_devices = HashSet::new();
    for pod in pods {
        let contribution = pod_contribution(pod);
        resources.requested += contribution.requested;
        resources.limited += contribution.limited;
        resources.allocated += contribution.allocated;
        if let Some(index) = pod.annotation(GPU_INDEX_ANNOTATION) {
            shared_devices.insert(index);
        }
    }
    resources.allocated_gpu_units =
        shared_devices.len() as f64 + resources.limited.gpus.trunc();

    match metrics {
        Some(sample) => apply_sample(&mut resources, sample, &node.name),
        None => debug!("Metrics unavailable for node {}", node.name),
    }

    NodeView {
        name: node.name.clone(),
        role: node_roles(&node.labels).join(","),
        ip_address: node
            .internal_ip
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        status: if node.ready {
            NodeStatus::Ready
        } else {
            NodeStatus::NotReady
        },
        resources,
    }
}

pub fn aggregate_cluster(snapshot: &ClusterSnapshot) -> Vec<NodeView> {
    snapshot
        .nodes
        .iter()
        .map(|node| {
            aggregate(
                node,
                &pods_on_node(&node.name, &snapshot.pods),
                snapshot.metrics.get(&node.name),
            )
        })
        .collect()
}
