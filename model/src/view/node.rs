use crate::domain::node::{NodeStatus, NodeView};
use helper::uom_helper::cpu_ratio::cpu;
use serde::Serialize;
use uom::si::information::byte;

/// CPU figures of a node, in cores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeCpuView {
    pub capacity:    f64,
    pub allocatable: f64,
    pub requested:   f64,
    pub usage:       f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeGpuView {
    pub capacity:           f64,
    pub allocatable:        f64,
    pub unhealthy:          f64,
    pub allocated_units:    f64,
    pub allocated_fraction: f64,
    pub usage:              f64,
}

/// Memory figures of a node, in bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeMemoryView {
    pub capacity:    f64,
    pub allocatable: f64,
    pub requested:   f64,
    pub usage:       f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeGpuMemoryView {
    pub capacity: f64,
    pub usage:    f64,
}

/// One line of `top node`, also the JSON and YAML shape of a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRow {
    pub name:       String,
    pub role:       String,
    pub ip_address: String,
    pub status:     NodeStatus,
    pub cpu:        NodeCpuView,
    pub gpu:        NodeGpuView,
    pub memory:     NodeMemoryView,
    pub gpu_memory: NodeGpuMemoryView,
}

impl From<&NodeView> for NodeRow {
    fn from(node: &NodeView) -> Self {
        let res = &node.resources;
        Self {
            name:       node.name.clone(),
            role:       if node.role.is_empty() {
                "<none>".to_string()
            } else {
                node.role.clone()
            },
            ip_address: node.ip_address.clone(),
            status:     node.status,
            cpu:        NodeCpuView {
                capacity:    res.capacity.cpus.get::<cpu>(),
                allocatable: res.allocatable.cpus.get::<cpu>(),
                requested:   res.requested.cpus.get::<cpu>(),
                usage:       res.usage.cpus.get::<cpu>(),
            },
            gpu:        NodeGpuView {
                capacity:           res.capacity.gpus,
                allocatable:        res.allocatable.gpus,
                unhealthy:          res.unhealthy_gpus(),
                allocated_units:    res.allocated_gpu_units,
                allocated_fraction: res.allocated.gpus,
                usage:              res.usage.gpus,
            },
            memory:     NodeMemoryView {
                capacity:    res.capacity.memory.get::<byte>(),
                allocatable: res.allocatable.memory.get::<byte>(),
                requested:   res.requested.memory.get::<byte>(),
                usage:       res.usage.memory.get::<byte>(),
            },
            gpu_memory: NodeGpuMemoryView {
                capacity: res.capacity.gpu_memory.get::<byte>(),
                usage:    res.usage.gpu_memory.get::<byte>(),
            },
        }
    }
}

/// GPU totals over the whole cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterNodesView {
    pub nodes:                         usize,
    pub gpus:                          f64,
    pub allocated_gpus:                f64,
    pub unhealthy_gpus:                f64,
    pub gpus_on_ready_nodes:           f64,
    pub allocated_gpus_on_ready_nodes: f64,
}

impl ClusterNodesView {
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a NodeView>) -> Self {
        let mut view = Self::default();
        for node in nodes {
            view.add_node(node);
        }
        view
    }

    pub fn add_node(&mut self, node: &NodeView) {
        let res = &node.resources;
        self.nodes += 1;
        self.gpus += res.capacity.gpus;
        self.allocated_gpus += res.allocated.gpus;
        self.unhealthy_gpus += res.unhealthy_gpus();
        if node.is_ready() {
            self.gpus_on_ready_nodes += res.capacity.gpus;
            self.allocated_gpus_on_ready_nodes += res.allocated.gpus;
        }
    }

    pub fn allocated_percent(&self) -> u32 { percent(self.allocated_gpus, self.gpus) }

    pub fn allocated_on_ready_percent(&self) -> u32 {
        percent(
            self.allocated_gpus_on_ready_nodes,
            self.gpus_on_ready_nodes,
        )
    }

    /// Whether some GPUs sit on nodes that are not ready.
    pub fn has_inactive_gpus(&self) -> bool {
        self.gpus_on_ready_nodes < self.gpus
    }
}

/// A pod holding GPUs, listed under its node by `top node --details`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeGpuPodRow {
    pub name:           String,
    pub namespace:      String,
    pub phase:          String,
    pub requested_gpus: f64,
    pub allocated_gpus: f64,
}

fn percent(part: f64, total: f64) -> u32 {
    if total <= 0.0 {
        0
    } else {
        (part / total * 100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::NodeResources;
    use crate::domain::resources::ResourceQuantity;

    fn node(status: NodeStatus, gpus: f64, allocated: f64) -> NodeView {
        NodeView {
            name:       "node".to_string(),
            role:       String::new(),
            ip_address: "10.0.0.1".to_string(),
            status,
            resources:  NodeResources {
                capacity: ResourceQuantity { gpus, ..Default::default() },
                allocatable: ResourceQuantity { gpus, ..Default::default() },
                allocated: ResourceQuantity {
                    gpus: allocated,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_cluster_totals() {
        let view = ClusterNodesView::from_nodes(&[
            node(NodeStatus::Ready, 4.0, 3.0),
            node(NodeStatus::Ready, 2.0, 0.5),
            node(NodeStatus::NotReady, 2.0, 0.0),
        ]);

        assert_eq!(view.nodes, 3);
        assert_eq!(view.gpus, 8.0);
        assert_eq!(view.allocated_gpus, 3.5);
        assert_eq!(view.allocated_percent(), 44);
        assert_eq!(view.gpus_on_ready_nodes, 6.0);
        assert_eq!(view.allocated_on_ready_percent(), 58);
        assert!(view.has_inactive_gpus());
    }

    #[test]
    fn test_row_defaults_role() {
        let row = NodeRow::from(&node(NodeStatus::Ready, 1.0, 0.0));
        assert_eq!(row.role, "<none>");
        assert_eq!(row.gpu.unhealthy, 0.0);
    }
}
