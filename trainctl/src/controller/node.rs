use crate::output::{fmt_gpus, OutputFormatter};
use crate::repository::k8s::ClusterReader;
use crate::repository::metrics::MetricsSource;
use crate::service::aggregator::{
    aggregate_cluster, gpu_pods, pod_contribution, pods_on_node,
};
use anyhow::{Context, Result};
use model::dto::snapshot::ClusterSnapshot;
use model::view::node::{ClusterNodesView, NodeGpuPodRow, NodeRow};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything `top node` prints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopNodes {
    pub nodes:    Vec<NodeRow>,
    pub cluster:  ClusterNodesView,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub gpu_pods: BTreeMap<String, Vec<NodeGpuPodRow>>,
}

impl TopNodes {
    pub fn new(snapshot: &ClusterSnapshot, details: bool) -> Self {
        let views = aggregate_cluster(snapshot);
        let mut gpu_pods_by_node = BTreeMap::new();
        if details {
            for node in &snapshot.nodes {
                let rows: Vec<NodeGpuPodRow> =
                    gpu_pods(&pods_on_node(&node.name, &snapshot.pods))
                        .into_iter()
                        .map(|pod| {
                            let contribution = pod_contribution(pod);
                            NodeGpuPodRow {
                                name:           pod.name.clone(),
                                namespace:      pod.namespace.clone(),
                                phase:          pod.phase.to_string(),
                                requested_gpus: contribution.requested.gpus,
                                allocated_gpus: contribution.allocated.gpus,
                            }
                        })
                        .collect();
                gpu_pods_by_node.insert(node.name.clone(), rows);
            }
        }

        Self {
            nodes:    views.iter().map(NodeRow::from).collect(),
            cluster:  ClusterNodesView::from_nodes(&views),
            gpu_pods: gpu_pods_by_node,
        }
    }

    /// Cluster wide GPU lines printed under the table.
    pub fn summary(&self) -> Vec<String> {
        let cluster = &self.cluster;
        let mut lines = vec![format!(
            "GPUs allocated: {}/{} ({}%)",
            fmt_gpus(cluster.allocated_gpus),
            fmt_gpus(cluster.gpus),
            cluster.allocated_percent()
        )];
        if cluster.has_inactive_gpus() {
            lines.push(format!(
                "GPUs allocated on ready nodes: {}/{} ({}%)",
                fmt_gpus(cluster.allocated_gpus_on_ready_nodes),
                fmt_gpus(cluster.gpus_on_ready_nodes),
                cluster.allocated_on_ready_percent()
            ));
        }
        if cluster.unhealthy_gpus > 0.0 {
            lines.push(format!(
                "Unhealthy GPUs: {}/{}",
                fmt_gpus(cluster.unhealthy_gpus),
                fmt_gpus(cluster.gpus)
            ));
        }
        lines
    }

    pub fn render(&self, formatter: &OutputFormatter) -> Result<String> {
        if let Some(rendered) = formatter.render_value(self)? {
            return Ok(rendered);
        }

        let mut sections = Vec::new();
        if self.gpu_pods.is_empty() {
            sections.push(formatter.render_list(&self.nodes)?);
        } else {
            for node in &self.nodes {
                sections.push(formatter.render_item(node)?);
                match self.gpu_pods.get(&node.name) {
                    Some(pods) if !pods.is_empty() => {
                        sections.push(formatter.render_list(pods)?)
                    }
                    _ => sections.push("No GPU pods".to_string()),
                }
            }
        }
        sections.push(self.summary().join("\n"));
        Ok(sections.join("\n\n"))
    }
}

/// `top node`: per node resources and the cluster GPU summary. Missing
/// metrics only leave the usage columns empty.
pub async fn top_nodes(
    cluster: &Arc<dyn ClusterReader>,
    metrics: &Arc<dyn MetricsSource>,
    details: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut snapshot = cluster
        .node_snapshot()
        .await
        .context("Failed to read the nodes of the cluster")?;

    match metrics.node_samples().await {
        Ok(samples) => snapshot.metrics = samples,
        Err(err) => debug!("Node metrics are unavailable: {}", err),
    }

    println!("{}", TopNodes::new(&snapshot, details).render(formatter)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use chrono::Utc;
    use model::domain::keys::GPU_FRACTION_ANNOTATION;
    use model::domain::resources::ResourceQuantity;
    use model::dto::snapshot::{NodeRecord, PodPhase, PodRecord};
    use std::collections::BTreeMap;

    fn node(name: &str, gpus: f64, ready: bool) -> NodeRecord {
        NodeRecord {
            name: name.to_string(),
            ready,
            capacity: ResourceQuantity { gpus, ..Default::default() },
            allocatable: ResourceQuantity { gpus, ..Default::default() },
            ..Default::default()
        }
    }

    fn fractional_pod(name: &str, node: &str, fraction: &str) -> PodRecord {
        PodRecord {
            name: name.to_string(),
            namespace: "runai-team-a".to_string(),
            node_name: Some(node.to_string()),
            phase: PodPhase::Running,
            annotations: BTreeMap::from([(
                GPU_FRACTION_ANNOTATION.to_string(),
                fraction.to_string(),
            )]),
            ..Default::default()
        }
    }

    fn snapshot() -> ClusterSnapshot {
        let mut snapshot = ClusterSnapshot::empty(Utc::now());
        snapshot.nodes = vec![node("gpu-1", 4.0, true), node("gpu-2", 2.0, false)];
        snapshot.pods = vec![
            fractional_pod("a", "gpu-1", "0.5"),
            fractional_pod("b", "gpu-1", "0.25"),
        ];
        snapshot
    }

    #[test]
    fn test_summary() {
        let top = TopNodes::new(&snapshot(), false);

        assert_eq!(top.nodes.len(), 2);
        assert!(top.gpu_pods.is_empty());
        assert_eq!(
            top.summary(),
            vec![
                "GPUs allocated: 0.75/6 (13%)".to_string(),
                "GPUs allocated on ready nodes: 0.75/4 (19%)".to_string(),
            ]
        );
    }

    #[test]
    fn test_details_lists_gpu_pods() -> Result<()> {
        let top = TopNodes::new(&snapshot(), true);

        let names: Vec<&str> = top.gpu_pods["gpu-1"]
            .iter()
            .map(|pod| pod.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(top.gpu_pods["gpu-2"].is_empty());

        let rendered = top.render(&OutputFormatter::new(OutputFormat::Table))?;
        assert!(rendered.contains("No GPU pods"));
        assert!(rendered.contains("GPUs allocated: 0.75/6"));
        Ok(())
    }

    #[test]
    fn test_json_has_cluster_totals() -> Result<()> {
        let rendered = TopNodes::new(&snapshot(), false)
            .render(&OutputFormatter::new(OutputFormat::Json))?;
        let parsed: serde_json::Value = serde_json::from_str(&rendered)?;

        assert_eq!(parsed["cluster"]["allocated_gpus"], 0.75);
        assert_eq!(parsed["nodes"][0]["name"], "gpu-1");
        assert!(parsed.get("gpu_pods").is_none());
        Ok(())
    }
}
