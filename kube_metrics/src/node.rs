use helper::uom_helper::{cpu, information, Error};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use uom::si::f64::{Information, Ratio};

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct NodeMetricsUsage {
    /// https://kubernetes.io/docs/concepts/configuration/manage-resources-containers/#meaning-of-cpu
    pub cpu:    Quantity,
    pub memory: Quantity,
}

impl NodeMetricsUsage {
    pub fn cpu(&self) -> Result<Ratio, Error> { cpu::parse(&self.cpu.0) }

    pub fn memory(&self) -> Result<Information, Error> {
        information::parse(&self.memory.0)
    }
}

/// Live usage of a node as served by the `metrics.k8s.io` API.
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct NodeMetrics {
    pub metadata:  ObjectMeta,
    pub timestamp: String,
    pub window:    String,
    pub usage:     NodeMetricsUsage,
}

impl k8s_openapi::Resource for NodeMetrics {
    type Scope = k8s_openapi::ClusterResourceScope;

    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const GROUP: &'static str = "metrics.k8s.io";
    const KIND: &'static str = "NodeMetrics";
    const URL_PATH_SEGMENT: &'static str = "nodes";
    const VERSION: &'static str = "v1beta1";
}

impl k8s_openapi::Metadata for NodeMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty { &self.metadata }

    fn metadata_mut(&mut self) -> &mut Self::Ty { &mut self.metadata }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use helper::uom_helper::cpu_ratio::millicpu;
    use uom::si::information::kibibyte;

    #[test]
    fn test_metrics_server_payload() -> Result<()> {
        let raw = r#"{
            "metadata": {"name": "gpu-node-1"},
            "timestamp": "2024-05-02T10:00:00Z",
            "window": "20s",
            "usage": {"cpu": "1250000000n", "memory": "2048Ki"}
        }"#;
        let metrics: NodeMetrics = serde_json::from_str(raw)?;

        assert_eq!(metrics.metadata.name.as_deref(), Some("gpu-node-1"));
        assert!((metrics.usage.cpu()?.get::<millicpu>() - 1250.0).abs() < 1e-6);
        assert_eq!(metrics.usage.memory()?, Information::new::<kibibyte>(2048.0));
        Ok(())
    }
}
