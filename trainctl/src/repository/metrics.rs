use async_trait::async_trait;
use helper::uom_helper::cpu_ratio::cpu;
use kube::api::ListParams;
use kube::{Api, Client};
use kube_metrics::node::NodeMetrics;
use model::dto::snapshot::MetricsSample;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;
use uom::si::f64::{Information, Ratio};
use uom::si::information::byte;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("Inherited an error when contacting the k8s API: {0}")]
    Kube(#[from] kube::Error),
    #[error("Prometheus rejected the query {query}: {reason}")]
    Query { query: String, reason: String },
}

/// Source of per node usage samples, keyed by node name.
#[async_trait]
pub trait MetricsSource: Debug + Sync + Send {
    async fn node_samples(
        &self,
    ) -> Result<HashMap<String, MetricsSample>, Error>;
}

#[derive(Debug, Clone, Copy)]
enum SampleField {
    UsedCpus,
    UsedMemory,
    UsedGpus,
    UsedGpuMemory,
    TotalGpuMemory,
}

impl SampleField {
    fn set(self, sample: &mut MetricsSample, value: f64) {
        match self {
            SampleField::UsedCpus => {
                sample.used_cpus = Some(Ratio::new::<cpu>(value))
            }
            SampleField::UsedMemory => {
                sample.used_memory = Some(Information::new::<byte>(value))
            }
            SampleField::UsedGpus => sample.used_gpus = Some(value),
            SampleField::UsedGpuMemory => {
                sample.used_gpu_memory = Some(Information::new::<byte>(value))
            }
            SampleField::TotalGpuMemory => {
                sample.total_gpu_memory = Some(Information::new::<byte>(value))
            }
        }
    }
}

/// Every query aggregates by the `node` label. GPU figures come from the
/// DCGM exporter, which reports framebuffer memory in MiB.
const NODE_QUERIES: [(SampleField, &str); 5] = [
    (
        SampleField::UsedCpus,
        r#"sum by (node) (rate(container_cpu_usage_seconds_total{container!=""}[2m]))"#,
    ),
    (
        SampleField::UsedMemory,
        r#"sum by (node) (container_memory_working_set_bytes{container!=""})"#,
    ),
    (SampleField::UsedGpus, "sum by (node) (DCGM_FI_DEV_GPU_UTIL) / 100"),
    (
        SampleField::UsedGpuMemory,
        "sum by (node) (DCGM_FI_DEV_FB_USED) * 1024 * 1024",
    ),
    (
        SampleField::TotalGpuMemory,
        "sum by (node) (DCGM_FI_DEV_FB_USED + DCGM_FI_DEV_FB_FREE) * 1024 * 1024",
    ),
];

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data:   Option<QueryData>,
    #[serde(default)]
    error:  Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<Series>,
}

#[derive(Debug, Deserialize)]
struct Series {
    metric: HashMap<String, String>,
    /// Timestamp and value, the value being sent as a string.
    value:  (f64, String),
}

fn merge_series(
    samples: &mut HashMap<String, MetricsSample>,
    field: SampleField,
    series: Vec<Series>,
) {
    for serie in series {
        let Some(node) = serie.metric.get("node") else {
            continue;
        };
        match serie.value.1.parse::<f64>() {
            Ok(value) if value.is_finite() => {
                field.set(samples.entry(node.clone()).or_default(), value)
            }
            _ => debug!("Dropping {:?} sample {} of {}", field, serie.value.1, node),
        }
    }
}

#[derive(Debug)]
pub struct PrometheusMetrics {
    client:  reqwest::Client,
    address: String,
}

impl PrometheusMetrics {
    pub fn new(address: String, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self { client, address })
    }

    async fn query(&self, query: &str) -> Result<Vec<Series>, Error> {
        let url =
            format!("{}/api/v1/query", self.address.trim_end_matches('/'));
        let response: QueryResponse = self
            .client
            .get(url)
            .query(&[("query", query)])
            .send()
            .await?
            .json()
            .await?;

        if response.status != "success" {
            return Err(Error::Query {
                query:  query.to_string(),
                reason: response.error.unwrap_or(response.status),
            });
        }
        Ok(response.data.map(|data| data.result).unwrap_or_default())
    }
}

#[async_trait]
impl MetricsSource for PrometheusMetrics {
    /// A failing query only leaves its field empty.
    async fn node_samples(
        &self,
    ) -> Result<HashMap<String, MetricsSample>, Error> {
        trace!("node_samples from {}", self.address);
        let mut samples = HashMap::new();
        for (field, query) in NODE_QUERIES {
            match self.query(query).await {
                Ok(series) => merge_series(&mut samples, field, series),
                Err(err) => debug!("Metric {:?} unavailable: {}", field, err),
            }
        }
        Ok(samples)
    }
}

/// CPU and memory usage from the metrics server, used when no Prometheus
/// is configured.
pub struct KubeNodeMetrics {
    client: Client,
}

impl Debug for KubeNodeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeNodeMetrics").finish_non_exhaustive()
    }
}

impl KubeNodeMetrics {
    pub fn new(client: Client) -> Self { Self { client } }
}

#[async_trait]
impl MetricsSource for KubeNodeMetrics {
    async fn node_samples(
        &self,
    ) -> Result<HashMap<String, MetricsSample>, Error> {
        trace!("node_samples from metrics.k8s.io");
        let api: Api<NodeMetrics> = Api::all(self.client.clone());
        let mut samples = HashMap::new();

        for metrics in api.list(&ListParams::default()).await? {
            let Some(node) = metrics.metadata.name.clone() else {
                continue;
            };
            let used_cpus = metrics
                .usage
                .cpu()
                .map_err(|err| debug!("Bad CPU usage for {}: {}", node, err))
                .ok();
            let used_memory = metrics
                .usage
                .memory()
                .map_err(|err| debug!("Bad memory usage for {}: {}", node, err))
                .ok();
            samples.insert(
                node,
                MetricsSample { used_cpus, used_memory, ..Default::default() },
            );
        }
        Ok(samples)
    }
}
