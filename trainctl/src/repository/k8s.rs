use async_trait::async_trait;
use chrono::Utc;
use helper::uom_helper::{cpu, information, parse_quantity};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Container, Node, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::ListParams;
use kube::{Api, Client, Resource};
use model::domain::job::WorkloadKind;
use model::domain::keys::{CPU_RESOURCE, MEMORY_RESOURCE, NVIDIA_GPU_RESOURCE};
use model::domain::resources::ResourceQuantity;
use model::dto::snapshot::{
    ClusterSnapshot, ContainerRecord, JobRecord, NodeRecord, OwnerRecord,
    PodPhase, PodRecord,
};
use std::collections::BTreeMap;
use std::fmt::Debug;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Inherited an error when contacting the k8s API: {0}")]
    Kube(#[from] kube::Error),
    #[error("Unable to obtain the current key: {0}")]
    MissingKey(&'static str),
}

/// Reads the cluster objects the views are computed from.
#[async_trait]
pub trait ClusterReader: Debug + Sync + Send {
    /// Nodes and the pods holding resources on them, in every namespace.
    async fn node_snapshot(&self) -> Result<ClusterSnapshot, Error>;

    /// Jobs and their pods, in one namespace or in all of them.
    async fn job_snapshot(
        &self,
        namespace: Option<&str>,
    ) -> Result<ClusterSnapshot, Error>;
}

pub struct K8sImpl {
    client:         Client,
    scheduler_name: String,
}

impl Debug for K8sImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("K8sImpl")
            .field("scheduler_name", &self.scheduler_name)
            .finish_non_exhaustive()
    }
}

impl K8sImpl {
    pub fn new(client: Client, scheduler_name: String) -> Self {
        Self { client, scheduler_name }
    }

    fn api<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    /// Workloads whose pods are not handed to our scheduler are not jobs.
    fn is_scheduled_by_us(&self, template: Option<&PodSpec>) -> bool {
        template.and_then(|spec| spec.scheduler_name.as_deref())
            == Some(self.scheduler_name.as_str())
    }
}

/// Reads the cpu, memory and GPU entries of a resource table. Unreadable
/// entries are skipped.
fn resource_quantity(
    table: Option<&BTreeMap<String, Quantity>>,
) -> ResourceQuantity {
    let mut quantity = ResourceQuantity::zero();
    let Some(table) = table else {
        return quantity;
    };

    if let Some(raw) = table.get(CPU_RESOURCE) {
        match cpu::parse(&raw.0) {
            Ok(cpus) => quantity.cpus = cpus,
            Err(err) => warn!("Ignoring {}: {}", CPU_RESOURCE, err),
        }
    }
    if let Some(raw) = table.get(MEMORY_RESOURCE) {
        match information::parse(&raw.0) {
            Ok(memory) => quantity.memory = memory,
            Err(err) => warn!("Ignoring {}: {}", MEMORY_RESOURCE, err),
        }
    }
    if let Some(raw) = table.get(NVIDIA_GPU_RESOURCE) {
        match parse_quantity(&raw.0) {
            Ok(gpus) => quantity.gpus = gpus,
            Err(err) => warn!("Ignoring {}: {}", NVIDIA_GPU_RESOURCE, err),
        }
    }
    quantity
}

fn container_record(container: &Container) -> ContainerRecord {
    let resources = container.resources.as_ref();
    ContainerRecord {
        name:     container.name.clone(),
        image:    container.image.clone(),
        requests: resource_quantity(
            resources.and_then(|resources| resources.requests.as_ref()),
        ),
        limits:   resource_quantity(
            resources.and_then(|resources| resources.limits.as_ref()),
        ),
    }
}

pub(crate) fn node_record(node: Node) -> Result<NodeRecord, Error> {
    let name = node.metadata.name.ok_or(Error::MissingKey("metadata:name"))?;
    let status = node.status.unwrap_or_default();

    let ready = status
        .conditions
        .iter()
        .flatten()
        .any(|condition| condition.type_ == "Ready" && condition.status == "True");
    let internal_ip = status
        .addresses
        .iter()
        .flatten()
        .find(|address| address.type_ == "InternalIP")
        .map(|address| address.address.clone());

    Ok(NodeRecord {
        name,
        labels: node.metadata.labels.unwrap_or_default(),
        internal_ip,
        ready,
        capacity: resource_quantity(status.capacity.as_ref()),
        allocatable: resource_quantity(status.allocatable.as_ref()),
    })
}

pub(crate) fn pod_record(pod: Pod) -> Result<PodRecord, Error> {
    let metadata = pod.metadata;
    let name = metadata.name.ok_or(Error::MissingKey("metadata:name"))?;
    let spec = pod.spec.unwrap_or_default();
    let status = pod.status.unwrap_or_default();

    let transition = |kind: &str, only_true: bool| {
        status
            .conditions
            .iter()
            .flatten()
            .find(|condition| {
                condition.type_ == kind
                    && (!only_true || condition.status == "True")
            })
            .and_then(|condition| condition.last_transition_time.as_ref())
            .map(|time| time.0)
    };
    let initialized_at = transition("Initialized", true);
    let ready_transition_at = transition("Ready", false);

    let waiting_reasons = status
        .container_statuses
        .iter()
        .flatten()
        .filter_map(|container| {
            container.state.as_ref()?.waiting.as_ref()?.reason.clone()
        })
        .filter(|reason| !reason.is_empty())
        .collect();

    Ok(PodRecord {
        name,
        namespace: metadata.namespace.unwrap_or_default(),
        node_name: spec.node_name.clone(),
        host_ip: status.host_ip.clone(),
        phase: status
            .phase
            .as_deref()
            .unwrap_or_default()
            .parse::<PodPhase>()
            .unwrap_or_default(),
        labels: metadata.labels.unwrap_or_default(),
        annotations: metadata.annotations.unwrap_or_default(),
        owners: metadata
            .owner_references
            .unwrap_or_default()
            .into_iter()
            .map(|owner| OwnerRecord {
                kind: owner.kind,
                name: owner.name,
                uid:  owner.uid,
            })
            .collect(),
        scheduler_name: spec.scheduler_name.clone(),
        containers: spec.containers.iter().map(container_record).collect(),
        waiting_reasons,
        created_at: metadata.creation_timestamp.map(|time| time.0),
        initialized_at,
        ready_transition_at,
    })
}

fn workload_record(
    kind: WorkloadKind,
    metadata: ObjectMeta,
    template: Option<&PodSpec>,
) -> Result<JobRecord, Error> {
    Ok(JobRecord {
        kind,
        name: metadata.name.ok_or(Error::MissingKey("metadata:name"))?,
        namespace: metadata.namespace.unwrap_or_default(),
        uid: metadata.uid.unwrap_or_default(),
        labels: metadata.labels.unwrap_or_default(),
        annotations: metadata.annotations.unwrap_or_default(),
        created_at: metadata.creation_timestamp.map(|time| time.0),
        deleted: metadata.deletion_timestamp.is_some(),
        template: template
            .map(|spec| spec.containers.iter().map(container_record).collect())
            .unwrap_or_default(),
    })
}

#[async_trait]
impl ClusterReader for K8sImpl {
    async fn node_snapshot(&self) -> Result<ClusterSnapshot, Error> {
        trace!("node_snapshot");
        let nodes: Api<Node> = Api::all(self.client.clone());
        let pods: Api<Pod> = Api::all(self.client.clone());
        let all = ListParams::default();
        let active = ListParams::default()
            .fields("status.phase!=Succeeded,status.phase!=Failed");

        let (nodes, pods) = futures::try_join!(
            nodes.list(&all),
            pods.list(&active)
        )?;

        let mut snapshot = ClusterSnapshot::empty(Utc::now());
        snapshot.nodes = nodes
            .into_iter()
            .map(node_record)
            .collect::<Result<Vec<_>, _>>()?;
        snapshot.nodes.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot.pods =
            pods.into_iter().map(pod_record).collect::<Result<_, _>>()?;
        Ok(snapshot)
    }

    async fn job_snapshot(
        &self,
        namespace: Option<&str>,
    ) -> Result<ClusterSnapshot, Error> {
        trace!("job_snapshot in {:?}", namespace);
        let jobs: Api<Job> = self.api(namespace);
        let sets: Api<StatefulSet> = self.api(namespace);
        let pods: Api<Pod> = self.api(namespace);
        let params = ListParams::default();

        let (jobs, sets, pods) = futures::try_join!(
            jobs.list(&params),
            sets.list(&params),
            pods.list(&params)
        )?;

        let mut snapshot = ClusterSnapshot::empty(Utc::now());
        for job in jobs {
            let template = job
                .spec
                .as_ref()
                .and_then(|spec| spec.template.spec.as_ref());
            if self.is_scheduled_by_us(template) {
                snapshot.jobs.push(workload_record(
                    WorkloadKind::Job,
                    job.metadata.clone(),
                    template,
                )?);
            }
        }
        for set in sets {
            let template = set
                .spec
                .as_ref()
                .and_then(|spec| spec.template.spec.as_ref());
            if self.is_scheduled_by_us(template) {
                snapshot.jobs.push(workload_record(
                    WorkloadKind::StatefulSet,
                    set.metadata.clone(),
                    template,
                )?);
            }
        }
        snapshot.pods =
            pods.into_iter().map(pod_record).collect::<Result<_, _>>()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::TimeZone;
    use helper::uom_helper::cpu_ratio::millicpu;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateWaiting, ContainerStatus, NodeAddress,
        NodeCondition, NodeStatus, PodCondition, PodStatus,
        ResourceRequirements,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
        OwnerReference, Time,
    };
    use uom::si::f64::{Information, Ratio};
    use uom::si::information::gibibyte;

    fn table(entries: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), Quantity(value.to_string())))
            .collect()
    }

    #[test]
    fn test_resource_quantity_skips_unreadable() {
        let quantity = resource_quantity(Some(&table(&[
            ("cpu", "1500m"),
            ("memory", "lots"),
            ("nvidia.com/gpu", "2"),
        ])));

        assert_eq!(quantity.cpus, Ratio::new::<millicpu>(1500.0));
        assert_eq!(quantity.memory, Information::new::<gibibyte>(0.0));
        assert_eq!(quantity.gpus, 2.0);
        assert_eq!(resource_quantity(None), ResourceQuantity::zero());
    }

    #[test]
    fn test_node_record() -> Result<()> {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("gpu-node-1".to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                capacity: Some(table(&[("cpu", "8"), ("nvidia.com/gpu", "2")])),
                allocatable: Some(table(&[("cpu", "7500m"), ("nvidia.com/gpu", "4")])),
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                addresses: Some(vec![
                    NodeAddress {
                        type_:   "Hostname".to_string(),
                        address: "gpu-node-1".to_string(),
                    },
                    NodeAddress {
                        type_:   "InternalIP".to_string(),
                        address: "10.0.0.12".to_string(),
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let record = node_record(node)?;
        assert!(record.ready);
        assert_eq!(record.internal_ip.as_deref(), Some("10.0.0.12"));
        assert_eq!(record.capacity.gpus, 2.0);
        assert_eq!(record.allocatable.gpus, 4.0);
        assert!(node_record(Node::default()).is_err());
        Ok(())
    }

    #[test]
    fn test_pod_record() -> Result<()> {
        let created = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("job-a-x7k2p".to_string()),
                namespace: Some("team-a".to_string()),
                creation_timestamp: Some(Time(created)),
                owner_references: Some(vec![OwnerReference {
                    kind: "Job".to_string(),
                    name: "job-a".to_string(),
                    uid: "uid-a".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("gpu-node-1".to_string()),
                scheduler_name: Some("runai-scheduler".to_string()),
                containers: vec![Container {
                    name: "main".to_string(),
                    image: Some("pytorch:2.3".to_string()),
                    resources: Some(ResourceRequirements {
                        limits: Some(table(&[("nvidia.com/gpu", "1")])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Pending".to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "Initialized".to_string(),
                    status: "True".to_string(),
                    last_transition_time: Some(Time(created)),
                    ..Default::default()
                }]),
                container_statuses: Some(vec![ContainerStatus {
                    name: "main".to_string(),
                    state: Some(ContainerState {
                        waiting: Some(ContainerStateWaiting {
                            reason: Some("ImagePullBackOff".to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        };

        let record = pod_record(pod)?;
        assert_eq!(record.phase, PodPhase::Pending);
        assert_eq!(record.waiting_reasons, vec!["ImagePullBackOff".to_string()]);
        assert_eq!(record.owner("Job").map(|owner| owner.uid.as_str()), Some("uid-a"));
        assert_eq!(record.containers[0].limits.gpus, 1.0);
        assert_eq!(record.initialized_at, Some(created));
        assert_eq!(record.ready_transition_at, None);
        assert_eq!(record.created_at, Some(created));
        Ok(())
    }
}
