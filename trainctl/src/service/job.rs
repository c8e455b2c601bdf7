use crate::service::aggregator::gpu_fraction;
use crate::service::job_status::{derive_status, real_status};
use chrono::{DateTime, Duration, Utc};
use helper::duration::short_human;
use model::domain::job::{JobStatus, WorkloadKind};
use model::domain::keys::{
    JOB_NAME_LABEL, POD_GROUP_PREFIX, PROJECT_LABEL, RELEASE_LABEL,
    USER_LABEL,
};
use model::dto::snapshot::{
    ClusterSnapshot, JobRecord, OwnerRecord, PodPhase, PodRecord,
};
use model::view::job::JobRow;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No job named {0} was found")]
    NotFound(String),
    #[error("{count} workloads are named {name}, the name is ambiguous")]
    AmbiguousMatch { name: String, count: usize },
}

/// Which workload a pod belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodOwnership<'a> {
    Job(&'a OwnerRecord),
    StatefulSet(&'a OwnerRecord),
    Release(&'a str),
    Unowned,
}

/// Classifies a pod. An owning Job takes precedence over an owning
/// StatefulSet, which takes precedence over a `release` label.
pub fn classify_pod(pod: &PodRecord) -> PodOwnership<'_> {
    if let Some(owner) = pod.owner("Job") {
        PodOwnership::Job(owner)
    } else if let Some(owner) = pod.owner("StatefulSet") {
        PodOwnership::StatefulSet(owner)
    } else if let Some(release) = pod.label(RELEASE_LABEL) {
        PodOwnership::Release(release)
    } else {
        PodOwnership::Unowned
    }
}

fn owned_by(job: &JobRecord, ownership: PodOwnership) -> bool {
    match (job.kind, ownership) {
        (WorkloadKind::Job, PodOwnership::Job(owner))
        | (WorkloadKind::StatefulSet, PodOwnership::StatefulSet(owner)) => {
            owner.uid == job.uid
        }
        (_, PodOwnership::Release(release)) => release == job.name,
        _ => false,
    }
}

/// A job together with the pods it owns, borrowed from a snapshot.
#[derive(Debug, Clone)]
pub struct JobView<'a> {
    pub record: &'a JobRecord,
    pub pods:   Vec<&'a PodRecord>,
    /// Latest created pod directly owned by the workload.
    pub chief:  Option<&'a PodRecord>,
}

impl<'a> JobView<'a> {
    pub fn new(record: &'a JobRecord, pods: &'a [PodRecord]) -> Self {
        let pods: Vec<&PodRecord> = pods
            .iter()
            .filter(|pod| pod.namespace == record.namespace)
            .filter(|pod| owned_by(record, classify_pod(pod)))
            .collect();
        let chief = pods
            .iter()
            .copied()
            .filter(|pod| {
                !matches!(classify_pod(pod), PodOwnership::Release(_))
            })
            .max_by_key(|pod| pod.created_at);

        Self { record, pods, chief }
    }

    /// Every job of the snapshot, newest first.
    pub fn from_snapshot(snapshot: &'a ClusterSnapshot) -> Vec<Self> {
        let mut jobs: Vec<Self> = snapshot
            .jobs
            .iter()
            .map(|record| Self::new(record, &snapshot.pods))
            .collect();
        jobs.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        jobs
    }

    pub fn name(&self) -> &str { &self.record.name }

    pub fn status(&self) -> JobStatus {
        derive_status(&self.record.annotations, self.chief, self.record.deleted)
    }

    pub fn real_status(&self) -> JobStatus {
        real_status(self.status(), &self.pods)
    }

    /// Sum of the pods' GPU fractions, or the whole GPUs of the template
    /// when no pod asked for a fraction.
    pub fn requested_gpus(&self) -> f64 {
        let fractions: f64 =
            self.pods.iter().map(|pod| gpu_fraction(pod)).sum();
        if fractions > 0.0 {
            return fractions;
        }
        self.record
            .template
            .first()
            .map(|container| container.limits.gpus)
            .unwrap_or_default()
    }

    pub fn allocated_gpus(&self) -> f64 {
        match self.chief {
            Some(chief) if chief.phase == PodPhase::Running => {
                self.requested_gpus()
            }
            _ => 0.0,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.record.created_at.map(|created| now - created)
    }

    /// Time the chief spent training: from its initialization to its last
    /// readiness transition once finished, or to `now` otherwise.
    pub fn duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let chief = self.chief?;
        let start = chief.initialized_at?;
        let end = match chief.phase {
            PodPhase::Succeeded | PodPhase::Failed => {
                chief.ready_transition_at.unwrap_or(now)
            }
            _ => now,
        };
        Some(end - start)
    }

    pub fn node(&self) -> Option<&str> {
        self.chief.and_then(|chief| chief.node_name.as_deref())
    }

    pub fn image(&self) -> Option<&str> {
        self.record
            .template
            .first()
            .and_then(|container| container.image.as_deref())
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.chief
            .and_then(|chief| chief.label(key))
            .or_else(|| self.record.labels.get(key).map(String::as_str))
    }

    pub fn project(&self) -> Option<&str> { self.label(PROJECT_LABEL) }

    pub fn user(&self) -> Option<&str> { self.label(USER_LABEL) }

    pub fn pods_in_phase(&self, phase: PodPhase) -> usize {
        self.pods.iter().filter(|pod| pod.phase == phase).count()
    }

    /// Name of the pod group the scheduler gangs the job's pods under.
    pub fn pod_group_name(&self, scheduler_name: &str) -> String {
        let chief = match self.chief {
            Some(chief)
                if chief.scheduler_name.as_deref() == Some(scheduler_name) =>
            {
                chief
            }
            _ => return format!("{POD_GROUP_PREFIX}{}", self.record.name),
        };

        if let Some(job_name) =
            chief.label(JOB_NAME_LABEL).filter(|label| !label.is_empty())
        {
            format!("{POD_GROUP_PREFIX}{job_name}")
        } else if let Some(owner) = chief.owner("StatefulSet") {
            format!("{POD_GROUP_PREFIX}{}", owner.name)
        } else {
            String::new()
        }
    }

    pub fn row(&self, now: DateTime<Utc>, scheduler_name: &str) -> JobRow {
        let or_dash = |value: Option<&str>| value.unwrap_or("-").to_string();
        JobRow {
            name:           self.record.name.clone(),
            namespace:      self.record.namespace.clone(),
            kind:           self.record.kind.to_string(),
            status:         self.real_status(),
            age:            self.age(now).map(short_human).unwrap_or_default(),
            duration:       self
                .duration(now)
                .map(short_human)
                .unwrap_or_default(),
            node:           or_dash(self.node()),
            image:          or_dash(self.image()),
            project:        or_dash(self.project()),
            user:           or_dash(self.user()),
            requested_gpus: self.requested_gpus(),
            allocated_gpus: self.allocated_gpus(),
            running_pods:   self.pods_in_phase(PodPhase::Running),
            pending_pods:   self.pods_in_phase(PodPhase::Pending),
            pod_group:      self.pod_group_name(scheduler_name),
        }
    }
}

/// Looks a job up by name, failing when none or several workloads match.
pub fn find_job<'v, 'a>(
    jobs: &'v [JobView<'a>],
    name: &str,
) -> Result<&'v JobView<'a>, Error> {
    let mut matches = jobs.iter().filter(|job| job.name() == name);
    match (matches.next(), matches.count()) {
        (None, _) => Err(Error::NotFound(name.to_string())),
        (Some(job), 0) => Ok(job),
        (Some(_), others) => Err(Error::AmbiguousMatch {
            name:  name.to_string(),
            count: others + 1,
        }),
    }
}

/// Jobs that stopped running and are older than `older_than`.
pub fn prune_candidates<'v, 'a>(
    jobs: &'v [JobView<'a>],
    now: DateTime<Utc>,
    older_than: Duration,
) -> Vec<&'v JobView<'a>> {
    jobs.iter()
        .filter(|job| !job.real_status().is_running())
        .filter(|job| job.age(now).is_some_and(|age| age > older_than))
        .collect()
}
