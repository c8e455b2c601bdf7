use crate::domain::job::JobStatus;
use serde::Serialize;

/// One line of `list`, also the JSON and YAML shape of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRow {
    pub name:           String,
    pub namespace:      String,
    pub kind:           String,
    pub status:         JobStatus,
    pub age:            String,
    pub duration:       String,
    pub node:           String,
    pub image:          String,
    pub project:        String,
    pub user:           String,
    pub requested_gpus: f64,
    pub allocated_gpus: f64,
    pub running_pods:   usize,
    pub pending_pods:   usize,
    pub pod_group:      String,
}
