use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Normalized status of a job.
///
/// `Pending` may carry the wait reason reported by a container of the chief
/// pod (`ImagePullBackOff`, `ContainerCreating`...), which is then what gets
/// displayed.
#[derive(Debug, Clone, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub enum JobStatus {
    Running,
    Pending(Option<String>),
    Terminating,
    Failed,
    Succeeded,
    Unschedulable,
    Deleted,
    Unknown,
}

impl JobStatus {
    pub fn is_running(&self) -> bool { matches!(self, JobStatus::Running) }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Pending(Some(reason)) => write!(f, "{reason}"),
            JobStatus::Pending(None) => write!(f, "Pending"),
            JobStatus::Terminating => write!(f, "Terminating"),
            JobStatus::Failed => write!(f, "Failed"),
            JobStatus::Succeeded => write!(f, "Succeeded"),
            JobStatus::Unschedulable => write!(f, "Unschedulable"),
            JobStatus::Deleted => write!(f, "Deleted"),
            JobStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Any text that is not a known status is a wait reason.
impl FromStr for JobStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Running" => JobStatus::Running,
            "Pending" => JobStatus::Pending(None),
            "Terminating" => JobStatus::Terminating,
            "Failed" => JobStatus::Failed,
            "Succeeded" => JobStatus::Succeeded,
            "Unschedulable" => JobStatus::Unschedulable,
            "Deleted" => JobStatus::Deleted,
            "Unknown" | "" => JobStatus::Unknown,
            reason => JobStatus::Pending(Some(reason.to_string())),
        })
    }
}

/// The Kubernetes workload backing a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkloadKind {
    /// A `batch/v1` Job, run to completion.
    #[default]
    Job,
    /// An `apps/v1` StatefulSet, kept alive for interactive use.
    StatefulSet,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WorkloadKind::Job => write!(f, "Train"),
            WorkloadKind::StatefulSet => write!(f, "Interactive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use yare::parameterized;

    #[parameterized(
        running = {JobStatus::Running, "Running"},
        pending = {JobStatus::Pending(None), "Pending"},
        waiting = {JobStatus::Pending(Some("ImagePullBackOff".into())), "ImagePullBackOff"},
        unschedulable = {JobStatus::Unschedulable, "Unschedulable"}
    )]
    fn test_display_roundtrip(status: JobStatus, text: &str) -> Result<()> {
        assert_eq!(status.to_string(), text);
        assert_eq!(text.parse::<JobStatus>()?, status);
        Ok(())
    }

    #[test]
    fn test_serialize_as_text() -> Result<()> {
        let status = JobStatus::Pending(Some("ErrImagePull".to_string()));
        assert_eq!(serde_json::to_string(&status)?, r#""ErrImagePull""#);
        Ok(())
    }
}
