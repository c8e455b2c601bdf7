use model::domain::job::JobStatus;
use model::domain::keys::UNSCHEDULABLE_ANNOTATION;
use model::dto::snapshot::{PodPhase, PodRecord};
use std::collections::BTreeMap;

fn phase_status(phase: PodPhase) -> JobStatus {
    match phase {
        PodPhase::Pending => JobStatus::Pending(None),
        PodPhase::Running => JobStatus::Running,
        PodPhase::Succeeded => JobStatus::Succeeded,
        PodPhase::Failed => JobStatus::Failed,
        PodPhase::Unknown => JobStatus::Unknown,
    }
}

/// Status of a job from its annotations, its chief pod and whether the
/// workload is being deleted. Rules apply in order, the first match wins.
pub fn derive_status(
    annotations: &BTreeMap<String, String>,
    chief: Option<&PodRecord>,
    deleted: bool,
) -> JobStatus {
    if annotations.get(UNSCHEDULABLE_ANNOTATION).map(String::as_str)
        == Some("true")
    {
        return JobStatus::Unschedulable;
    }

    let Some(chief) = chief else {
        return JobStatus::Pending(None);
    };

    if deleted {
        return JobStatus::Terminating;
    }

    if chief.phase == PodPhase::Pending {
        if let Some(reason) = chief.waiting_reasons.first() {
            return JobStatus::Pending(Some(reason.clone()));
        }
    }

    phase_status(chief.phase)
}

/// A running job whose other pods are still pending is reported as Pending.
pub fn real_status(status: JobStatus, pods: &[&PodRecord]) -> JobStatus {
    if status.is_running()
        && pods.iter().any(|pod| pod.phase == PodPhase::Pending)
    {
        JobStatus::Pending(None)
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn pod(phase: PodPhase, waiting: &[&str]) -> PodRecord {
        PodRecord {
            name: "job-a-0".to_string(),
            phase,
            waiting_reasons: waiting.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    fn annotations(unschedulable: Option<&str>) -> BTreeMap<String, String> {
        unschedulable
            .map(|value| {
                BTreeMap::from([(
                    UNSCHEDULABLE_ANNOTATION.to_string(),
                    value.to_string(),
                )])
            })
            .unwrap_or_default()
    }

    #[parameterized(
        unschedulable_wins_over_running = {Some("true"), Some(PodPhase::Running), false, JobStatus::Unschedulable},
        unschedulable_without_chief = {Some("true"), None, true, JobStatus::Unschedulable},
        annotation_false = {Some("false"), Some(PodPhase::Running), false, JobStatus::Running},
        no_chief = {None, None, false, JobStatus::Pending(None)},
        no_chief_deleted = {None, None, true, JobStatus::Pending(None)},
        deleted = {None, Some(PodPhase::Running), true, JobStatus::Terminating},
        succeeded = {None, Some(PodPhase::Succeeded), false, JobStatus::Succeeded},
        failed = {None, Some(PodPhase::Failed), false, JobStatus::Failed},
        pending = {None, Some(PodPhase::Pending), false, JobStatus::Pending(None)},
        unknown = {None, Some(PodPhase::Unknown), false, JobStatus::Unknown}
    )]
    fn test_derive_status(
        unschedulable: Option<&str>,
        chief: Option<PodPhase>,
        deleted: bool,
        expected: JobStatus,
    ) {
        let chief = chief.map(|phase| pod(phase, &[]));
        assert_eq!(
            derive_status(&annotations(unschedulable), chief.as_ref(), deleted),
            expected
        );
    }

    #[test]
    fn test_waiting_reason_of_pending_chief() {
        let chief = pod(PodPhase::Pending, &["ImagePullBackOff", "ContainerCreating"]);
        let status = derive_status(&annotations(None), Some(&chief), false);

        assert_eq!(status, JobStatus::Pending(Some("ImagePullBackOff".into())));
        assert_eq!(status.to_string(), "ImagePullBackOff");
    }

    #[test]
    fn test_waiting_reason_ignored_when_running() {
        let chief = pod(PodPhase::Running, &["CrashLoopBackOff"]);
        assert_eq!(
            derive_status(&annotations(None), Some(&chief), false),
            JobStatus::Running
        );
    }

    #[test]
    fn test_real_status_downgrade() {
        let chief = pod(PodPhase::Running, &[]);
        let sibling = pod(PodPhase::Pending, &[]);

        assert_eq!(
            real_status(JobStatus::Running, &[&chief, &sibling]),
            JobStatus::Pending(None)
        );
        assert_eq!(real_status(JobStatus::Running, &[&chief]), JobStatus::Running);
        assert_eq!(
            real_status(JobStatus::Succeeded, &[&chief, &sibling]),
            JobStatus::Succeeded
        );
    }
}
