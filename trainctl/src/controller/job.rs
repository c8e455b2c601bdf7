use crate::output::OutputFormatter;
use crate::repository::k8s::ClusterReader;
use crate::service::job::{find_job, prune_candidates, JobView};
use crate::service::lifecycle::{self, JobLifecycle};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use model::dto::snapshot::ClusterSnapshot;
use model::view::job::JobRow;
use std::sync::Arc;

pub fn job_rows(
    snapshot: &ClusterSnapshot,
    now: DateTime<Utc>,
    scheduler_name: &str,
) -> Vec<JobRow> {
    JobView::from_snapshot(snapshot)
        .iter()
        .map(|job| job.row(now, scheduler_name))
        .collect()
}

async fn read_jobs(
    cluster: &Arc<dyn ClusterReader>,
    namespace: Option<&str>,
) -> Result<ClusterSnapshot> {
    cluster
        .job_snapshot(namespace)
        .await
        .context("Failed to read the jobs of the cluster")
}

pub async fn list_jobs(
    cluster: &Arc<dyn ClusterReader>,
    namespace: Option<&str>,
    scheduler_name: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let snapshot = read_jobs(cluster, namespace).await?;
    formatter.print_list(&job_rows(&snapshot, snapshot.taken_at, scheduler_name))
}

pub async fn get_job(
    cluster: &Arc<dyn ClusterReader>,
    namespace: &str,
    name: &str,
    scheduler_name: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let snapshot = read_jobs(cluster, Some(namespace)).await?;
    let jobs = JobView::from_snapshot(&snapshot);
    let job = find_job(&jobs, name)?;
    formatter.print_item(&job.row(snapshot.taken_at, scheduler_name))
}

/// Deletes every named job, carrying on past failures.
pub async fn delete_jobs(
    lifecycle: &Arc<dyn JobLifecycle>,
    namespace: &str,
    names: &[String],
) -> Result<()> {
    let mut failures = 0;
    for name in names {
        match lifecycle.delete(namespace, name).await {
            Ok(()) => println!("The job {name} has been deleted"),
            Err(err) => {
                error!("Failed to delete {}: {}", name, err);
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} jobs could not be deleted", names.len());
    }
    Ok(())
}

/// Deletes the jobs that stopped running more than `older_than` ago and
/// returns their names. Jobs not submitted from this CLI are skipped.
pub async fn prune(
    cluster: &Arc<dyn ClusterReader>,
    lifecycle: &Arc<dyn JobLifecycle>,
    namespace: Option<&str>,
    older_than: Duration,
) -> Result<Vec<String>> {
    let snapshot = read_jobs(cluster, namespace).await?;
    let jobs = JobView::from_snapshot(&snapshot);

    let mut pruned = Vec::new();
    for job in prune_candidates(&jobs, snapshot.taken_at, older_than) {
        let record = job.record;
        match lifecycle.delete(&record.namespace, &record.name).await {
            Ok(()) => pruned.push(record.name.clone()),
            Err(lifecycle::Error::NotFound(name)) => {
                warn!("Skipping {}, it was not submitted from this CLI", name)
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("Failed to prune {}", record.name)))
            }
        }
    }
    Ok(pruned)
}

pub async fn prune_jobs(
    cluster: &Arc<dyn ClusterReader>,
    lifecycle: &Arc<dyn JobLifecycle>,
    namespace: Option<&str>,
    older_than: Duration,
) -> Result<()> {
    let pruned = prune(cluster, lifecycle, namespace, older_than).await?;
    if pruned.is_empty() {
        println!("No jobs to prune");
    }
    for name in pruned {
        println!("The job {name} has been pruned");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::k8s;
    use crate::service::lifecycle::{SubmitRequest, Submission};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use model::domain::job::WorkloadKind;
    use model::dto::snapshot::{JobRecord, OwnerRecord, PodPhase, PodRecord};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct FixedCluster(ClusterSnapshot);

    #[async_trait]
    impl ClusterReader for FixedCluster {
        async fn node_snapshot(&self) -> Result<ClusterSnapshot, k8s::Error> {
            Ok(self.0.clone())
        }

        async fn job_snapshot(
            &self,
            _namespace: Option<&str>,
        ) -> Result<ClusterSnapshot, k8s::Error> {
            Ok(self.0.clone())
        }
    }

    /// Knows every job except `ghost`.
    #[derive(Debug, Default)]
    struct RecordingLifecycle {
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobLifecycle for RecordingLifecycle {
        async fn submit(
            &self,
            _request: &SubmitRequest,
            _namespace: &str,
        ) -> Result<Submission, lifecycle::Error> {
            unimplemented!("not exercised")
        }

        async fn delete(
            &self,
            _namespace: &str,
            name: &str,
        ) -> Result<(), lifecycle::Error> {
            if name == "ghost" {
                return Err(lifecycle::Error::NotFound(name.to_string()));
            }
            self.deleted.lock().expect("lock").push(name.to_string());
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn job(name: &str, age_hours: i64) -> JobRecord {
        JobRecord {
            kind: WorkloadKind::Job,
            name: name.to_string(),
            namespace: "runai-team-a".to_string(),
            uid: format!("uid-{name}"),
            created_at: Some(now() - Duration::hours(age_hours)),
            ..Default::default()
        }
    }

    fn chief(job: &str, phase: PodPhase) -> PodRecord {
        PodRecord {
            name: format!("{job}-0"),
            namespace: "runai-team-a".to_string(),
            phase,
            owners: vec![OwnerRecord {
                kind: "Job".to_string(),
                name: job.to_string(),
                uid: format!("uid-{job}"),
            }],
            created_at: Some(now() - Duration::hours(1)),
            ..Default::default()
        }
    }

    fn snapshot() -> ClusterSnapshot {
        let mut snapshot = ClusterSnapshot::empty(now());
        snapshot.jobs = vec![
            job("old-failed", 72),
            job("old-running", 72),
            job("new-failed", 2),
            job("ghost", 96),
        ];
        snapshot.pods = vec![
            chief("old-failed", PodPhase::Failed),
            chief("old-running", PodPhase::Running),
            chief("new-failed", PodPhase::Failed),
        ];
        snapshot
    }

    #[test]
    fn test_job_rows_newest_first() {
        let rows = job_rows(&snapshot(), now(), "runai-scheduler");
        let names: Vec<&str> = rows.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["new-failed", "old-failed", "old-running", "ghost"]);
        assert_eq!(rows[0].age, "2h");
    }

    #[tokio::test]
    async fn test_prune_skips_running_recent_and_unknown() -> Result<()> {
        let cluster: Arc<dyn ClusterReader> = Arc::new(FixedCluster(snapshot()));
        let recorder = Arc::new(RecordingLifecycle::default());
        let lifecycle: Arc<dyn JobLifecycle> = recorder.clone();

        let pruned = prune(&cluster, &lifecycle, None, Duration::days(1)).await?;

        assert_eq!(pruned, vec!["old-failed".to_string()]);
        assert_eq!(*recorder.deleted.lock().expect("lock"), pruned);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_reports_failures() {
        let recorder = Arc::new(RecordingLifecycle::default());
        let lifecycle: Arc<dyn JobLifecycle> = recorder.clone();

        let result = delete_jobs(
            &lifecycle,
            "runai-team-a",
            &["job-a".to_string(), "ghost".to_string()],
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*recorder.deleted.lock().expect("lock"), vec!["job-a".to_string()]);
    }
}
