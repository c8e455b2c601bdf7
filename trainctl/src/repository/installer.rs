use async_trait::async_trait;
use model::domain::identity::JobIdentity;
use std::fmt::Debug;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to run {0}: {1}")]
    Spawn(&'static str, #[source] std::io::Error),
    #[error("{0} exited with {1}: {2}")]
    Command(&'static str, ExitStatus, String),
    #[error("Failed to write the values file: {0}")]
    Values(#[source] std::io::Error),
}

/// Renders, applies and removes the Kubernetes objects of a job.
#[async_trait]
pub trait Installer: Debug + Sync + Send {
    /// Renders the chart with `values` into a manifest, without touching the
    /// cluster.
    async fn render(
        &self,
        identity: &JobIdentity,
        namespace: &str,
        values: &str,
    ) -> Result<String, Error>;

    async fn apply(&self, namespace: &str, manifest: &str) -> Result<(), Error>;

    async fn uninstall(
        &self,
        namespace: &str,
        manifest: &str,
    ) -> Result<(), Error>;
}

/// Renders with `helm template` and applies with `kubectl`.
#[derive(Debug, Clone)]
pub struct HelmInstaller {
    chart: String,
}

impl HelmInstaller {
    pub fn new(chart: String) -> Self { Self { chart } }
}

async fn run(
    program: &'static str,
    args: &[&str],
    stdin: Option<&str>,
) -> Result<String, Error> {
    debug!("Running {} {}", program, args.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| Error::Spawn(program, err))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .map_err(|err| Error::Spawn(program, err))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|err| Error::Spawn(program, err))?;
    if !output.status.success() {
        return Err(Error::Command(
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl Installer for HelmInstaller {
    async fn render(
        &self,
        identity: &JobIdentity,
        namespace: &str,
        values: &str,
    ) -> Result<String, Error> {
        let values_path = std::env::temp_dir()
            .join(format!("{}-{}.yaml", identity.resolved, Uuid::new_v4()));
        tokio::fs::write(&values_path, values).await.map_err(Error::Values)?;
        let values_file = values_path.to_string_lossy().into_owned();

        let rendered = run(
            "helm",
            &[
                "template",
                &identity.resolved,
                &self.chart,
                "--namespace",
                namespace,
                "--values",
                &values_file,
            ],
            None,
        )
        .await;
        if let Err(err) = tokio::fs::remove_file(&values_path).await {
            debug!("Could not remove {}: {}", values_file, err);
        }

        rendered
    }

    async fn apply(&self, namespace: &str, manifest: &str) -> Result<(), Error> {
        run("kubectl", &["apply", "--namespace", namespace, "-f", "-"], Some(manifest))
            .await?;
        Ok(())
    }

    async fn uninstall(
        &self,
        namespace: &str,
        manifest: &str,
    ) -> Result<(), Error> {
        run(
            "kubectl",
            &[
                "delete",
                "--namespace",
                namespace,
                "--ignore-not-found",
                "-f",
                "-",
            ],
            Some(manifest),
        )
        .await?;
        Ok(())
    }
}
