use crate::repository::installer::{self, Installer};
use crate::repository::job_index::JobIndex;
use crate::repository::registry::{self, JobRegistry};
use crate::service::registration::{self, Registration};
use async_trait::async_trait;
use helper::uom_helper::parse_quantity;
use lazy_regex::regex_captures;
use model::domain::identity::JobIdentity;
use model::JobName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

const CHART_KEY: &str = "chart";
const VALUES_KEY: &str = "values";
const MANIFEST_KEY: &str = "app";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(
        "{0} GPUs cannot be requested, use a fraction below 1 or a whole count"
    )]
    InvalidGpu(f64),
    #[error("Invalid {field} quantity {value}: {source}")]
    InvalidQuantity {
        field:  &'static str,
        value:  String,
        source: helper::uom_helper::Error,
    },
    #[error("Expected KEY=VALUE, got {0}")]
    InvalidPair(String),
    #[error("Failed to render the values: {0}")]
    Values(#[from] serde_yaml::Error),
    #[error("No job named {0} was submitted from this CLI")]
    NotFound(String),
    #[error(transparent)]
    Registration(#[from] registration::Error),
    #[error(transparent)]
    Registry(#[from] registry::Error),
    #[error(transparent)]
    Install(#[from] installer::Error),
}

/// What the operator asked for on the command line.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub name:         JobName,
    pub auto_name:    bool,
    pub image:        String,
    pub gpu:          Option<f64>,
    pub cpu:          Option<String>,
    pub memory:       Option<String>,
    pub cpu_limit:    Option<String>,
    pub memory_limit: Option<String>,
    pub environment:  Vec<String>,
    pub set:          Vec<String>,
    pub project:      String,
    pub user:         Option<String>,
    pub interactive:  bool,
}

/// Values handed to the chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitValues {
    pub image:        String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu:          Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu:          Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory:       Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_limit:    Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment:  BTreeMap<String, String>,
    pub project:      String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user:         Option<String>,
    pub interactive:  bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_index:    Option<u64>,
    #[serde(flatten)]
    pub extra:        BTreeMap<String, serde_yaml::Value>,
}

fn split_pair(raw: &str) -> Result<(String, String), Error> {
    let (_, key, value) = regex_captures!(r"^\s*([^=\s]+)\s*=(.*)$", raw)
        .ok_or_else(|| Error::InvalidPair(raw.to_string()))?;
    Ok((key.to_string(), value.to_string()))
}

fn checked_quantity(
    field: &'static str,
    value: &Option<String>,
) -> Result<Option<String>, Error> {
    match value {
        None => Ok(None),
        Some(value) => {
            parse_quantity(value).map_err(|source| Error::InvalidQuantity {
                field,
                value: value.clone(),
                source,
            })?;
            Ok(Some(value.clone()))
        }
    }
}

impl SubmitRequest {
    /// Validates the request and builds the chart values. A GPU count
    /// below one becomes `gpuFraction`, a whole count becomes `gpu`.
    pub fn values(&self) -> Result<SubmitValues, Error> {
        let (gpu, gpu_fraction) = match self.gpu {
            None => (None, None),
            Some(gpu) if gpu == 0.0 => (None, None),
            Some(gpu) if gpu > 0.0 && gpu < 1.0 => (None, Some(gpu)),
            Some(gpu) if gpu >= 1.0 && gpu.fract() == 0.0 => {
                (Some(gpu as u32), None)
            }
            Some(gpu) => return Err(Error::InvalidGpu(gpu)),
        };

        let environment = self
            .environment
            .iter()
            .map(|raw| split_pair(raw))
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let mut extra = BTreeMap::new();
        for raw in &self.set {
            let (key, value) = split_pair(raw)?;
            // Let YAML type the scalar, so `replicas=2` stays a number.
            let value = serde_yaml::from_str(&value)
                .unwrap_or(serde_yaml::Value::String(value));
            extra.insert(key, value);
        }

        Ok(SubmitValues {
            image: self.image.clone(),
            gpu,
            gpu_fraction,
            cpu: checked_quantity("cpu", &self.cpu)?,
            memory: checked_quantity("memory", &self.memory)?,
            cpu_limit: checked_quantity("cpu limit", &self.cpu_limit)?,
            memory_limit: checked_quantity("memory limit", &self.memory_limit)?,
            environment,
            project: self.project.clone(),
            user: self.user.clone(),
            interactive: self.interactive,
            job_index: None,
            extra,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub identity: JobIdentity,
    pub values:   String,
}

/// Submits and deletes jobs, keeping the registry in step with what is
/// installed.
#[async_trait]
pub trait JobLifecycle: Debug + Sync + Send {
    async fn submit(
        &self,
        request: &SubmitRequest,
        namespace: &str,
    ) -> Result<Submission, Error>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

#[derive(Debug)]
pub struct JobLifecycleImpl {
    chart:        String,
    registration: Arc<dyn Registration>,
    registry:     Arc<dyn JobRegistry>,
    job_index:    Arc<dyn JobIndex>,
    installer:    Arc<dyn Installer>,
}

impl JobLifecycleImpl {
    pub fn new(
        chart: String,
        registration: Arc<dyn Registration>,
        registry: Arc<dyn JobRegistry>,
        job_index: Arc<dyn JobIndex>,
        installer: Arc<dyn Installer>,
    ) -> Self {
        Self { chart, registration, registry, job_index, installer }
    }
}

impl JobLifecycleImpl {
    /// Undoes a submission that failed part way, removing whatever of
    /// `manifest` was applied and then the name.
    async fn release(
        &self,
        namespace: &str,
        identity: &JobIdentity,
        manifest: Option<&str>,
    ) {
        if let Some(manifest) = manifest {
            if let Err(err) = self.installer.uninstall(namespace, manifest).await {
                warn!(
                    "Failed to remove the objects of {} after a failed apply: {}",
                    identity.resolved, err
                );
            }
        }
        if let Err(err) = self.registry.delete(namespace, &identity.resolved).await
        {
            warn!(
                "Failed to release the name {} after a failed submit: {}",
                identity.resolved, err
            );
        }
    }
}

#[async_trait]
impl JobLifecycle for JobLifecycleImpl {
    async fn submit(
        &self,
        request: &SubmitRequest,
        namespace: &str,
    ) -> Result<Submission, Error> {
        let mut values = request.values()?;
        let identity = self
            .registration
            .register(&request.name, namespace, request.auto_name)
            .await?;

        match self.job_index.next_index().await {
            Ok(index) => values.job_index = Some(index),
            Err(err) => debug!("Submitting without a job index: {}", err),
        }
        let rendered = serde_yaml::to_string(&values)?;

        let manifest = match self
            .installer
            .render(&identity, namespace, &rendered)
            .await
        {
            Ok(manifest) => manifest,
            Err(err) => {
                self.release(namespace, &identity, None).await;
                return Err(err.into());
            }
        };

        // The record holds the manifest before anything reaches the cluster,
        // so `delete` can always find what to remove.
        if let Err(err) = self
            .registry
            .populate(
                namespace,
                &identity.resolved,
                BTreeMap::from([
                    (CHART_KEY.to_string(), self.chart.clone()),
                    (VALUES_KEY.to_string(), rendered.clone()),
                    (MANIFEST_KEY.to_string(), manifest.clone()),
                ]),
            )
            .await
        {
            self.release(namespace, &identity, None).await;
            return Err(err.into());
        }

        if let Err(err) = self.installer.apply(namespace, &manifest).await {
            self.release(namespace, &identity, Some(&manifest)).await;
            return Err(err.into());
        }

        info!("Submitted {} in {}", identity.resolved, namespace);
        Ok(Submission { identity, values: rendered })
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let record = self
            .registry
            .get(namespace, name)
            .await?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        match record.data.get(MANIFEST_KEY) {
            Some(manifest) => self.installer.uninstall(namespace, manifest).await?,
            None => warn!("{} has no stored manifest, only its record is removed", name),
        }

        self.registry.delete(namespace, name).await?;
        info!("Deleted {} in {}", name, namespace);
        Ok(())
    }
}
