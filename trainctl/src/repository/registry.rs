use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use model::domain::identity::RegistryRecord;
use model::domain::keys::FAMILY_NAME_LABEL;
use std::collections::BTreeMap;
use std::fmt::Debug;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("A registry record named {0} already exists")]
    AlreadyExists(String),
    #[error("No registry record named {0}")]
    NotFound(String),
    #[error("Inherited an error when contacting the k8s API: {0}")]
    Kube(#[from] kube::Error),
}

/// Namespaced store whose `create` only succeeds when the name is free.
#[async_trait]
pub trait JobRegistry: Debug + Sync + Send {
    async fn create(
        &self,
        record: &RegistryRecord,
    ) -> Result<RegistryRecord, Error>;

    /// Records carrying the `FamilyName` label of `family`.
    async fn list_family(
        &self,
        namespace: &str,
        family: &str,
    ) -> Result<Vec<RegistryRecord>, Error>;

    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RegistryRecord>, Error>;

    /// Merges `data` into the record's data.
    async fn populate(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), Error>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == code)
}

/// Registry backed by one ConfigMap per job.
#[derive(Clone)]
pub struct ConfigMapRegistry {
    client: Client,
}

impl Debug for ConfigMapRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMapRegistry").finish_non_exhaustive()
    }
}

impl ConfigMapRegistry {
    pub fn new(client: Client) -> Self { Self { client } }

    fn api(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn to_config_map(record: &RegistryRecord) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(record.name.clone()),
            namespace: Some(record.namespace.clone()),
            labels: Some(record.labels()),
            ..Default::default()
        },
        data: (!record.data.is_empty()).then(|| record.data.clone()),
        ..Default::default()
    }
}

fn from_config_map(
    config_map: ConfigMap,
    namespace: &str,
) -> Option<RegistryRecord> {
    let name = config_map.metadata.name?;
    Some(RegistryRecord::from_labels(
        name,
        namespace.to_string(),
        &config_map.metadata.labels.unwrap_or_default(),
        config_map.data.unwrap_or_default(),
    ))
}

#[async_trait]
impl JobRegistry for ConfigMapRegistry {
    async fn create(
        &self,
        record: &RegistryRecord,
    ) -> Result<RegistryRecord, Error> {
        trace!("create registry record {}", record.name);
        match self
            .api(&record.namespace)
            .create(&PostParams::default(), &to_config_map(record))
            .await
        {
            Ok(_) => Ok(record.clone()),
            Err(err) if is_status(&err, 409) => {
                Err(Error::AlreadyExists(record.name.clone()))
            }
            Err(err) => Err(Error::Kube(err)),
        }
    }

    async fn list_family(
        &self,
        namespace: &str,
        family: &str,
    ) -> Result<Vec<RegistryRecord>, Error> {
        let selector = format!("{FAMILY_NAME_LABEL}={family}");
        let config_maps = self
            .api(namespace)
            .list(&ListParams::default().labels(&selector))
            .await?;

        Ok(config_maps
            .into_iter()
            .filter_map(|config_map| from_config_map(config_map, namespace))
            .collect())
    }

    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RegistryRecord>, Error> {
        Ok(self
            .api(namespace)
            .get_opt(name)
            .await?
            .and_then(|config_map| from_config_map(config_map, namespace)))
    }

    async fn populate(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({ "data": data });
        match self
            .api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_status(&err, 404) => {
                Err(Error::NotFound(name.to_string()))
            }
            Err(err) => Err(Error::Kube(err)),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await
        {
            Ok(_) => Ok(()),
            Err(err) if is_status(&err, 404) => {
                Err(Error::NotFound(name.to_string()))
            }
            Err(err) => Err(Error::Kube(err)),
        }
    }
}

#[cfg(test)]
pub(crate) use fake::InMemoryRegistry;


#[cfg(test)]
mod tests {
    use super::*;
    use model::domain::keys::FAMILY_INDEX_LABEL;
    use model::JobName;

    #[test]
    fn test_config_map_roundtrip() {
        let family = JobName::try_new("job-a").expect("valid name");
        let mut record = RegistryRecord::candidate(&family, "team-a", 3);
        record.data.insert("chart".to_string(), "train-0.1.0".to_string());

        let config_map = to_config_map(&record);
        let labels = config_map.metadata.labels.clone().unwrap_or_default();
        assert_eq!(labels.get(FAMILY_INDEX_LABEL).map(String::as_str), Some("3"));

        assert_eq!(from_config_map(config_map, "team-a"), Some(record));
    }
}
