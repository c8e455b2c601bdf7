use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::fmt::Debug;

const INDEX_CONFIG_MAP: &str = "cli-index";
const INDEX_KEY: &str = "index";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("The job index kept changing under us after {0} attempts")]
    Contended(u32),
    #[error("Inherited an error when contacting the k8s API: {0}")]
    Kube(#[from] kube::Error),
}

/// Cluster wide counter numbering submitted jobs.
#[async_trait]
pub trait JobIndex: Debug + Sync + Send {
    async fn next_index(&self) -> Result<u64, Error>;
}

pub struct JobIndexConfigMap {
    client:    Client,
    namespace: String,
    retries:   u32,
}

impl Debug for JobIndexConfigMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobIndexConfigMap")
            .field("namespace", &self.namespace)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl JobIndexConfigMap {
    pub fn new(client: Client, namespace: String, retries: u32) -> Self {
        Self { client, namespace, retries }
    }
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 409)
}

/// Stored index incremented by one; a missing or unreadable value counts
/// as 0.
fn incremented(config_map: &ConfigMap) -> u64 {
    config_map
        .data
        .as_ref()
        .and_then(|data| data.get(INDEX_KEY))
        .and_then(|index| index.parse::<u64>().ok())
        .unwrap_or_default()
        + 1
}

#[async_trait]
impl JobIndex for JobIndexConfigMap {
    async fn next_index(&self) -> Result<u64, Error> {
        let api: Api<ConfigMap> =
            Api::namespaced(self.client.clone(), &self.namespace);

        for attempt in 1..=self.retries {
            let result = match api.get_opt(INDEX_CONFIG_MAP).await? {
                None => {
                    let created = ConfigMap {
                        metadata: ObjectMeta {
                            name: Some(INDEX_CONFIG_MAP.to_string()),
                            ..Default::default()
                        },
                        data: Some(BTreeMap::from([(
                            INDEX_KEY.to_string(),
                            "1".to_string(),
                        )])),
                        ..Default::default()
                    };
                    api.create(&PostParams::default(), &created).await.map(|_| 1)
                }
                Some(mut config_map) => {
                    // The resourceVersion read above makes the replace
                    // conditional.
                    let next = incremented(&config_map);
                    config_map
                        .data
                        .get_or_insert_with(BTreeMap::new)
                        .insert(INDEX_KEY.to_string(), next.to_string());
                    api.replace(
                        INDEX_CONFIG_MAP,
                        &PostParams::default(),
                        &config_map,
                    )
                    .await
                    .map(|_| next)
                }
            };

            match result {
                Ok(index) => return Ok(index),
                Err(err) if is_conflict(&err) => {
                    debug!("Job index update conflicted, attempt {}", attempt)
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(Error::Contended(self.retries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        missing = {None, 1},
        garbage = {Some("abc"), 1},
        existing = {Some("41"), 42}
    )]
    fn test_incremented(stored: Option<&str>, expected: u64) {
        let config_map = ConfigMap {
            data: stored.map(|index| {
                BTreeMap::from([(INDEX_KEY.to_string(), index.to_string())])
            }),
            ..Default::default()
        };
        assert_eq!(incremented(&config_map), expected);
    }
}
