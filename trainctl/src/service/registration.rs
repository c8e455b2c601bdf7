use crate::repository::registry::{self, JobRegistry};
use async_trait::async_trait;
use model::domain::identity::{JobIdentity, RegistryRecord};
use model::JobName;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

/// Attempts made to find a free suffixed name before giving up.
pub const DEFAULT_RETRIES: u32 = 5;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(
        "seems like there is another job with the name {0}, you can use the \
         --generate-name flag"
    )]
    NameCollision(String),
    #[error(
        "could not register a name for {name} after {attempts} attempts, \
         please try again later"
    )]
    RegistrationExhausted { name: String, attempts: u32 },
    #[error(transparent)]
    Registry(#[from] registry::Error),
}

/// Reserves a collision free identity for a job.
#[async_trait]
pub trait Registration: Debug + Sync + Send {
    /// Registers `requested` as is, or, when `auto_name` is set and the name
    /// is taken, the first free `requested-<index>`.
    async fn register(
        &self,
        requested: &JobName,
        namespace: &str,
        auto_name: bool,
    ) -> Result<JobIdentity, Error>;
}

/// Smallest index from 1 that no sibling holds. Only called once the bare
/// name was refused, so index 0 counts as taken even when the record holding
/// it belongs to another family.
pub fn smallest_unoccupied_index(siblings: &[RegistryRecord]) -> u32 {
    let occupied: HashSet<u32> =
        siblings.iter().map(|record| record.family_index).collect();
    let bound = siblings.len() as u32 + 1;
    (1..=bound).find(|index| !occupied.contains(index)).unwrap_or(bound)
}

#[derive(Debug)]
pub struct RegistrationImpl {
    registry: Arc<dyn JobRegistry>,
    retries:  u32,
}

impl RegistrationImpl {
    pub fn new(registry: Arc<dyn JobRegistry>, retries: u32) -> Self {
        Self { registry, retries }
    }
}

#[async_trait]
impl Registration for RegistrationImpl {
    async fn register(
        &self,
        requested: &JobName,
        namespace: &str,
        auto_name: bool,
    ) -> Result<JobIdentity, Error> {
        let bare = RegistryRecord::candidate(requested, namespace, 0);
        match self.registry.create(&bare).await {
            Ok(record) => return Ok(record.identity(requested.clone())),
            Err(registry::Error::AlreadyExists(_)) if !auto_name => {
                return Err(Error::NameCollision(requested.to_string()));
            }
            Err(registry::Error::AlreadyExists(name)) => {
                debug!("{} is taken, looking for a free index", name)
            }
            Err(err) => return Err(err.into()),
        }

        for attempt in 1..=self.retries {
            // Re-read every time, a concurrent submitter may have won.
            let siblings =
                self.registry.list_family(namespace, requested.as_ref()).await?;
            let index = smallest_unoccupied_index(&siblings);
            let candidate =
                RegistryRecord::candidate(requested, namespace, index);

            match self.registry.create(&candidate).await {
                Ok(record) => {
                    info!("Registered {} as {}", requested, record.name);
                    return Ok(record.identity(requested.clone()));
                }
                Err(registry::Error::AlreadyExists(name)) => debug!(
                    "{} was taken concurrently, attempt {}/{}",
                    name, attempt, self.retries
                ),
                Err(err) => return Err(err.into()),
            }
        }

        Err(Error::RegistrationExhausted {
            name:     requested.to_string(),
            attempts: self.retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::registry::InMemoryRegistry;
    use anyhow::Result;
    use yare::parameterized;

    fn name(raw: &str) -> JobName { JobName::try_new(raw).expect("valid name") }

    fn siblings(indexes: &[u32]) -> Vec<RegistryRecord> {
        indexes
            .iter()
            .map(|index| RegistryRecord::candidate(&name("job-a"), "team-a", *index))
            .collect()
    }

    #[parameterized(
        none = {&[], 1},
        only_bare = {&[0], 1},
        gap = {&[0, 2], 1},
        dense = {&[0, 1], 2},
        dense_three = {&[0, 1, 2], 3},
        missing_bare = {&[1, 2], 3},
        missing_bare_gap = {&[1, 3], 2}
    )]
    fn test_smallest_unoccupied_index(indexes: &[u32], expected: u32) {
        assert_eq!(smallest_unoccupied_index(&siblings(indexes)), expected);
    }

    #[tokio::test]
    async fn test_register_bare_then_collide() -> Result<()> {
        let registration =
            RegistrationImpl::new(Arc::new(InMemoryRegistry::default()), 5);

        let first = registration.register(&name("job-a"), "team-a", false).await?;
        assert_eq!(first.resolved, "job-a");
        assert_eq!(first.family_index, 0);

        let second = registration.register(&name("job-a"), "team-a", false).await;
        assert!(matches!(second, Err(Error::NameCollision(ref n)) if n == "job-a"));
        Ok(())
    }

    #[tokio::test]
    async fn test_same_name_in_other_namespace() -> Result<()> {
        let registration =
            RegistrationImpl::new(Arc::new(InMemoryRegistry::default()), 5);

        registration.register(&name("job-a"), "team-a", false).await?;
        let other = registration.register(&name("job-a"), "team-b", false).await?;
        assert_eq!(other.resolved, "job-a");
        Ok(())
    }

    #[tokio::test]
    async fn test_auto_name_fills_gap() -> Result<()> {
        let registry = Arc::new(InMemoryRegistry::default());
        for record in siblings(&[0, 2]) {
            registry.create(&record).await?;
        }
        let registration = RegistrationImpl::new(registry.clone(), 5);

        let identity = registration.register(&name("job-a"), "team-a", true).await?;
        assert_eq!(identity.resolved, "job-a-1");
        assert_eq!(identity.family_index, 1);
        assert_eq!(identity.requested, name("job-a"));

        let next = registration.register(&name("job-a"), "team-a", true).await?;
        assert_eq!(next.resolved, "job-a-3");
        assert_eq!(
            registry.names("team-a"),
            vec!["job-a", "job-a-1", "job-a-2", "job-a-3"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_auto_name_free_bare_name() -> Result<()> {
        let registration =
            RegistrationImpl::new(Arc::new(InMemoryRegistry::default()), 5);

        let identity = registration.register(&name("job-a"), "team-a", true).await?;
        assert_eq!(identity.resolved, "job-a");
        Ok(())
    }

    #[tokio::test]
    async fn test_bare_name_held_by_other_family() -> Result<()> {
        let registry = Arc::new(InMemoryRegistry::default());
        registry
            .create(&RegistryRecord::candidate(&name("job"), "team-a", 1))
            .await?;
        let registration = RegistrationImpl::new(registry.clone(), 5);

        let identity = registration.register(&name("job-1"), "team-a", true).await?;
        assert_eq!(identity.resolved, "job-1-1");
        assert_eq!(identity.family_index, 1);
        assert_eq!(registry.names("team-a"), vec!["job-1", "job-1-1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_exhaustion() -> Result<()> {
        let registry = Arc::new(InMemoryRegistry::racing());
        registry.create(&siblings(&[0])[0]).await?;
        let registration = RegistrationImpl::new(registry, DEFAULT_RETRIES);

        let result = registration.register(&name("job-a"), "team-a", true).await;
        assert!(matches!(
            result,
            Err(Error::RegistrationExhausted { attempts: 5, .. })
        ));
        Ok(())
    }
}
