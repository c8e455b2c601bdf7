use super::keys::{FAMILY_INDEX_LABEL, FAMILY_NAME_LABEL, JOB_CONFIG_LABEL};
use crate::JobName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity granted to a job once its registry record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobIdentity {
    pub requested:    JobName,
    pub resolved:     String,
    pub family_index: u32,
}

/// Name of the `index`-th member of the family `base`; index 0 is the bare
/// name.
pub fn candidate_name(base: &str, index: u32) -> String {
    if index == 0 {
        base.to_string()
    } else {
        format!("{base}-{index}")
    }
}

/// Record whose successful creation reserves a job name in a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistryRecord {
    pub name:         String,
    pub namespace:    String,
    pub family_name:  String,
    pub family_index: u32,
    pub data:         BTreeMap<String, String>,
}

impl RegistryRecord {
    pub fn candidate(family: &JobName, namespace: &str, index: u32) -> Self {
        Self {
            name: candidate_name(family.as_ref(), index),
            namespace: namespace.to_string(),
            family_name: family.as_ref().to_string(),
            family_index: index,
            data: BTreeMap::new(),
        }
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (FAMILY_NAME_LABEL.to_string(), self.family_name.clone()),
            (FAMILY_INDEX_LABEL.to_string(), self.family_index.to_string()),
            (JOB_CONFIG_LABEL.0.to_string(), JOB_CONFIG_LABEL.1.to_string()),
        ])
    }

    /// Rebuilds a record from stored labels. Records missing the family
    /// labels still count as occupying their name, with index 0.
    pub fn from_labels(
        name: String,
        namespace: String,
        labels: &BTreeMap<String, String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        let family_name = labels
            .get(FAMILY_NAME_LABEL)
            .cloned()
            .unwrap_or_else(|| name.clone());
        let family_index = labels
            .get(FAMILY_INDEX_LABEL)
            .and_then(|index| index.parse().ok())
            .unwrap_or_default();
        Self { name, namespace, family_name, family_index, data }
    }

    pub fn identity(&self, requested: JobName) -> JobIdentity {
        JobIdentity {
            requested,
            resolved: self.name.clone(),
            family_index: self.family_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        bare = {0, "job-a"},
        first = {1, "job-a-1"},
        tenth = {10, "job-a-10"}
    )]
    fn test_candidate_name(index: u32, expected: &str) {
        assert_eq!(candidate_name("job-a", index), expected);
    }

    #[test]
    fn test_labels_roundtrip() {
        let family = JobName::try_new("job-a").expect("valid name");
        let record = RegistryRecord::candidate(&family, "team-a", 2);

        assert_eq!(record.name, "job-a-2");
        let labels = record.labels();
        assert_eq!(labels.get(FAMILY_NAME_LABEL).map(String::as_str), Some("job-a"));
        assert_eq!(labels.get(FAMILY_INDEX_LABEL).map(String::as_str), Some("2"));

        let rebuilt = RegistryRecord::from_labels(
            record.name.clone(),
            record.namespace.clone(),
            &labels,
            BTreeMap::new(),
        );
        assert_eq!(rebuilt, record);
    }
}
