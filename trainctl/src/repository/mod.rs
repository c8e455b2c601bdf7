pub(crate) mod installer;
pub(crate) mod job_index;
pub(crate) mod k8s;
pub(crate) mod metrics;
pub(crate) mod registry;
