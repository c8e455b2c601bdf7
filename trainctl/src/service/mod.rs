pub(crate) mod aggregator;
pub(crate) mod job;
pub(crate) mod job_status;
pub(crate) mod lifecycle;
pub(crate) mod registration;
