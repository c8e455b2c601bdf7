//! Labels, annotations and resource names shared with the cluster.

/// Pod annotation holding the fraction of a GPU the pod asked for.
pub const GPU_FRACTION_ANNOTATION: &str = "gpu-fraction";
/// Pod annotation holding the index of the shared GPU device it runs on.
pub const GPU_INDEX_ANNOTATION: &str = "runai-gpu";
/// Job annotation set by the scheduler when the job cannot be placed.
pub const UNSCHEDULABLE_ANNOTATION: &str = "unschedulable";

pub const NVIDIA_GPU_RESOURCE: &str = "nvidia.com/gpu";
pub const CPU_RESOURCE: &str = "cpu";
pub const MEMORY_RESOURCE: &str = "memory";

pub const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";
pub const ROLE_LABEL: &str = "kubernetes.io/role";

pub const JOB_NAME_LABEL: &str = "job-name";
pub const RELEASE_LABEL: &str = "release";
pub const PROJECT_LABEL: &str = "project";
pub const USER_LABEL: &str = "user";

pub const FAMILY_NAME_LABEL: &str = "FamilyName";
pub const FAMILY_INDEX_LABEL: &str = "FamilyIndex";
/// Marks registry records created by this tool.
pub const JOB_CONFIG_LABEL: (&str, &str) = ("app.kubernetes.io/managed-by", "trainctl");

pub const POD_GROUP_PREFIX: &str = "pg-";
