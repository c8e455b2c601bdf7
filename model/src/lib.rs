use nutype::nutype;

/// Name of a training job. Must be a DNS-1035 label since it names the
/// Kubernetes objects created for the job.
#[nutype(
    sanitize(trim),
    validate(
        len_char_min = 1,
        len_char_max = 63,
        regex = "^[a-z]([-a-z0-9]*[a-z0-9])?$"
    ),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Serialize,
        Deserialize
    )
)]
pub struct JobName(String);

pub mod domain;
pub mod dto;
pub mod view;

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        simple = {"job-a", true},
        trimmed = {"  train1 ", true},
        uppercase = {"Job-A", false},
        leading_digit = {"1job", false},
        trailing_dash = {"job-", false},
        underscore = {"job_a", false},
        empty = {"", false}
    )]
    fn test_job_name(raw: &str, valid: bool) {
        assert_eq!(JobName::try_new(raw).is_ok(), valid);
    }

    #[test]
    fn test_job_name_length() {
        assert!(JobName::try_new("a".repeat(63)).is_ok());
        assert!(JobName::try_new("a".repeat(64)).is_err());
    }
}
