/// Declares a constant holding the name of an environment variable.
#[macro_export]
macro_rules! env_var {
    ($name:ident) => {
        const $name: &'static str = stringify!($name);
    };
}

/// Loads an optional environment variable declared with [`env_var!`].
///
/// Evaluates to `None` when the variable is absent; a value that does not
/// parse as `$type` is reported through `anyhow`.
#[macro_export]
macro_rules! env_load {
    ($type:ty, $name:ident) => {
        match std::env::var($name) {
            Err(std::env::VarError::NotPresent) => None,
            raw => Some(
                raw.with_context(|| {
                    format!("{} env var is not valid unicode", $name)
                })?
                .parse::<$type>()
                .with_context(|| {
                    format!("{} was not formatted right", $name)
                })?,
            ),
        }
    };
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, Result};

    env_var!(HELPER_TEST_RETRIES);
    env_var!(HELPER_TEST_ABSENT);
    env_var!(HELPER_TEST_MALFORMED);

    fn load_retries() -> Result<Option<u32>> {
        Ok(env_load!(u32, HELPER_TEST_RETRIES))
    }

    #[test]
    fn test_env_load() -> Result<()> {
        std::env::set_var(HELPER_TEST_RETRIES, "7");
        assert_eq!(load_retries()?, Some(7));
        Ok(())
    }

    #[test]
    fn test_env_load_absent() -> Result<()> {
        let loaded: Option<u32> = env_load!(u32, HELPER_TEST_ABSENT);
        assert_eq!(loaded, None);
        Ok(())
    }

    fn load_malformed() -> Result<Option<u32>> {
        Ok(env_load!(u32, HELPER_TEST_MALFORMED))
    }

    #[test]
    fn test_env_load_malformed() {
        std::env::set_var(HELPER_TEST_MALFORMED, "seven");
        assert!(load_malformed().is_err());
    }
}
