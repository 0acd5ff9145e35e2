//! typed env var reads
use anyhow::Context;

use std::{env, str};

/// Read `name` from the environment, falling back to `default`, and parse it
/// into `T`. Parse errors carry the variable name.
pub fn var_or<T, S>(name: &str, default: S) -> anyhow::Result<T>
where
    T: str::FromStr,
    <T as str::FromStr>::Err: std::error::Error + Send + Sync + 'static,
    S: ToString,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .with_context(|| format!("error parsing env var {name}"))
}

/// Read and parse `name`, or `None` when it is unset or unparseable
pub fn var_opt<T>(name: &str) -> Option<T>
where
    T: str::FromStr,
{
    env::var(name).ok()?.parse::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_applies_when_unset() {
        let val: String = var_or("VIGIL_TEST_UNSET_VAR", "fallback").unwrap();
        assert_eq!(val, "fallback");
        assert_eq!(var_opt::<u16>("VIGIL_TEST_UNSET_VAR"), None);
    }
}
