//! Container behaviour switches.

use std::env;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::{DiError, DiResult};
use crate::internal::frame::MAX_DEPTH;

/// Options fixed when a container is created.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, ContainerOptions, DiError};
///
/// let container = Container::with_options(ContainerOptions::default().with_allow_overwrite(false));
/// container.register_instance(1u8).unwrap();
/// assert!(matches!(container.register_instance(2u8), Err(DiError::Configuration { .. })));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerOptions {
    /// Re-registering a key replaces the earlier registration. When false,
    /// it is a configuration error instead.
    pub allow_overwrite: bool,
    /// Longest dependency chain one resolve call may build.
    pub max_depth: usize,
    /// Log a warning when a scope is dropped without being exited.
    pub warn_on_undisposed: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            allow_overwrite: true,
            max_depth: MAX_DEPTH,
            warn_on_undisposed: true,
        }
    }
}

impl ContainerOptions {
    pub fn with_allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_warn_on_undisposed(mut self, warn: bool) -> Self {
        self.warn_on_undisposed = warn;
        self
    }

    /// Defaults overridden by `<PREFIX>_ALLOW_OVERWRITE`, `<PREFIX>_MAX_DEPTH`
    /// and `<PREFIX>_WARN_ON_UNDISPOSED` where set.
    pub fn from_env(prefix: &str) -> DiResult<Self> {
        let mut options = Self::default();
        if let Some(value) = env_value(prefix, "allow_overwrite") {
            options.allow_overwrite = parse(prefix, "allow_overwrite", &value)?;
        }
        if let Some(value) = env_value(prefix, "max_depth") {
            options.max_depth = parse(prefix, "max_depth", &value)?;
        }
        if let Some(value) = env_value(prefix, "warn_on_undisposed") {
            options.warn_on_undisposed = parse(prefix, "warn_on_undisposed", &value)?;
        }
        Ok(options)
    }
}

fn env_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_uppercase()
    } else {
        format!("{}_{}", prefix.to_uppercase(), key.to_uppercase())
    }
}

fn env_value(prefix: &str, key: &str) -> Option<String> {
    env::var(env_key(prefix, key)).ok()
}

fn parse<T: std::str::FromStr>(prefix: &str, key: &str, value: &str) -> DiResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| {
        DiError::configuration(None, format!("{}={value:?}: {err}", env_key(prefix, key)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        env::set_var("SWTEST_MAX_DEPTH", "16");
        env::set_var("SWTEST_ALLOW_OVERWRITE", "false");

        let options = ContainerOptions::from_env("swtest").unwrap();
        assert_eq!(options.max_depth, 16);
        assert!(!options.allow_overwrite);
        assert!(options.warn_on_undisposed);

        env::remove_var("SWTEST_MAX_DEPTH");
        env::remove_var("SWTEST_ALLOW_OVERWRITE");
    }

    #[test]
    fn bad_env_value_is_a_configuration_error() {
        env::set_var("SWBAD_MAX_DEPTH", "deep");
        let err = ContainerOptions::from_env("swbad").unwrap_err();
        assert!(err.to_string().contains("SWBAD_MAX_DEPTH"));
        env::remove_var("SWBAD_MAX_DEPTH");
    }
}
