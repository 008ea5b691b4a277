//! Registrations loaded from YAML or JSON files.
//!
//! A file lists dependencies by interface name, optionally naming the
//! implementation, the scope and hook names:
//!
//! ```yaml
//! options:
//!   allow_overwrite: false
//! dependencies:
//!   Storage:
//!     implementation: FileStorage
//!     scope: request
//!     init_hook: open
//!     destroy_hook: close
//!   Clock: {}
//! ```
//!
//! Names are resolved through a [`Catalog`] the application fills in code,
//! since Rust cannot look types up by path. `scope` is `app` (the default,
//! meaning singleton), `transient`, or any scope name.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::container::Container;
use crate::error::{DiError, DiResult};
use crate::key::{key_of_type, Key};
use crate::lifetime::Lifetime;
use crate::options::ContainerOptions;
use crate::registration::{AsyncInjectable, Injectable, Registration};

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub options: ContainerOptions,
    pub dependencies: BTreeMap<String, DependencyConfig>,
}

/// One `dependencies` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConfig {
    /// Catalog name of the implementation; the interface name when absent.
    #[serde(default)]
    pub implementation: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub init_hook: Option<String>,
    #[serde(default)]
    pub destroy_hook: Option<String>,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            implementation: None,
            scope: default_scope(),
            init_hook: None,
            destroy_hook: None,
        }
    }
}

fn default_scope() -> String {
    "app".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

impl ContainerConfig {
    /// Reads `path`. Files ending in `.json` are parsed as JSON, anything
    /// else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> DiResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                DiError::configuration(None, format!("configuration file not found at: {}", path.display()))
            }
            _ => DiError::configuration(None, format!("cannot read {}: {err}", path.display())),
        })?;
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Format::Json,
            _ => Format::Yaml,
        };
        tracing::debug!(path = %path.display(), ?format, "loading container configuration");
        match format {
            Format::Json => Self::from_json_str(&text),
            Format::Yaml => Self::from_yaml_str(&text),
        }
    }

    /// Parses YAML. An empty document is an empty configuration.
    pub fn from_yaml_str(text: &str) -> DiResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
            .map_err(|err| DiError::configuration(None, format!("failed to parse YAML configuration: {err}")))
    }

    pub fn from_json_str(text: &str) -> DiResult<Self> {
        serde_json::from_str(text)
            .map_err(|err| DiError::configuration(None, format!("failed to parse JSON configuration: {err}")))
    }

    /// Registers every entry on `container`, stopping at the first entry
    /// that fails.
    pub fn apply(&self, container: &Container, catalog: &Catalog) -> DiResult<()> {
        for (interface, entry) in &self.dependencies {
            let registration = catalog
                .registration(interface, entry)
                .map_err(|message| {
                    DiError::configuration(None, format!("error processing dependency '{interface}': {message}"))
                })?;
            container.register(registration)?;
        }
        tracing::debug!(entries = self.dependencies.len(), "applied container configuration");
        Ok(())
    }

    /// A new container with these options and registrations.
    pub fn build(&self, catalog: &Catalog) -> DiResult<Container> {
        let container = Container::with_options(self.options.clone());
        self.apply(&container, catalog)?;
        Ok(container)
    }
}

type Template = Arc<dyn Fn() -> Registration + Send + Sync>;

/// Names a configuration file may refer to.
///
/// Interface names map to keys; implementation names map to registration
/// templates. Every implementation name is also an interface name for the
/// key its template registers.
///
/// # Examples
///
/// ```rust
/// use scopewire::{BoxError, Catalog, ContainerConfig, Injectable, Injector, Resolver};
///
/// struct Clock;
/// impl Injectable for Clock {
///     fn construct(_: &mut Injector<'_>) -> Result<Self, BoxError> { Ok(Clock) }
/// }
///
/// let catalog = Catalog::new().injectable::<Clock>("Clock");
/// let config = ContainerConfig::from_yaml_str("dependencies:\n  Clock: {}\n").unwrap();
/// let container = config.build(&catalog).unwrap();
///
/// let a = container.resolve::<Clock>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &container.resolve::<Clock>().unwrap()));
/// ```
#[derive(Clone, Default)]
pub struct Catalog {
    interfaces: HashMap<String, Key>,
    templates: HashMap<String, Template>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `T`'s [`Injectable`] impl available as `name`.
    pub fn injectable<T: Injectable>(self, name: impl Into<String>) -> Self {
        self.template(name, Registration::injectable::<T>)
    }

    pub fn async_injectable<T: AsyncInjectable>(self, name: impl Into<String>) -> Self {
        self.template(name, Registration::async_injectable::<T>)
    }

    /// Makes an arbitrary registration available as `name`. The lifetime
    /// and hook names the template sets are replaced by the configured ones.
    pub fn template<F>(mut self, name: impl Into<String>, template: F) -> Self
    where
        F: Fn() -> Registration + Send + Sync + 'static,
    {
        let name = name.into();
        let key = template().key.clone();
        self.interfaces.entry(name.clone()).or_insert(key);
        self.templates.insert(name, Arc::new(template));
        self
    }

    /// Names the key for `T`, typically a shared trait object such as
    /// `Arc<dyn Storage>`.
    pub fn interface<T: ?Sized + 'static>(self, name: impl Into<String>) -> Self {
        self.interface_key(name, key_of_type::<T>())
    }

    pub fn interface_key(mut self, name: impl Into<String>, key: Key) -> Self {
        self.interfaces.insert(name.into(), key);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.interfaces.contains_key(name) || self.templates.contains_key(name)
    }

    fn registration(&self, interface: &str, entry: &DependencyConfig) -> Result<Registration, String> {
        let key = self
            .interfaces
            .get(interface)
            .ok_or_else(|| format!("unknown interface `{interface}`"))?;
        let implementation = entry.implementation.as_deref().unwrap_or(interface);
        let template = self
            .templates
            .get(implementation)
            .ok_or_else(|| format!("unknown implementation `{implementation}`"))?;

        let mut registration = template();
        if &registration.key != key {
            return Err(format!("`{implementation}` registers {}, not {key}", registration.key));
        }
        registration.init_hook = None;
        registration.destroy_hook = None;
        registration = registration.with_lifetime(Lifetime::parse(&entry.scope));
        if let Some(hook) = &entry.init_hook {
            registration = registration.init_hook(hook.clone());
        }
        if let Some(hook) = &entry.destroy_hook {
            registration = registration.destroy_hook(hook.clone());
        }
        Ok(registration)
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.interfaces.keys().collect();
        names.sort();
        f.debug_struct("Catalog").field("names", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_defaults_to_app() {
        let config = ContainerConfig::from_yaml_str("dependencies:\n  Clock: {}\n").unwrap();
        assert_eq!(config.dependencies["Clock"].scope, "app");
        assert_eq!(config.options, ContainerOptions::default());
    }

    #[test]
    fn missing_dependencies_section_is_empty() {
        let config = ContainerConfig::from_yaml_str("options:\n  max_depth: 16\n").unwrap();
        assert!(config.dependencies.is_empty());
        assert_eq!(config.options.max_depth, 16);
        assert!(ContainerConfig::from_yaml_str("").unwrap().dependencies.is_empty());
    }

    #[test]
    fn malformed_yaml_is_a_configuration_error() {
        let err = ContainerConfig::from_yaml_str("dependencies: [unclosed").unwrap_err();
        assert!(matches!(err, DiError::Configuration { .. }));
    }
}
