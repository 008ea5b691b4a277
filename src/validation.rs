//! Static checks over the registered dependency graph.
//!
//! Catches configuration mistakes before traffic arrives: dependencies that
//! can never be resolved, cycles, and singletons that would need a value from
//! a shorter-lived scope.

use std::collections::BTreeSet;
use std::fmt;

use crate::container::Container;
use crate::error::{DiError, DiResult};
use crate::graph::{DependencyGraph, NodeSource};
use crate::key::Key;
use crate::lifetime::{Lifetime, ScopeName};

/// Outcome of [`Container::validate`].
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// Problems that make resolution fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingDependency { service: Key, dependency: Key },
    CircularDependency { cycle: Vec<Key> },
    /// A singleton reaches a scoped value, directly or through transients.
    SingletonDependsOnScoped { singleton: Key, scoped: Key, scope: ScopeName },
}

/// Legal but suspicious shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// The transient is built once and then lives as long as the singleton.
    SingletonDependsOnTransient { singleton: Key, transient: Key },
    /// Resolves only while a `dependency_scope` scope encloses the
    /// `scope` scope.
    CrossScopeDependency {
        service: Key,
        scope: ScopeName,
        dependency: Key,
        dependency_scope: ScopeName,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingDependency { service, dependency } => {
                write!(f, "{} depends on unregistered {}", service.short_name(), dependency.short_name())
            }
            ValidationError::CircularDependency { cycle } => {
                let chain: Vec<String> = cycle.iter().map(Key::short_name).collect();
                write!(f, "circular dependency: {}", chain.join(" -> "))
            }
            ValidationError::SingletonDependsOnScoped { singleton, scoped, scope } => write!(
                f,
                "singleton {} depends on {} scoped to `{scope}`",
                singleton.short_name(),
                scoped.short_name()
            ),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::SingletonDependsOnTransient { singleton, transient } => write!(
                f,
                "singleton {} captures transient {}",
                singleton.short_name(),
                transient.short_name()
            ),
            ValidationWarning::CrossScopeDependency {
                service,
                scope,
                dependency,
                dependency_scope,
            } => write!(
                f,
                "{} (scope `{scope}`) needs {} from scope `{dependency_scope}`",
                service.short_name(),
                dependency.short_name()
            ),
        }
    }
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turns errors into one `DiError::Configuration`; warnings are dropped.
    pub fn into_result(self) -> DiResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let message = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(DiError::configuration(None, message))
    }
}

/// Checks `graph` for errors and warnings.
pub fn validate(graph: &DependencyGraph) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (service, dependency) in graph.missing() {
        report.errors.push(ValidationError::MissingDependency { service, dependency });
    }
    if let Some(cycle) = graph.find_cycle() {
        report.errors.push(ValidationError::CircularDependency { cycle });
    }

    for node in graph.nodes() {
        match &node.lifetime {
            Some(Lifetime::Singleton) => check_singleton(graph, &node.key, &mut report),
            Some(Lifetime::Scoped(scope)) => {
                for dependency in &node.dependencies {
                    if let Some(Lifetime::Scoped(other)) = graph.node(dependency).and_then(|n| n.lifetime.as_ref()) {
                        if other != scope {
                            report.warnings.push(ValidationWarning::CrossScopeDependency {
                                service: node.key.clone(),
                                scope: scope.clone(),
                                dependency: dependency.clone(),
                                dependency_scope: other.clone(),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }
    report
}

/// Walks a singleton's dependencies through transients, which resolve in
/// the root scope along with it.
fn check_singleton(graph: &DependencyGraph, singleton: &Key, report: &mut ValidationReport) {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<(Key, bool)> = graph
        .dependencies_of(singleton)
        .unwrap_or_default()
        .iter()
        .map(|k| (k.clone(), true))
        .collect();

    while let Some((key, direct)) = stack.pop() {
        if !seen.insert(key.clone()) {
            continue;
        }
        let Some(node) = graph.node(&key) else { continue };
        if node.source == NodeSource::Missing {
            continue;
        }
        match &node.lifetime {
            Some(Lifetime::Scoped(scope)) => report.errors.push(ValidationError::SingletonDependsOnScoped {
                singleton: singleton.clone(),
                scoped: key.clone(),
                scope: scope.clone(),
            }),
            Some(Lifetime::Transient) => {
                if direct {
                    report.warnings.push(ValidationWarning::SingletonDependsOnTransient {
                        singleton: singleton.clone(),
                        transient: key.clone(),
                    });
                }
                stack.extend(node.dependencies.iter().map(|k| (k.clone(), false)));
            }
            _ => {}
        }
    }
}

impl Container {
    /// The static dependency graph of everything registered.
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::build(&self.registrations())
    }

    /// Checks the registrations without building anything.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use scopewire::{Container, Dependency, Lifetime, ValidationError};
    ///
    /// struct Session;
    /// struct Cache;
    ///
    /// let container = Container::new();
    /// container.register_factory::<Session, _>(Lifetime::request(), vec![], |_| Ok(Session)).unwrap();
    /// container.register_factory::<Cache, _>(
    ///     Lifetime::Singleton,
    ///     vec![Dependency::of::<Session>()],
    ///     |_| Ok(Cache),
    /// ).unwrap();
    ///
    /// let report = container.validate();
    /// assert!(matches!(report.errors[0], ValidationError::SingletonDependsOnScoped { .. }));
    /// ```
    pub fn validate(&self) -> ValidationReport {
        let report = validate(&self.dependency_graph());
        for warning in &report.warnings {
            tracing::debug!(%warning, "validation warning");
        }
        report
    }
}
