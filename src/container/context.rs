//! What providers see while they build a value.

use std::any::type_name;
use std::borrow::Cow;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::internal::context::ScopeContext;
use crate::internal::frame::Frame;
use crate::internal::poll::run_sync;
use crate::key::{key_of_named, key_of_type, Key};
use crate::registration::{AnyArc, Dependency, Injectable};
use crate::resolver::{Engine, SyncMode};

/// Resolved declared dependencies, in declaration order.
///
/// Async providers receive this by value so their futures can own it.
pub struct Dependencies {
    values: Vec<(Key, AnyArc)>,
}

impl Dependencies {
    pub(crate) fn new(values: Vec<(Key, AnyArc)>) -> Self {
        Self { values }
    }

    /// The `index`th declared dependency as `Arc<T>`.
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        let (key, value) = self.values.get(index).ok_or_else(|| {
            DiError::configuration(
                None,
                format!(
                    "dependency index {index} out of range ({} declared) while building {}",
                    self.values.len(),
                    type_name::<T>()
                ),
            )
        })?;
        value.clone().downcast::<T>().map_err(|_| DiError::TypeMismatch {
            key: key.clone(),
            expected: type_name::<T>(),
        })
    }

    pub fn key(&self, index: usize) -> Option<&Key> {
        self.values.get(index).map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub(crate) struct Link<'a> {
    pub(crate) engine: Engine<'a>,
    pub(crate) context: &'a Arc<ScopeContext>,
    pub(crate) frame: &'a mut Frame,
}

/// Handle passed to synchronous providers.
///
/// Gives access to the declared dependencies and lets a provider pull in
/// further values on the fly. Those dynamic lookups take part in cycle
/// detection like declared ones but stay invisible to the dependency graph.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, Dependency, Lifetime, Resolver};
///
/// struct Settings { verbose: bool }
/// struct Logger { verbose: bool }
///
/// let container = Container::new();
/// container.register_instance(Settings { verbose: true }).unwrap();
/// container.register_factory::<Logger, _>(Lifetime::Transient, vec![], |inj| {
///     let settings = inj.resolve::<Settings>()?;
///     Ok(Logger { verbose: settings.verbose })
/// }).unwrap();
///
/// assert!(container.resolve::<Logger>().unwrap().verbose);
/// ```
pub struct Injector<'a> {
    dependencies: Dependencies,
    link: Link<'a>,
}

impl<'a> Injector<'a> {
    pub(crate) fn new(dependencies: Dependencies, link: Link<'a>) -> Self {
        Self { dependencies, link }
    }

    /// The `index`th declared dependency as `Arc<T>`.
    pub fn dependency<T: Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        self.dependencies.get(index)
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    pub fn resolve<T: Send + Sync + 'static>(&mut self) -> DiResult<Arc<T>> {
        self.resolve_dependency(&Dependency::of::<T>())
            .and_then(|any| downcast(key_of_type::<T>(), any))
    }

    pub fn resolve_named<T: Send + Sync + 'static>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
    ) -> DiResult<Arc<T>> {
        let key = key_of_named::<T>(name);
        self.resolve_dependency(&Dependency::on_key(key.clone()))
            .and_then(|any| downcast(key, any))
    }

    /// Resolves `T`, building it from its [`Injectable`] impl when it is not
    /// registered.
    pub fn resolve_auto<T: Injectable>(&mut self) -> DiResult<Arc<T>> {
        self.resolve_dependency(&Dependency::auto::<T>())
            .and_then(|any| downcast(key_of_type::<T>(), any))
    }

    pub fn resolve_key(&mut self, key: &Key) -> DiResult<AnyArc> {
        self.resolve_dependency(&Dependency::on_key(key.clone()))
    }

    fn resolve_dependency(&mut self, dependency: &Dependency) -> DiResult<AnyArc> {
        let link = &mut self.link;
        let fut = link
            .engine
            .resolve(SyncMode, link.context, dependency, &mut *link.frame);
        run_sync(fut).unwrap_or_else(|| {
            Err(DiError::AsyncDependency {
                key: dependency.key.clone(),
                what: "resolution suspended",
            })
        })
    }
}

pub(crate) fn downcast<T: Send + Sync + 'static>(key: Key, any: AnyArc) -> DiResult<Arc<T>> {
    any.downcast::<T>().map_err(|_| DiError::TypeMismatch {
        key,
        expected: type_name::<T>(),
    })
}
