//! The container facade.
//!
//! A [`Container`] owns the registry, the override stack and the root
//! (`app`) scope that holds singletons. Cloning it is cheap and every clone
//! talks to the same state.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BoxError, DiError, DiResult};
use crate::internal::context::{ScopeContext, TeardownEntry};
use crate::internal::gate::SingletonGates;
use crate::key::Key;
use crate::lifecycle::Lifecycle;
use crate::lifetime::{Lifetime, ScopeName};
use crate::observer::{DiObserver, Observers};
use crate::options::ContainerOptions;
use crate::overrides::{OverrideGuard, OverrideStack};
use crate::registration::{AnyArc, AsyncInjectable, Dependency, Injectable, Registration, Registry};
use crate::resolver::Engine;
use crate::traits::ResolverCore;

pub mod context;
pub mod scope;

pub use context::{Dependencies, Injector};
pub use scope::{Scope, ScopeStack, ScopedResolver};

/// Dependency container.
///
/// Registration is meant to happen before traffic starts. Registering while
/// other threads resolve is memory-safe, but which registration those
/// resolutions observe is unspecified.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, Dependency, Lifetime, Resolver};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let container = Container::new();
/// container.register_factory::<Database, _>(Lifetime::Singleton, vec![], |_| {
///     Ok(Database { url: "postgres://localhost".to_string() })
/// }).unwrap();
/// container.register_factory::<UserService, _>(
///     Lifetime::request(),
///     vec![Dependency::of::<Database>()],
///     |inj| Ok(UserService { db: inj.dependency(0)? }),
/// ).unwrap();
///
/// let result = container.scoped("request", |scope| {
///     let users = scope.resolve::<UserService>()?;
///     Ok::<_, scopewire::DiError>(users.db.url.clone())
/// }).unwrap();
/// assert_eq!(result, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
    pub(crate) registry: Registry,
    pub(crate) overrides: OverrideStack,
    pub(crate) root: Arc<ScopeContext>,
    pub(crate) gates: SingletonGates,
    pub(crate) observers: Observers,
    pub(crate) options: ContainerOptions,
    next_scope_id: AtomicUsize,
}

impl ContainerInner {
    pub(crate) fn next_scope_id(&self) -> usize {
        self.next_scope_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if self.options.warn_on_undisposed && !self.root.is_closed() && self.root.pending_teardown() > 0 {
            tracing::warn!(
                pending = self.root.pending_teardown(),
                "container dropped with singletons awaiting teardown; call cleanup() first"
            );
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                registry: Registry::new(),
                overrides: OverrideStack::new(),
                root: ScopeContext::root(),
                gates: SingletonGates::new(),
                observers: Observers::new(),
                options,
                next_scope_id: AtomicUsize::new(1),
            }),
        }
    }

    #[inline]
    pub(crate) fn inner(&self) -> &ContainerInner {
        &self.inner
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    // ----- Registration -----

    /// Stores `registration`. A later registration for the same key replaces
    /// the earlier one unless [`ContainerOptions::allow_overwrite`] is off.
    pub fn register(&self, registration: Registration) -> DiResult<()> {
        let key = registration.key.clone();
        let lifetime = registration.lifetime.clone();
        let replaced = self
            .inner
            .registry
            .insert(registration, self.inner.options.allow_overwrite)?;
        tracing::debug!(key = %key, lifetime = %lifetime, replaced = replaced.is_some(), "registered");
        Ok(())
    }

    /// Registers `T` through its [`Injectable`] impl.
    pub fn register_type<T: Injectable>(&self, lifetime: Lifetime) -> DiResult<()> {
        self.register(Registration::injectable::<T>().with_lifetime(lifetime))
    }

    /// Registers `T` through its [`AsyncInjectable`] impl.
    pub fn register_async_type<T: AsyncInjectable>(&self, lifetime: Lifetime) -> DiResult<()> {
        self.register(Registration::async_injectable::<T>().with_lifetime(lifetime))
    }

    pub fn register_factory<T, F>(&self, lifetime: Lifetime, dependencies: Vec<Dependency>, factory: F) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&mut Injector<'a>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register(Registration::factory::<T, F>(dependencies, factory).with_lifetime(lifetime))
    }

    pub fn register_async_factory<T, F, Fut>(
        &self,
        lifetime: Lifetime,
        dependencies: Vec<Dependency>,
        factory: F,
    ) -> DiResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        self.register(Registration::async_factory::<T, F, Fut>(dependencies, factory).with_lifetime(lifetime))
    }

    /// Registers an already-built value as a singleton.
    pub fn register_instance<T: Send + Sync + 'static>(&self, value: T) -> DiResult<()> {
        self.register(Registration::instance(value))
    }

    pub fn is_registered(&self, key: &Key) -> bool {
        self.inner.registry.contains(key)
    }

    /// The stored registration for `key`.
    pub fn lookup(&self, key: &Key) -> DiResult<Arc<Registration>> {
        self.inner
            .registry
            .get(key)
            .ok_or_else(|| DiError::not_registered(key))
    }

    /// Explicit registrations in key order.
    pub fn registrations(&self) -> Vec<Arc<Registration>> {
        self.inner.registry.snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_observer(&self, observer: Arc<dyn DiObserver>) {
        self.inner.observers.add(observer);
    }

    // ----- Scopes -----

    /// Enters a scope nested directly in the root scope.
    pub fn enter_scope(&self, name: impl Into<ScopeName>) -> DiResult<Scope> {
        Scope::enter(self.clone(), &self.inner.root, name.into())
    }

    /// A name-checked stack of scopes for callers that enter and exit by name.
    pub fn scope_stack(&self) -> ScopeStack {
        ScopeStack::new(self.clone())
    }

    /// Runs `f` inside a fresh scope and exits it afterwards, also when `f`
    /// fails. An error from `f` takes precedence over a teardown failure,
    /// which is then only logged.
    pub fn scoped<R, E, F>(&self, name: impl Into<ScopeName>, f: F) -> Result<R, E>
    where
        F: FnOnce(&Scope) -> Result<R, E>,
        E: From<DiError>,
    {
        let scope = self.enter_scope(name)?;
        let result = f(&scope);
        let exited = scope.exit();
        merge_exit(result, exited)
    }

    /// Async counterpart of [`scoped`](Self::scoped); teardown awaits async
    /// destroy hooks.
    pub async fn scoped_async<R, E, F, Fut>(&self, name: impl Into<ScopeName>, f: F) -> Result<R, E>
    where
        F: FnOnce(ScopedResolver) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<DiError>,
    {
        let scope = self.enter_scope(name)?;
        let result = f(scope.resolver()).await;
        let exited = scope.exit_async().await;
        merge_exit(result, exited)
    }

    /// Tears down the root scope: destroy hooks of singletons (and of
    /// transients resolved straight from the container) run in reverse
    /// creation order. The container cannot build values afterwards.
    /// Calling it again is a no-op.
    pub fn cleanup(&self) -> DiResult<()> {
        let root = &self.inner.root;
        if root.is_closed() {
            return Ok(());
        }
        let entries = self.close_root()?;
        let result = Lifecycle::teardown_sync(&root.name, entries);
        self.inner.observers.scope_exited(&root.name, &result);
        result
    }

    pub async fn cleanup_async(&self) -> DiResult<()> {
        let root = &self.inner.root;
        if root.is_closed() {
            return Ok(());
        }
        let entries = self.close_root()?;
        let result = Lifecycle::teardown_async(&root.name, entries).await;
        self.inner.observers.scope_exited(&root.name, &result);
        result
    }

    fn close_root(&self) -> DiResult<Vec<TeardownEntry>> {
        let entries: Vec<TeardownEntry> = self
            .inner
            .root
            .close(false)?
            .into_iter()
            .flat_map(|closed| closed.entries)
            .collect();
        tracing::debug!(entries = entries.len(), "cleaning up container");
        Ok(entries)
    }

    /// Forgets every registration and cached singleton, running the destroy
    /// hooks owed so far, then leaves the container ready for new
    /// registrations. Overrides and active scopes are untouched.
    pub fn clear(&self) -> DiResult<()> {
        let removed = self.inner.registry.clear();
        let entries = self.inner.root.drain();
        tracing::debug!(registrations = removed, entries = entries.len(), "clearing container");
        Lifecycle::teardown_sync(&self.inner.root.name, entries)
    }

    // ----- Overrides -----

    /// Shadows the registration for `registration`'s key until the returned
    /// guard is dropped. The override resolves under its own lifetime, and a
    /// singleton it built is forgotten when it is removed.
    pub fn override_provider(&self, registration: Registration) -> DiResult<OverrideGuard> {
        let key = registration.key.clone();
        let id = self.inner.overrides.push(registration)?;
        Ok(OverrideGuard::new(self.clone(), key, id))
    }

    /// Runs `f` with `registration` pushed as an override.
    pub fn with_override<R>(&self, registration: Registration, f: impl FnOnce() -> R) -> DiResult<R> {
        let _guard = self.override_provider(registration)?;
        Ok(f())
    }

    /// Pushes an override without a guard; pair with [`pop_override`](Self::pop_override).
    pub fn push_override(&self, registration: Registration) -> DiResult<()> {
        self.inner.overrides.push(registration).map(|_| ())
    }

    /// Removes the newest override for `key`. Returns false if there was none.
    pub fn pop_override(&self, key: &Key) -> bool {
        match self.inner.overrides.pop(key) {
            Some(id) => {
                self.inner.root.evict(key, id);
                true
            }
            None => false,
        }
    }
}

fn merge_exit<R, E: From<DiError>>(result: Result<R, E>, exited: DiResult<()>) -> Result<R, E> {
    match (result, exited) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(teardown)) => {
            tracing::warn!(error = %teardown, "scope teardown failed after an earlier error");
            Err(err)
        }
    }
}

#[async_trait]
impl ResolverCore for Container {
    fn resolve_dependency(&self, dependency: &Dependency) -> DiResult<AnyArc> {
        Engine::new(&self.inner).resolve_blocking(&self.inner.root, dependency)
    }

    async fn resolve_dependency_async(&self, dependency: &Dependency) -> DiResult<AnyArc> {
        Engine::new(&self.inner)
            .resolve_suspending(&self.inner.root, dependency)
            .await
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.inner.registry.len())
            .field("options", &self.inner.options)
            .finish()
    }
}
