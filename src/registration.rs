//! Registrations, dependency descriptors and the registry.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::container::context::{Dependencies, Injector};
use crate::error::{BoxError, DiError, DiResult};
use crate::key::{key_of_named, key_of_type, Key};
use crate::lifecycle::{BoxFuture, HookTable, Hooks};
use crate::lifetime::{Lifetime, ScopeName};

/// Type-erased shared value as stored in scope caches.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type SyncCtor = Arc<dyn for<'a> Fn(&mut Injector<'a>) -> Result<AnyArc, BoxError> + Send + Sync>;
pub(crate) type AsyncCtor = Arc<dyn Fn(Dependencies) -> BoxFuture<'static, Result<AnyArc, BoxError>> + Send + Sync>;

/// How a registration builds its value.
#[derive(Clone)]
pub(crate) enum Provider {
    Sync(SyncCtor),
    Async(AsyncCtor),
}

impl Provider {
    pub(crate) fn is_async(&self) -> bool {
        matches!(self, Provider::Async(_))
    }
}

/// A value a shape needs in order to be built.
///
/// Dependencies are declared up front so the resolver can walk them before
/// calling the provider, and so the dependency graph can be inspected without
/// building anything. `Dependency::auto` additionally carries the recipe for
/// building `T` when nobody registered it.
#[derive(Clone)]
pub struct Dependency {
    pub(crate) key: Key,
    pub(crate) shape: Option<fn() -> Registration>,
}

impl Dependency {
    /// A dependency on the registration for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            key: key_of_type::<T>(),
            shape: None,
        }
    }

    /// A dependency on the registration for `T` tagged `name`.
    pub fn named<T: ?Sized + 'static>(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            key: key_of_named::<T>(name),
            shape: None,
        }
    }

    pub fn on_key(key: Key) -> Self {
        Self { key, shape: None }
    }

    /// A dependency on `T` that falls back to building `T` as a transient
    /// when `T` is not registered.
    pub fn auto<T: Injectable>() -> Self {
        Self {
            key: key_of_type::<T>(),
            shape: Some(Registration::injectable::<T>),
        }
    }

    /// Like [`Dependency::auto`] for shapes with an async constructor.
    pub fn auto_async<T: AsyncInjectable>() -> Self {
        Self {
            key: key_of_type::<T>(),
            shape: Some(Registration::async_injectable::<T>),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Whether the container may build this dependency without a registration.
    pub fn is_constructible(&self) -> bool {
        self.shape.is_some()
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("key", &self.key)
            .field("constructible", &self.shape.is_some())
            .finish()
    }
}

/// A type the container knows how to build from its declared dependencies.
///
/// # Examples
///
/// ```rust
/// use scopewire::{BoxError, Container, Dependency, Injectable, Injector, Resolver};
/// use std::sync::Arc;
///
/// struct Clock;
/// impl Injectable for Clock {
///     fn construct(_: &mut Injector<'_>) -> Result<Self, BoxError> { Ok(Clock) }
/// }
///
/// struct Greeter { clock: Arc<Clock> }
/// impl Injectable for Greeter {
///     fn dependencies() -> Vec<Dependency> { vec![Dependency::auto::<Clock>()] }
///     fn construct(inj: &mut Injector<'_>) -> Result<Self, BoxError> {
///         Ok(Greeter { clock: inj.dependency(0)? })
///     }
/// }
///
/// // Neither type is registered; both are built on demand.
/// let container = Container::new();
/// let greeter = container.resolve_auto::<Greeter>().unwrap();
/// # let _ = &greeter.clock;
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    /// Builds the value. `injector.dependency(i)` yields the `i`th declared
    /// dependency, already resolved.
    fn construct(injector: &mut Injector<'_>) -> Result<Self, BoxError>;

    /// Methods usable as init/destroy hooks.
    fn hooks() -> HookTable<Self> {
        HookTable::new()
    }
}

/// A type whose constructor must be awaited.
#[async_trait::async_trait]
pub trait AsyncInjectable: Sized + Send + Sync + 'static {
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    async fn construct(dependencies: Dependencies) -> Result<Self, BoxError>;

    fn hooks() -> HookTable<Self> {
        HookTable::new()
    }
}

/// Binding of a key to a provider, its dependencies, lifetime and hooks.
///
/// Built with the constructors below and refined with builder methods; once
/// handed to the container it never changes.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, Dependency, Lifetime, Registration, Resolver};
///
/// struct Config { url: String }
/// struct Client { url: String }
///
/// let container = Container::new();
/// container.register(Registration::instance(Config { url: "db://main".into() })).unwrap();
/// container.register(
///     Registration::factory::<Client, _>(vec![Dependency::of::<Config>()], |inj| {
///         let config = inj.dependency::<Config>(0)?;
///         Ok(Client { url: config.url.clone() })
///     })
///     .with_lifetime(Lifetime::Singleton),
/// ).unwrap();
///
/// assert_eq!(container.resolve::<Client>().unwrap().url, "db://main");
/// ```
#[derive(Clone)]
pub struct Registration {
    pub(crate) key: Key,
    pub(crate) provider: Provider,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) lifetime: Lifetime,
    pub(crate) init_hook: Option<Cow<'static, str>>,
    pub(crate) destroy_hook: Option<Cow<'static, str>>,
    pub(crate) hooks: Arc<Hooks>,
    pub(crate) value_type: (TypeId, &'static str),
}

impl Registration {
    /// Transient registration built through `T`'s [`Injectable`] impl.
    pub fn injectable<T: Injectable>() -> Self {
        let ctor = |injector: &mut Injector<'_>| -> Result<AnyArc, BoxError> {
            T::construct(injector).map(|value| Arc::new(value) as AnyArc)
        };
        Self::with_provider::<T>(Provider::Sync(Arc::new(ctor)), T::dependencies())
            .hooks(T::hooks())
    }

    /// Transient registration built through `T`'s [`AsyncInjectable`] impl.
    pub fn async_injectable<T: AsyncInjectable>() -> Self {
        let ctor = |deps: Dependencies| -> BoxFuture<'static, Result<AnyArc, BoxError>> {
            Box::pin(async move { T::construct(deps).await.map(|value| Arc::new(value) as AnyArc) })
        };
        Self::with_provider::<T>(Provider::Async(Arc::new(ctor)), T::dependencies())
            .hooks(T::hooks())
    }

    /// Transient registration with a synchronous factory.
    pub fn factory<T, F>(dependencies: Vec<Dependency>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(&mut Injector<'a>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let ctor = move |injector: &mut Injector<'_>| -> Result<AnyArc, BoxError> {
            factory(injector).map(|value| Arc::new(value) as AnyArc)
        };
        Self::with_provider::<T>(Provider::Sync(Arc::new(ctor)), dependencies)
    }

    /// Transient registration with an async factory. The factory receives
    /// the resolved dependencies by value.
    pub fn async_factory<T, F, Fut>(dependencies: Vec<Dependency>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let ctor = move |deps: Dependencies| -> BoxFuture<'static, Result<AnyArc, BoxError>> {
            let fut = factory(deps);
            Box::pin(async move { fut.await.map(|value| Arc::new(value) as AnyArc) })
        };
        Self::with_provider::<T>(Provider::Async(Arc::new(ctor)), dependencies)
    }

    /// Singleton registration for an already-built value.
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        let shared: AnyArc = Arc::new(value);
        let ctor = move |_: &mut Injector<'_>| -> Result<AnyArc, BoxError> { Ok(shared.clone()) };
        Self::with_provider::<T>(Provider::Sync(Arc::new(ctor)), Vec::new()).singleton()
    }

    fn with_provider<T: 'static>(provider: Provider, dependencies: Vec<Dependency>) -> Self {
        Self {
            key: key_of_type::<T>(),
            provider,
            dependencies,
            lifetime: Lifetime::Transient,
            init_hook: None,
            destroy_hook: None,
            hooks: Arc::new(Hooks::default()),
            value_type: (TypeId::of::<T>(), std::any::type_name::<T>()),
        }
    }

    /// Registers under the key of the same type tagged `name`.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.key = Key::Named(self.value_type.0, self.value_type.1, name.into());
        self
    }

    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn singleton(self) -> Self {
        self.with_lifetime(Lifetime::Singleton)
    }

    pub fn transient(self) -> Self {
        self.with_lifetime(Lifetime::Transient)
    }

    pub fn scoped(self, scope: impl Into<ScopeName>) -> Self {
        self.with_lifetime(Lifetime::Scoped(scope.into()))
    }

    pub fn request_scoped(self) -> Self {
        self.with_lifetime(Lifetime::request())
    }

    /// Name of the hook to run after construction, before the value is
    /// returned to anyone.
    pub fn init_hook(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.init_hook = Some(name.into());
        self
    }

    /// Name of the hook to run when the owning scope exits.
    ///
    /// The teardown entry is queued when the value is stored in its cache,
    /// before the init hook runs, so a value whose init hook failed is still
    /// torn down. Destroy hooks run in reverse order of that queueing.
    pub fn destroy_hook(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.destroy_hook = Some(name.into());
        self
    }

    /// Replaces the hook table. The table's type must match the value type;
    /// this is checked when the registration is stored.
    pub fn hooks<T: Send + Sync + 'static>(mut self, table: HookTable<T>) -> Self {
        self.hooks = Arc::new(table.erase());
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn init_hook_name(&self) -> Option<&str> {
        self.init_hook.as_deref()
    }

    pub fn destroy_hook_name(&self) -> Option<&str> {
        self.destroy_hook.as_deref()
    }

    /// Type name of the value the provider builds.
    pub fn value_type_name(&self) -> &'static str {
        self.value_type.1
    }

    /// True when the provider or the init hook must be awaited.
    pub fn is_async(&self) -> bool {
        self.provider.is_async()
            || self
                .init_hook
                .as_deref()
                .is_some_and(|name| self.hooks.is_async(name))
    }

    /// Rejects registrations the resolver could never satisfy.
    pub(crate) fn check(&self) -> DiResult<()> {
        if self.key.type_id() != self.value_type.0 {
            return Err(DiError::configuration(
                Some(&self.key),
                format!("provider builds {}", self.value_type.1),
            ));
        }
        if let Lifetime::Scoped(name) = &self.lifetime {
            if name.is_app() {
                return Err(DiError::configuration(
                    Some(&self.key),
                    "`app` is the root scope; register as Singleton instead",
                ));
            }
        }
        if let Some((owner, owner_name)) = self.hooks.owner() {
            if owner != self.value_type.0 {
                return Err(DiError::configuration(
                    Some(&self.key),
                    format!("hook table is for {owner_name}, provider builds {}", self.value_type.1),
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("dependencies", &self.dependencies)
            .field("async", &self.is_async())
            .field("init_hook", &self.init_hook)
            .field("destroy_hook", &self.destroy_hook)
            .finish()
    }
}

/// Key → registration store, plus registrations synthesized for
/// auto-constructible shapes.
pub(crate) struct Registry {
    entries: RwLock<HashMap<Key, Arc<Registration>>>,
    implicit: RwLock<HashMap<Key, Arc<Registration>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            implicit: RwLock::new(HashMap::new()),
        }
    }

    /// Stores `registration`, returning the entry it replaced.
    pub(crate) fn insert(
        &self,
        registration: Registration,
        allow_overwrite: bool,
    ) -> DiResult<Option<Arc<Registration>>> {
        registration.check()?;
        let mut entries = self.entries.write();
        if !allow_overwrite && entries.contains_key(&registration.key) {
            return Err(DiError::configuration(
                Some(&registration.key),
                "already registered and overwrite is disabled",
            ));
        }
        Ok(entries.insert(registration.key.clone(), Arc::new(registration)))
    }

    #[inline]
    pub(crate) fn get(&self, key: &Key) -> Option<Arc<Registration>> {
        self.entries.read().get(key).cloned()
    }

    #[inline]
    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Registration synthesized from a constructible dependency. Built once
    /// per key; always transient.
    pub(crate) fn implicit(&self, dependency: &Dependency) -> Option<Arc<Registration>> {
        let shape = dependency.shape?;
        if let Some(found) = self.implicit.read().get(&dependency.key) {
            return Some(found.clone());
        }
        let mut implicit = self.implicit.write();
        let entry = implicit
            .entry(dependency.key.clone())
            .or_insert_with(|| Arc::new(shape().transient()));
        Some(entry.clone())
    }

    /// All explicit registrations, in key order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Registration>> {
        let mut all: Vec<_> = self.entries.read().values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Drops every registration, explicit and synthesized.
    pub(crate) fn clear(&self) -> usize {
        self.implicit.write().clear();
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }
}
