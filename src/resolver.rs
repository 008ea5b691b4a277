//! The resolution algorithm.
//!
//! There is exactly one implementation, written as an async function and
//! parameterized over a [`Mode`]. `AsyncMode` awaits async providers and
//! hooks; `SyncMode` refuses them up front, so its futures never suspend
//! and [`run_sync`] can drive them to completion with a single poll. Both
//! paths therefore make the same lookups, cache checks, cycle checks and
//! commits in the same order.

use std::future::Future;
use std::sync::Arc;

use crate::container::context::{Dependencies, Injector, Link};
use crate::container::ContainerInner;
use crate::error::{BoxError, DiError, DiResult, ProviderError};
use crate::internal::context::{Origin, ReadyOnDrop, ScopeContext, TeardownEntry, REGISTRY};
use crate::internal::frame::{self, Frame};
use crate::internal::gate::{Claim, GateGuard, SingletonGates};
use crate::internal::poll::run_sync;
use crate::key::Key;
use crate::lifecycle::{BoxFuture, Hooks, Lifecycle};
use crate::lifetime::Lifetime;
use crate::registration::{AnyArc, Dependency, Provider, Registration, SyncCtor};

/// The points where sync and async resolution differ.
pub(crate) trait Mode: Copy + Send + Sync + 'static {
    /// Whether this mode may await async providers and hooks.
    const SUSPENDS: bool;

    /// Waits for exclusive first-time construction of a singleton, failing
    /// when the wait would close a cycle with other resolutions.
    fn acquire(self, gates: &SingletonGates, claim: Claim) -> impl Future<Output = DiResult<GateGuard<'_>>> + Send;

    fn invoke_provider<'a>(
        self,
        key: &'a Key,
        provider: &'a Provider,
        dependencies: Dependencies,
        link: Link<'a>,
    ) -> impl Future<Output = DiResult<AnyArc>> + Send + 'a;

    fn invoke_hook<'a>(
        self,
        key: &'a Key,
        hooks: &'a Hooks,
        instance: &'a AnyArc,
        name: &'a str,
    ) -> impl Future<Output = DiResult<()>> + Send + 'a;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SyncMode;

#[derive(Debug, Clone, Copy)]
pub(crate) struct AsyncMode;

impl Mode for SyncMode {
    const SUSPENDS: bool = false;

    fn acquire(self, gates: &SingletonGates, claim: Claim) -> impl Future<Output = DiResult<GateGuard<'_>>> + Send {
        std::future::ready(gates.acquire_blocking(claim))
    }

    fn invoke_provider<'a>(
        self,
        key: &'a Key,
        provider: &'a Provider,
        dependencies: Dependencies,
        link: Link<'a>,
    ) -> impl Future<Output = DiResult<AnyArc>> + Send + 'a {
        std::future::ready(match provider {
            Provider::Sync(ctor) => construct(key, ctor, dependencies, link),
            Provider::Async(_) => Err(DiError::AsyncDependency {
                key: key.clone(),
                what: "provider is asynchronous",
            }),
        })
    }

    fn invoke_hook<'a>(
        self,
        key: &'a Key,
        hooks: &'a Hooks,
        instance: &'a AnyArc,
        name: &'a str,
    ) -> impl Future<Output = DiResult<()>> + Send + 'a {
        std::future::ready(Lifecycle::invoke_sync(key, hooks, instance, name))
    }
}

impl Mode for AsyncMode {
    const SUSPENDS: bool = true;

    fn acquire(self, gates: &SingletonGates, claim: Claim) -> impl Future<Output = DiResult<GateGuard<'_>>> + Send {
        gates.acquire(claim)
    }

    fn invoke_provider<'a>(
        self,
        key: &'a Key,
        provider: &'a Provider,
        dependencies: Dependencies,
        link: Link<'a>,
    ) -> impl Future<Output = DiResult<AnyArc>> + Send + 'a {
        async move {
            match provider {
                Provider::Sync(ctor) => construct(key, ctor, dependencies, link),
                Provider::Async(ctor) => ctor(dependencies)
                    .await
                    .map_err(|source| provider_failure(key, source)),
            }
        }
    }

    fn invoke_hook<'a>(
        self,
        key: &'a Key,
        hooks: &'a Hooks,
        instance: &'a AnyArc,
        name: &'a str,
    ) -> impl Future<Output = DiResult<()>> + Send + 'a {
        Lifecycle::invoke_async(key, hooks, instance, name)
    }
}

fn construct(key: &Key, ctor: &SyncCtor, dependencies: Dependencies, link: Link<'_>) -> DiResult<AnyArc> {
    let mut injector = Injector::new(dependencies, link);
    ctor(&mut injector).map_err(|source| provider_failure(key, source))
}

/// Container errors raised inside a provider (a failed nested lookup, a
/// cycle found through it) pass through unchanged; anything else is the
/// provider's own failure.
fn provider_failure(key: &Key, source: BoxError) -> DiError {
    match source.downcast::<DiError>() {
        Ok(inner) => *inner,
        Err(source) => ProviderError::Construction {
            key: key.clone(),
            source,
        }
        .into(),
    }
}

/// Resolution over one container's registry, overrides and root scope.
#[derive(Clone, Copy)]
pub(crate) struct Engine<'c> {
    inner: &'c ContainerInner,
}

impl<'c> Engine<'c> {
    pub(crate) fn new(inner: &'c ContainerInner) -> Self {
        Self { inner }
    }

    // Resolutions are matched to their container by address.
    fn container_id(self) -> usize {
        self.inner as *const ContainerInner as usize
    }

    /// Entry point for synchronous callers. A call made from inside a
    /// provider or hook that is running for this container joins that
    /// resolution.
    pub(crate) fn resolve_blocking(self, context: &Arc<ScopeContext>, dependency: &Dependency) -> DiResult<AnyArc> {
        let observers = &self.inner.observers;
        let started = observers.resolving(&dependency.key);
        let result = frame::run_blocking(self.container_id(), self.inner.options.max_depth, |frame| {
            run_sync(self.resolve(SyncMode, context, dependency, frame)).unwrap_or_else(|| Err(suspended(&dependency.key)))
        });
        observers.finished(&dependency.key, &result, started);
        result
    }

    /// Entry point for async callers.
    pub(crate) async fn resolve_suspending(
        self,
        context: &Arc<ScopeContext>,
        dependency: &Dependency,
    ) -> DiResult<AnyArc> {
        let observers = &self.inner.observers;
        let started = observers.resolving(&dependency.key);
        let result = frame::run_suspending(self.container_id(), self.inner.options.max_depth, |mut frame| async move {
            self.resolve(AsyncMode, context, dependency, &mut frame).await
        })
        .await;
        observers.finished(&dependency.key, &result, started);
        result
    }

    /// Picks the registration that answers `dependency`: the newest override,
    /// then the registry, then a synthesized transient for constructible
    /// shapes. Returns it with the lifetime it resolves under and the origin
    /// its cached values are stored under.
    fn select(&self, dependency: &Dependency) -> DiResult<(Arc<Registration>, Lifetime, Origin)> {
        if let Some((id, registration)) = self.inner.overrides.top(&dependency.key) {
            let lifetime = registration.lifetime.clone();
            return Ok((registration, lifetime, id));
        }
        if let Some(registration) = self.inner.registry.get(&dependency.key) {
            let lifetime = registration.lifetime.clone();
            return Ok((registration, lifetime, REGISTRY));
        }
        if let Some(registration) = self.inner.registry.implicit(dependency) {
            tracing::trace!(key = %dependency.key, "constructing unregistered shape");
            return Ok((registration, Lifetime::Transient, REGISTRY));
        }
        Err(DiError::not_registered(&dependency.key))
    }

    /// Resolves `dependency` from `current`, sharing `frame` with the
    /// enclosing call.
    pub(crate) fn resolve<'a, M: Mode>(
        self,
        mode: M,
        current: &'a Arc<ScopeContext>,
        dependency: &'a Dependency,
        frame: &'a mut Frame,
    ) -> BoxFuture<'a, DiResult<AnyArc>>
    where
        'c: 'a,
    {
        Box::pin(async move {
            let key = &dependency.key;
            let (registration, lifetime, origin) = self.select(dependency)?;

            if current.is_closed() {
                return Err(DiError::scope(
                    Some(key),
                    format!("scope `{}` has exited", current.name),
                ));
            }
            let owner = match &lifetime {
                Lifetime::Transient => None,
                Lifetime::Singleton => Some(self.inner.root.clone()),
                Lifetime::Scoped(name) => Some(current.find(name).ok_or_else(|| {
                    DiError::scope(
                        Some(key),
                        format!("requires an active `{name}` scope (active: {})", current.path()),
                    )
                })?),
            };

            if let Some(owner) = &owner {
                if let Some(hit) = owner.cached(key, origin, frame.id()) {
                    tracing::trace!(key = %key, scope = %owner.name, "cache hit");
                    return Ok(hit);
                }
                if owner.is_closed() {
                    return Err(DiError::scope(
                        Some(key),
                        format!("scope `{}` has exited", owner.name),
                    ));
                }
            }

            frame.enter(key)?;
            let result = self
                .build(mode, current, owner.as_ref(), (key, origin), &registration, &lifetime, frame)
                .await;
            frame.exit(key);
            result
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn build<M: Mode>(
        self,
        mode: M,
        current: &Arc<ScopeContext>,
        owner: Option<&Arc<ScopeContext>>,
        (key, origin): (&Key, Origin),
        registration: &Registration,
        lifetime: &Lifetime,
        frame: &mut Frame,
    ) -> DiResult<AnyArc> {
        if !M::SUSPENDS {
            if registration.provider.is_async() {
                return Err(DiError::AsyncDependency {
                    key: key.clone(),
                    what: "provider is asynchronous",
                });
            }
            if registration.is_async() {
                return Err(DiError::AsyncDependency {
                    key: key.clone(),
                    what: "init hook is asynchronous",
                });
            }
        }

        // First-time singleton construction is exclusive per key; whoever
        // waited re-checks the cache once the gate is theirs.
        let gate = match lifetime {
            Lifetime::Singleton => Some(mode.acquire(&self.inner.gates, Claim::new(key, frame)).await?),
            _ => None,
        };
        if let (Some(_), Some(owner)) = (&gate, owner) {
            if let Some(hit) = owner.cached(key, origin, frame.id()) {
                return Ok(hit);
            }
        }

        // Cached values take their dependencies from the scope that owns
        // them, so a singleton can never capture a request-scoped value.
        let context = owner.unwrap_or(current);
        let mut values = Vec::with_capacity(registration.dependencies.len());
        for dependency in &registration.dependencies {
            let value = self.resolve(mode, context, dependency, &mut *frame).await?;
            values.push((dependency.key.clone(), value));
        }

        let link = Link {
            engine: self,
            context,
            frame: &mut *frame,
        };
        let instance = mode
            .invoke_provider(key, &registration.provider, Dependencies::new(values), link)
            .await?;
        tracing::debug!(key = %key, lifetime = %lifetime, scope = %context.name, depth = frame.depth(), "constructed");

        let teardown = registration.destroy_hook.as_ref().map(|hook| TeardownEntry {
            key: key.clone(),
            instance: instance.clone(),
            hook: hook.clone(),
            hooks: registration.hooks.clone(),
        });
        let _ready = match owner {
            Some(owner) => {
                owner.commit(key, origin, instance.clone(), frame.id(), teardown)?;
                Some(ReadyOnDrop::new(owner, key, origin))
            }
            None => {
                if let Some(entry) = teardown {
                    current.push_teardown(entry)?;
                }
                None
            }
        };

        if let Some(hook) = &registration.init_hook {
            mode.invoke_hook(key, &registration.hooks, &instance, hook).await?;
        }
        Ok(instance)
    }
}

fn suspended(key: &Key) -> DiError {
    DiError::AsyncDependency {
        key: key.clone(),
        what: "resolution suspended",
    }
}
