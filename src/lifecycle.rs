//! Init/destroy hooks.
//!
//! Rust has no way to call a method by name, so every shape publishes a
//! [`HookTable`] mapping hook names to its zero-argument methods. A
//! registration then refers to hooks by name; dispatch looks the name up in
//! the table, and a name the table does not know is a no-op.

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{BoxError, DiError, DiResult, ProviderError};
use crate::internal::context::TeardownEntry;
use crate::key::Key;
use crate::lifetime::ScopeName;
use crate::registration::AnyArc;

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type SyncHookFn = Arc<dyn Fn(&AnyArc) -> Result<(), BoxError> + Send + Sync>;
type AsyncHookFn = Arc<dyn Fn(AnyArc) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Hook {
    Sync(SyncHookFn),
    Async(AsyncHookFn),
}

/// Named zero-argument methods of `T` the container may call as hooks.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, HookTable, Registration, Resolver};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct Pool { open: AtomicBool }
///
/// impl Pool {
///     fn open(&self) { self.open.store(true, Ordering::SeqCst); }
/// }
///
/// let container = Container::new();
/// container.register(
///     Registration::factory::<Pool, _>(vec![], |_| Ok(Pool::default()))
///         .singleton()
///         .hooks(HookTable::new().method("open", |p: &Pool| { p.open(); Ok(()) }))
///         .init_hook("open"),
/// ).unwrap();
///
/// assert!(container.resolve::<Pool>().unwrap().open.load(Ordering::SeqCst));
/// ```
pub struct HookTable<T> {
    hooks: HashMap<Cow<'static, str>, Hook>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Send + Sync + 'static> HookTable<T> {
    pub fn new() -> Self {
        Self {
            hooks: HashMap::new(),
            _marker: PhantomData,
        }
    }

    /// Adds a synchronous method under `name`.
    pub fn method<F>(mut self, name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let hook = move |instance: &AnyArc| -> Result<(), BoxError> {
            match instance.downcast_ref::<T>() {
                Some(value) => f(value),
                None => Err(mismatch::<T>()),
            }
        };
        self.hooks.insert(name.into(), Hook::Sync(Arc::new(hook)));
        self
    }

    /// Adds an asynchronous method under `name`. The method receives the
    /// shared instance so the returned future can own it.
    pub fn async_method<F, Fut>(mut self, name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let hook = move |instance: AnyArc| -> BoxFuture<'static, Result<(), BoxError>> {
            match instance.downcast::<T>() {
                Ok(value) => Box::pin(f(value)),
                Err(_) => Box::pin(std::future::ready(Err(mismatch::<T>()))),
            }
        };
        self.hooks.insert(name.into(), Hook::Async(Arc::new(hook)));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    pub(crate) fn erase(self) -> Hooks {
        Hooks {
            owner: Some((TypeId::of::<T>(), std::any::type_name::<T>())),
            table: self.hooks,
        }
    }
}

impl<T: Send + Sync + 'static> Default for HookTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch<T>() -> BoxError {
    format!("hook target is not a {}", std::any::type_name::<T>()).into()
}

/// Type-erased hook table stored on a registration.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    owner: Option<(TypeId, &'static str)>,
    table: HashMap<Cow<'static, str>, Hook>,
}

impl Hooks {
    pub(crate) fn owner(&self) -> Option<(TypeId, &'static str)> {
        self.owner
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Hook> {
        self.table.get(name)
    }

    pub(crate) fn is_async(&self, name: &str) -> bool {
        matches!(self.table.get(name), Some(Hook::Async(_)))
    }
}

/// Dispatches hooks by name.
pub(crate) struct Lifecycle;

impl Lifecycle {
    /// Runs a hook that must not suspend. An async hook is reported as
    /// `AsyncDependency` without being called.
    pub(crate) fn invoke_sync(key: &Key, hooks: &Hooks, instance: &AnyArc, name: &str) -> DiResult<()> {
        match hooks.get(name) {
            None => Ok(()),
            Some(Hook::Sync(f)) => f(instance).map_err(|source| hook_error(key, name, source).into()),
            Some(Hook::Async(_)) => Err(DiError::AsyncDependency {
                key: key.clone(),
                what: "hook is asynchronous",
            }),
        }
    }

    pub(crate) async fn invoke_async(key: &Key, hooks: &Hooks, instance: &AnyArc, name: &str) -> DiResult<()> {
        let result = match hooks.get(name) {
            None => Ok(()),
            Some(Hook::Sync(f)) => f(instance),
            Some(Hook::Async(f)) => f(instance.clone()).await,
        };
        result.map_err(|source| hook_error(key, name, source).into())
    }

    /// Runs destroy hooks newest first. Every entry gets its attempt; failures
    /// come back together as one `ProviderError::Teardown`.
    pub(crate) fn teardown_sync(scope: &ScopeName, entries: Vec<TeardownEntry>) -> DiResult<()> {
        let mut failures = Vec::new();
        for entry in entries.into_iter().rev() {
            tracing::debug!(scope = %scope, key = %entry.key, hook = %entry.hook, "running destroy hook");
            if let Err(err) = Self::invoke_sync(&entry.key, &entry.hooks, &entry.instance, &entry.hook) {
                tracing::warn!(scope = %scope, key = %entry.key, error = %err, "destroy hook failed");
                failures.push(into_failure(&entry, err));
            }
        }
        Self::aggregate(scope, failures)
    }

    pub(crate) async fn teardown_async(scope: &ScopeName, entries: Vec<TeardownEntry>) -> DiResult<()> {
        let mut failures = Vec::new();
        for entry in entries.into_iter().rev() {
            tracing::debug!(scope = %scope, key = %entry.key, hook = %entry.hook, "running destroy hook");
            if let Err(err) = Self::invoke_async(&entry.key, &entry.hooks, &entry.instance, &entry.hook).await {
                tracing::warn!(scope = %scope, key = %entry.key, error = %err, "destroy hook failed");
                failures.push(into_failure(&entry, err));
            }
        }
        Self::aggregate(scope, failures)
    }

    fn aggregate(scope: &ScopeName, failures: Vec<ProviderError>) -> DiResult<()> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::Teardown {
                scope: scope.clone(),
                failures,
            }
            .into())
        }
    }
}

fn hook_error(key: &Key, name: &str, source: BoxError) -> ProviderError {
    ProviderError::Hook {
        key: key.clone(),
        hook: name.to_string(),
        source,
    }
}

fn into_failure(entry: &TeardownEntry, err: DiError) -> ProviderError {
    match err {
        DiError::Provider(failure) => failure,
        other => hook_error(&entry.key, &entry.hook, Box::new(other)),
    }
}
