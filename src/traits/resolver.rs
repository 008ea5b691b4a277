//! Resolver traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::container::context::downcast;
use crate::error::DiResult;
use crate::key::{key_of_named, key_of_type, Key};
use crate::registration::{AnyArc, AsyncInjectable, Dependency, Injectable};

/// Object-safe resolution over type-erased values.
///
/// Implemented by [`Container`](crate::Container) (resolving from the root
/// scope), [`Scope`](crate::Scope), [`ScopedResolver`](crate::ScopedResolver)
/// and [`ScopeStack`](crate::ScopeStack). Most callers want the typed
/// methods of [`Resolver`] instead.
#[async_trait]
pub trait ResolverCore: Send + Sync {
    /// Resolves `dependency` synchronously. Fails with
    /// [`DiError::AsyncDependency`](crate::DiError::AsyncDependency) when
    /// anything on the way must be awaited.
    fn resolve_dependency(&self, dependency: &Dependency) -> DiResult<AnyArc>;

    /// Resolves `dependency`, awaiting async providers and hooks.
    async fn resolve_dependency_async(&self, dependency: &Dependency) -> DiResult<AnyArc>;

    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        self.resolve_dependency(&Dependency::on_key(key.clone()))
    }

    async fn resolve_any_async(&self, key: &Key) -> DiResult<AnyArc> {
        self.resolve_dependency_async(&Dependency::on_key(key.clone())).await
    }
}

/// Typed resolution.
///
/// Sync and async methods run the same algorithm; the async ones can also
/// build values whose providers or init hooks are async.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, Dependency, Lifetime, Resolver};
///
/// struct Token(String);
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let container = Container::new();
/// container.register_async_factory::<Token, _, _>(Lifetime::Singleton, vec![], |_| async {
///     Ok::<_, scopewire::BoxError>(Token("secret".to_string()))
/// }).unwrap();
///
/// // Needs awaiting, so the sync path refuses it.
/// assert!(container.resolve::<Token>().is_err());
/// assert_eq!(container.resolve_async::<Token>().await.unwrap().0, "secret");
/// // Now cached, so the sync path can serve it.
/// assert_eq!(container.resolve::<Token>().unwrap().0, "secret");
/// # }
/// ```
#[async_trait]
pub trait Resolver: ResolverCore {
    fn resolve<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let key = key_of_type::<T>();
        let any = self.resolve_any(&key)?;
        downcast(key, any)
    }

    fn resolve_named<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        let key = key_of_named::<T>(name.to_string());
        let any = self.resolve_any(&key)?;
        downcast(key, any)
    }

    fn resolve_key(&self, key: &Key) -> DiResult<AnyArc> {
        self.resolve_any(key)
    }

    /// Resolves `T`, building it through its [`Injectable`] impl when it is
    /// not registered.
    fn resolve_auto<T: Injectable>(&self) -> DiResult<Arc<T>> {
        let any = self.resolve_dependency(&Dependency::auto::<T>())?;
        downcast(key_of_type::<T>(), any)
    }

    /// Resolves a value registered as `Arc<T>`, typically a trait object,
    /// and unwraps the outer layer.
    fn resolve_shared<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve::<Arc<T>>().map(|outer| (*outer).clone())
    }

    /// Resolves `T`, panicking on failure.
    fn resolve_required<T: Send + Sync + 'static>(&self) -> Arc<T> {
        self.resolve::<T>()
            .unwrap_or_else(|e| panic!("failed to resolve {}: {e}", std::any::type_name::<T>()))
    }

    async fn resolve_async<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let key = key_of_type::<T>();
        let any = self.resolve_any_async(&key).await?;
        downcast(key, any)
    }

    async fn resolve_named_async<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        let key = key_of_named::<T>(name.to_string());
        let any = self.resolve_any_async(&key).await?;
        downcast(key, any)
    }

    async fn resolve_key_async(&self, key: &Key) -> DiResult<AnyArc> {
        self.resolve_any_async(key).await
    }

    async fn resolve_auto_async<T: Injectable>(&self) -> DiResult<Arc<T>> {
        let any = self.resolve_dependency_async(&Dependency::auto::<T>()).await?;
        downcast(key_of_type::<T>(), any)
    }

    /// Like [`resolve_auto_async`](Self::resolve_auto_async) for shapes with
    /// an async constructor.
    async fn resolve_constructed_async<T: AsyncInjectable>(&self) -> DiResult<Arc<T>> {
        let any = self.resolve_dependency_async(&Dependency::auto_async::<T>()).await?;
        downcast(key_of_type::<T>(), any)
    }

    async fn resolve_shared_async<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve_async::<Arc<T>>().await.map(|outer| (*outer).clone())
    }
}

impl<R: ResolverCore> Resolver for R {}
