//! Scope handles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::container::Container;
use crate::error::{DiError, DiResult};
use crate::internal::context::ScopeContext;
use crate::lifecycle::Lifecycle;
use crate::lifetime::ScopeName;
use crate::registration::{AnyArc, Dependency};
use crate::resolver::Engine;
use crate::traits::ResolverCore;

/// An entered scope.
///
/// Values registered as `Scoped(name)` are cached once per active scope of
/// that name; singletons still come from the root. Call [`exit`](Self::exit)
/// (or [`exit_async`](Self::exit_async) when destroy hooks are async) to run
/// teardown. A scope that is dropped without exiting runs synchronous
/// teardown from `Drop` and logs what went wrong.
///
/// A `Scope` belongs to one task at a time; concurrent tasks each enter
/// their own.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, Lifetime, Resolver};
/// use std::sync::Arc;
///
/// struct RequestId(u32);
///
/// let container = Container::new();
/// let counter = std::sync::atomic::AtomicU32::new(0);
/// container.register_factory::<RequestId, _>(Lifetime::request(), vec![], move |_| {
///     Ok(RequestId(counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst)))
/// }).unwrap();
///
/// let first = container.enter_scope("request").unwrap();
/// let second = container.enter_scope("request").unwrap();
///
/// let a = first.resolve::<RequestId>().unwrap();
/// assert!(Arc::ptr_eq(&a, &first.resolve::<RequestId>().unwrap()));
/// assert_ne!(a.0, second.resolve::<RequestId>().unwrap().0);
///
/// first.exit().unwrap();
/// second.exit().unwrap();
/// ```
pub struct Scope {
    resolver: ScopedResolver,
    exited: bool,
}

impl Scope {
    pub(crate) fn enter(container: Container, parent: &Arc<ScopeContext>, name: ScopeName) -> DiResult<Self> {
        let id = container.inner().next_scope_id();
        let context = ScopeContext::child(parent, id, name)?;
        tracing::debug!(scope = %context.name, id, path = %context.path(), "entered scope");
        Ok(Self {
            resolver: ScopedResolver { container, context },
            exited: false,
        })
    }

    pub fn name(&self) -> &ScopeName {
        &self.resolver.context.name
    }

    pub fn container(&self) -> &Container {
        &self.resolver.container
    }

    /// Enters a scope nested in this one.
    pub fn enter_scope(&self, name: impl Into<ScopeName>) -> DiResult<Scope> {
        Scope::enter(self.resolver.container.clone(), &self.resolver.context, name.into())
    }

    /// A cloneable resolver bound to this scope, e.g. to move into a future.
    /// It fails with a scope error once the scope has exited.
    pub fn resolver(&self) -> ScopedResolver {
        self.resolver.clone()
    }

    /// Exits the scope, running destroy hooks in reverse creation order.
    ///
    /// Every hook runs even if an earlier one fails; failures are reported
    /// together as one `ProviderError::Teardown`, and the scope counts as
    /// exited either way.
    ///
    /// Exiting while nested scopes are still active is a scope error and
    /// tears nothing down yet. The scope then closes together with its last
    /// nested scope: that scope's exit runs this scope's destroy hooks right
    /// after its own.
    pub fn exit(mut self) -> DiResult<()> {
        self.exited = true;
        let closed = self.resolver.context.close(true)?;
        let observers = &self.resolver.container.inner().observers;
        closed.into_iter().fold(Ok(()), |result, closed| {
            tracing::debug!(scope = %closed.name, id = closed.id, entries = closed.entries.len(), "exiting scope");
            let exited = Lifecycle::teardown_sync(&closed.name, closed.entries);
            observers.scope_exited(&closed.name, &exited);
            result.and(exited)
        })
    }

    /// Like [`exit`](Self::exit), awaiting async destroy hooks.
    pub async fn exit_async(mut self) -> DiResult<()> {
        self.exited = true;
        let closed = self.resolver.context.close(true)?;
        let observers = &self.resolver.container.inner().observers;
        let mut result = Ok(());
        for closed in closed {
            tracing::debug!(scope = %closed.name, id = closed.id, entries = closed.entries.len(), "exiting scope");
            let exited = Lifecycle::teardown_async(&closed.name, closed.entries).await;
            observers.scope_exited(&closed.name, &exited);
            result = result.and(exited);
        }
        result
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        let context = &self.resolver.context;
        let options = &self.resolver.container.inner().options;
        if options.warn_on_undisposed && context.pending_teardown() > 0 {
            tracing::warn!(scope = %context.name, id = context.id, "scope dropped without exit; running teardown");
        }
        let closed = match context.close(true) {
            Ok(closed) => closed,
            Err(err) => {
                tracing::warn!(scope = %context.name, id = context.id, error = %err, "dropped scope left to close with its nested scopes");
                return;
            }
        };
        for closed in closed {
            if let Err(err) = Lifecycle::teardown_sync(&closed.name, closed.entries) {
                tracing::warn!(scope = %closed.name, id = closed.id, error = %err, "teardown of dropped scope failed");
            }
        }
    }
}

#[async_trait]
impl ResolverCore for Scope {
    fn resolve_dependency(&self, dependency: &Dependency) -> DiResult<AnyArc> {
        self.resolver.resolve_dependency(dependency)
    }

    async fn resolve_dependency_async(&self, dependency: &Dependency) -> DiResult<AnyArc> {
        self.resolver.resolve_dependency_async(dependency).await
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.resolver.context.name)
            .field("id", &self.resolver.context.id)
            .field("exited", &self.exited)
            .finish()
    }
}

/// Cloneable resolver bound to one scope, without the right to exit it.
#[derive(Clone)]
pub struct ScopedResolver {
    container: Container,
    context: Arc<ScopeContext>,
}

impl ScopedResolver {
    pub fn scope_name(&self) -> &ScopeName {
        &self.context.name
    }
}

#[async_trait]
impl ResolverCore for ScopedResolver {
    fn resolve_dependency(&self, dependency: &Dependency) -> DiResult<AnyArc> {
        Engine::new(self.container.inner()).resolve_blocking(&self.context, dependency)
    }

    async fn resolve_dependency_async(&self, dependency: &Dependency) -> DiResult<AnyArc> {
        Engine::new(self.container.inner())
            .resolve_suspending(&self.context, dependency)
            .await
    }
}

/// Scopes entered and exited by name, innermost last.
///
/// Resolution through the stack happens in the innermost scope, or in the
/// root when the stack is empty. Exiting a name other than the innermost
/// one is a scope error and changes nothing.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, DiError};
///
/// let container = Container::new();
/// let mut stack = container.scope_stack();
/// stack.enter("session").unwrap();
/// stack.enter("request").unwrap();
///
/// assert!(matches!(stack.exit("session"), Err(DiError::Scope { .. })));
/// stack.exit("request").unwrap();
/// stack.exit("session").unwrap();
/// assert_eq!(stack.depth(), 0);
/// ```
pub struct ScopeStack {
    container: Container,
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub(crate) fn new(container: Container) -> Self {
        Self {
            container,
            scopes: Vec::new(),
        }
    }

    pub fn enter(&mut self, name: impl Into<ScopeName>) -> DiResult<&Scope> {
        let scope = match self.scopes.last() {
            Some(parent) => parent.enter_scope(name)?,
            None => self.container.enter_scope(name)?,
        };
        self.scopes.push(scope);
        Ok(&self.scopes[self.scopes.len() - 1])
    }

    pub fn exit(&mut self, name: impl Into<ScopeName>) -> DiResult<()> {
        self.pop_matching(name.into())?.exit()
    }

    pub async fn exit_async(&mut self, name: impl Into<ScopeName>) -> DiResult<()> {
        self.pop_matching(name.into())?.exit_async().await
    }

    fn pop_matching(&mut self, name: ScopeName) -> DiResult<Scope> {
        match self.scopes.pop() {
            Some(top) if *top.name() == name => Ok(top),
            Some(top) => {
                let innermost = top.name().clone();
                self.scopes.push(top);
                Err(DiError::scope(
                    None,
                    format!("cannot exit `{name}`: innermost active scope is `{innermost}`"),
                ))
            }
            None => Err(DiError::scope(None, format!("cannot exit `{name}`: no active scope"))),
        }
    }

    pub fn current(&self) -> Option<&Scope> {
        self.scopes.last()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Drop for ScopeStack {
    fn drop(&mut self) {
        // Innermost first, so every parent sees its children closed.
        while let Some(scope) = self.scopes.pop() {
            drop(scope);
        }
    }
}

#[async_trait]
impl ResolverCore for ScopeStack {
    fn resolve_dependency(&self, dependency: &Dependency) -> DiResult<AnyArc> {
        match self.scopes.last() {
            Some(scope) => scope.resolve_dependency(dependency),
            None => self.container.resolve_dependency(dependency),
        }
    }

    async fn resolve_dependency_async(&self, dependency: &Dependency) -> DiResult<AnyArc> {
        match self.scopes.last() {
            Some(scope) => scope.resolve_dependency_async(dependency).await,
            None => self.container.resolve_dependency_async(dependency).await,
        }
    }
}
