//! # scopewire
//!
//! Scoped object lifecycles and dependency resolution for Rust.
//!
//! ## Features
//!
//! - **Lifetimes**: transient, singleton, and named scopes (`request` or any custom name)
//! - **Cycle detection**: every cycle is reported with its full chain, before recursion runs away
//! - **Lifecycle hooks**: named init/destroy methods, run at construction and in reverse on scope exit
//! - **Sync/async parity**: one resolution algorithm behind both `resolve` and `resolve_async`
//! - **Overrides**: push a replacement provider for tests, popped automatically by a guard
//! - **Introspection**: static dependency graph and registration validation
//!
//! ## Quick Start
//!
//! ```rust
//! use scopewire::{Container, Dependency, Lifetime, Resolver};
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let container = Container::new();
//! container.register_instance(Database {
//!     connection_string: "postgres://localhost".to_string(),
//! }).unwrap();
//! container.register_factory::<UserService, _>(
//!     Lifetime::request(),
//!     vec![Dependency::of::<Database>()],
//!     |inj| Ok(UserService { db: inj.dependency(0)? }),
//! ).unwrap();
//!
//! let scope = container.enter_scope("request").unwrap();
//! let users = scope.resolve::<UserService>().unwrap();
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! assert!(Arc::ptr_eq(&users, &scope.resolve::<UserService>().unwrap()));
//! scope.exit().unwrap();
//! ```
//!
//! ## Lifetimes
//!
//! - **Singleton**: built once, owned by the container's root (`app`) scope
//! - **Scoped**: built once per active scope with the given name
//! - **Transient**: built on every resolution
//!
//! A cached value's dependencies resolve relative to the scope that owns it,
//! so a singleton can never capture a request-scoped value.
//!
//! ## Async
//!
//! Providers and hooks may be async. Async resolution follows exactly the
//! same steps as sync resolution; a sync call that reaches an async provider
//! fails with [`DiError::AsyncDependency`] instead of blocking.
//!
//! ## Feature flags
//!
//! - `config`: serde support for [`ContainerOptions`] and YAML/JSON
//!   registration files ([`ContainerConfig`], [`Catalog`])
//! - `graph-export`: JSON export of the [`DependencyGraph`]

pub mod container;
pub mod error;
pub mod graph;
pub mod key;
pub mod lifecycle;
pub mod lifetime;
pub mod observer;
pub mod options;
pub mod overrides;
pub mod registration;
pub mod traits;
pub mod validation;

#[cfg(feature = "config")]
pub mod config;

// Internal modules
mod internal;
mod resolver;

pub use container::{Container, Dependencies, Injector, Scope, ScopeStack, ScopedResolver};
pub use error::{BoxError, DiError, DiResult, ProviderError};
pub use graph::{DependencyGraph, GraphNode, NodeSource};
pub use key::{key_of_named, key_of_type, Key};
pub use lifecycle::{BoxFuture, HookTable};
pub use lifetime::{Lifetime, ScopeName};
pub use observer::{DiObserver, TracingObserver};
pub use options::ContainerOptions;
pub use overrides::OverrideGuard;
pub use registration::{AnyArc, AsyncInjectable, Dependency, Injectable, Registration};
pub use traits::{Resolver, ResolverCore};
pub use validation::{ValidationError, ValidationReport, ValidationWarning};

#[cfg(feature = "config")]
pub use config::{Catalog, ContainerConfig, DependencyConfig};
