//! Instance lifetimes and scope names.

use std::borrow::Cow;
use std::fmt;

/// Name of a scope a `Scoped` registration lives in.
///
/// `ScopeName::APP` is the container's permanent root scope and cannot be
/// entered explicitly; `ScopeName::REQUEST` is the conventional per-request
/// scope. Any other name is a custom scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeName(Cow<'static, str>);

impl ScopeName {
    pub const APP: ScopeName = ScopeName(Cow::Borrowed("app"));
    pub const REQUEST: ScopeName = ScopeName(Cow::Borrowed("request"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_app(&self) -> bool {
        self.0 == "app"
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ScopeName {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for ScopeName {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

/// Lifetime policy controlling instance sharing
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, Lifetime, Resolver};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct Repository { db: Arc<Database> }
///
/// let container = Container::new();
/// container.register_factory::<Database, _>(Lifetime::Singleton, vec![], |_| {
///     Ok(Database { url: "postgres://localhost".to_string() })
/// }).unwrap();
/// container.register_factory::<Repository, _>(
///     Lifetime::request(),
///     vec![scopewire::Dependency::of::<Database>()],
///     |inj| Ok(Repository { db: inj.dependency::<Database>(0)? }),
/// ).unwrap();
///
/// let db = container.resolve::<Database>().unwrap();
/// let scope = container.enter_scope("request").unwrap();
/// let repo_a = scope.resolve::<Repository>().unwrap();
/// let repo_b = scope.resolve::<Repository>().unwrap();
/// assert!(Arc::ptr_eq(&repo_a, &repo_b));
/// assert!(Arc::ptr_eq(&repo_a.db, &db));
/// scope.exit().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// New instance per resolution, never cached
    Transient,
    /// Single instance per container, cached in the root scope
    Singleton,
    /// Single instance per active scope of the given name
    Scoped(ScopeName),
}

impl Lifetime {
    pub fn request() -> Self {
        Lifetime::Scoped(ScopeName::REQUEST)
    }

    pub fn scoped(name: impl Into<ScopeName>) -> Self {
        Lifetime::Scoped(name.into())
    }

    pub fn is_cached(&self) -> bool {
        !matches!(self, Lifetime::Transient)
    }

    /// Parses the textual form used in configuration files: `app` or
    /// `singleton`, `transient`, or any other scope name.
    pub fn parse(text: &str) -> Self {
        match text {
            "app" | "singleton" => Lifetime::Singleton,
            "transient" => Lifetime::Transient,
            other => Lifetime::Scoped(ScopeName::from(other.to_string())),
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Transient => f.write_str("transient"),
            Lifetime::Singleton => f.write_str("singleton"),
            Lifetime::Scoped(name) => write!(f, "scoped({name})"),
        }
    }
}
