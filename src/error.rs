//! Error types for the container.

use crate::key::Key;
use crate::lifetime::ScopeName;

/// Boxed error produced by user providers and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Container errors
///
/// Every variant names the offending key or scope so failures can be
/// diagnosed without knowing the container's internals.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, DiError, Resolver};
///
/// struct Missing;
///
/// let container = Container::new();
/// match container.resolve::<Missing>() {
///     Err(DiError::Resolution { key, .. }) => assert!(key.display_name().ends_with("Missing")),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DiError {
    /// Malformed registration or configuration
    #[error("configuration error{}: {message}", fmt_key(.key))]
    Configuration { key: Option<Key>, message: String },

    /// Key is not registered and cannot be constructed implicitly
    #[error("cannot resolve {key}: {reason}")]
    Resolution { key: Key, reason: String },

    /// Dependency cycle; `chain` runs from the first occurrence to the repeat
    #[error("circular dependency: {}", fmt_chain(.chain))]
    Circular { chain: Vec<Key> },

    /// Required scope is not active, or scopes were entered/exited out of order
    #[error("scope error{}: {message}", fmt_key(.key))]
    Scope { key: Option<Key>, message: String },

    /// A provider or hook failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Synchronous resolution reached a provider or hook that must be awaited
    #[error("{key} requires asynchronous resolution: {what}")]
    AsyncDependency { key: Key, what: &'static str },

    /// Resolved value does not have the requested type
    #[error("type mismatch for {key}: expected {expected}")]
    TypeMismatch { key: Key, expected: &'static str },

    /// Maximum resolution depth exceeded
    #[error("max resolution depth {0} exceeded")]
    DepthExceeded(usize),
}

/// Failures raised by user code the container invoked.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider for {key} failed: {source}")]
    Construction {
        key: Key,
        #[source]
        source: BoxError,
    },

    #[error("hook `{hook}` on {key} failed: {source}")]
    Hook {
        key: Key,
        hook: String,
        #[source]
        source: BoxError,
    },

    /// Aggregated destroy-hook failures from one scope exit, in the order
    /// the hooks ran.
    #[error("{} destroy hook(s) failed while exiting scope `{scope}`: {}", .failures.len(), fmt_failures(.failures))]
    Teardown {
        scope: ScopeName,
        failures: Vec<ProviderError>,
    },
}

impl DiError {
    pub(crate) fn not_registered(key: &Key) -> Self {
        DiError::Resolution {
            key: key.clone(),
            reason: "no registration, override or constructible shape".to_string(),
        }
    }

    pub(crate) fn configuration(key: Option<&Key>, message: impl Into<String>) -> Self {
        DiError::Configuration {
            key: key.cloned(),
            message: message.into(),
        }
    }

    pub(crate) fn scope(key: Option<&Key>, message: impl Into<String>) -> Self {
        DiError::Scope {
            key: key.cloned(),
            message: message.into(),
        }
    }

    /// The cycle chain for `Circular` errors.
    pub fn cycle(&self) -> Option<&[Key]> {
        match self {
            DiError::Circular { chain } => Some(chain),
            _ => None,
        }
    }
}

fn fmt_key(key: &Option<Key>) -> String {
    match key {
        Some(key) => format!(" for {key}"),
        None => String::new(),
    }
}

fn fmt_chain(chain: &[Key]) -> String {
    chain
        .iter()
        .map(|k| k.short_name())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn fmt_failures(failures: &[ProviderError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for container operations
pub type DiResult<T> = Result<T, DiError>;
