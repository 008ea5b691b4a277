//! Resolution observers.
//!
//! Observers see every top-level resolve call (nested dependency resolutions
//! are part of the outer call) and every scope exit. They are called
//! synchronously on the resolving thread, so keep them cheap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::lifetime::ScopeName;

/// Observer trait for resolution and scope events.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, DiError, DiObserver, Key, Resolver};
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Recorder(Mutex<Vec<String>>);
///
/// impl DiObserver for Recorder {
///     fn resolving(&self, key: &Key) {
///         self.0.lock().unwrap().push(key.short_name());
///     }
///     fn resolved(&self, _key: &Key, _duration: Duration) {}
///     fn failed(&self, _key: &Key, _error: &DiError) {}
/// }
///
/// let recorder = Arc::new(Recorder::default());
/// let container = Container::new();
/// container.add_observer(recorder.clone());
/// container.register_instance(5u8).unwrap();
/// container.resolve::<u8>().unwrap();
///
/// assert_eq!(*recorder.0.lock().unwrap(), vec!["u8".to_string()]);
/// ```
pub trait DiObserver: Send + Sync {
    fn resolving(&self, key: &Key);

    fn resolved(&self, key: &Key, duration: Duration);

    fn failed(&self, key: &Key, error: &DiError);

    /// A scope finished its teardown pass; `error` holds the aggregated
    /// failure, if any.
    fn scope_exited(&self, scope: &ScopeName, error: Option<&DiError>) {
        let _ = (scope, error);
    }
}

#[derive(Default)]
pub(crate) struct Observers {
    observers: RwLock<Vec<Arc<dyn DiObserver>>>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, observer: Arc<dyn DiObserver>) {
        self.observers.write().push(observer);
    }

    /// Notifies `resolving` and starts the clock, if anyone is listening.
    #[inline]
    pub(crate) fn resolving(&self, key: &Key) -> Option<Instant> {
        let observers = self.observers.read();
        if observers.is_empty() {
            return None;
        }
        for observer in observers.iter() {
            observer.resolving(key);
        }
        Some(Instant::now())
    }

    #[inline]
    pub(crate) fn finished<T>(&self, key: &Key, result: &DiResult<T>, started: Option<Instant>) {
        let Some(started) = started else { return };
        let elapsed = started.elapsed();
        for observer in self.observers.read().iter() {
            match result {
                Ok(_) => observer.resolved(key, elapsed),
                Err(err) => observer.failed(key, err),
            }
        }
    }

    pub(crate) fn scope_exited(&self, scope: &ScopeName, result: &DiResult<()>) {
        for observer in self.observers.read().iter() {
            observer.scope_exited(scope, result.as_ref().err());
        }
    }
}

/// Forwards events to `tracing`: resolutions at `debug`, failures at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DiObserver for TracingObserver {
    fn resolving(&self, key: &Key) {
        tracing::trace!(key = %key, "resolving");
    }

    fn resolved(&self, key: &Key, duration: Duration) {
        tracing::debug!(key = %key, elapsed_us = duration.as_micros() as u64, "resolved");
    }

    fn failed(&self, key: &Key, error: &DiError) {
        tracing::warn!(key = %key, error = %error, "resolution failed");
    }

    fn scope_exited(&self, scope: &ScopeName, error: Option<&DiError>) {
        match error {
            Some(error) => tracing::warn!(scope = %scope, error = %error, "scope exited with teardown failures"),
            None => tracing::debug!(scope = %scope, "scope exited"),
        }
    }
}
