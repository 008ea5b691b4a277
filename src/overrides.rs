//! Temporary provider replacement.
//!
//! Overrides shadow the registry for a key while they are pushed, and
//! resolve under their own registration's lifetime. Values they produce are
//! cached apart from the registry's, keyed by the override entry, so they
//! never outlive the override as answers: removing it evicts its singleton
//! and leaves any scoped values unreachable until their scope exits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::container::Container;
use crate::error::DiResult;
use crate::key::Key;
use crate::registration::Registration;

/// Per-key stacks of override registrations; the last pushed wins.
pub(crate) struct OverrideStack {
    layers: RwLock<HashMap<Key, Vec<(u64, Arc<Registration>)>>>,
    next_id: AtomicU64,
}

impl OverrideStack {
    pub(crate) fn new() -> Self {
        Self {
            layers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Pushes `registration` over its key and returns the entry id.
    pub(crate) fn push(&self, registration: Registration) -> DiResult<u64> {
        registration.check()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let key = registration.key.clone();
        tracing::debug!(key = %key, id, "override pushed");
        self.layers
            .write()
            .entry(key)
            .or_default()
            .push((id, Arc::new(registration)));
        Ok(id)
    }

    /// Removes the most recent override for `key` and returns its entry id.
    pub(crate) fn pop(&self, key: &Key) -> Option<u64> {
        let mut layers = self.layers.write();
        let stack = layers.get_mut(key)?;
        let popped = stack.pop().map(|(id, _)| id);
        if stack.is_empty() {
            layers.remove(key);
        }
        popped
    }

    /// Removes one specific entry, wherever it sits in its stack.
    pub(crate) fn remove(&self, key: &Key, id: u64) {
        let mut layers = self.layers.write();
        if let Some(stack) = layers.get_mut(key) {
            stack.retain(|(entry, _)| *entry != id);
            if stack.is_empty() {
                layers.remove(key);
            }
        }
        tracing::debug!(key = %key, id, "override removed");
    }

    #[inline]
    pub(crate) fn top(&self, key: &Key) -> Option<(u64, Arc<Registration>)> {
        let layers = self.layers.read();
        if layers.is_empty() {
            return None;
        }
        layers.get(key).and_then(|stack| stack.last()).cloned()
    }

    #[cfg(test)]
    pub(crate) fn depth(&self, key: &Key) -> usize {
        self.layers.read().get(key).map_or(0, Vec::len)
    }
}

/// Removes its override when dropped, on every exit path.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Container, Registration, Resolver};
///
/// struct Mailer(&'static str);
///
/// let container = Container::new();
/// container.register_instance(Mailer("smtp")).unwrap();
///
/// {
///     let _fake = container.override_provider(Registration::instance(Mailer("fake"))).unwrap();
///     assert_eq!(container.resolve::<Mailer>().unwrap().0, "fake");
/// }
/// assert_eq!(container.resolve::<Mailer>().unwrap().0, "smtp");
/// ```
#[must_use = "the override is removed as soon as the guard is dropped"]
pub struct OverrideGuard {
    container: Container,
    key: Key,
    id: u64,
}

impl OverrideGuard {
    pub(crate) fn new(container: Container, key: Key, id: u64) -> Self {
        Self { container, key, id }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        let inner = self.container.inner();
        inner.overrides.remove(&self.key, self.id);
        inner.root.evict(&self.key, self.id);
    }
}
