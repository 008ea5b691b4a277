//! Instance storage for one active scope.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::{DiError, DiResult};
use crate::internal::frame::ResolutionId;
use crate::key::Key;
use crate::lifecycle::Hooks;
use crate::lifetime::ScopeName;
use crate::registration::AnyArc;

/// Which registration produced a cached value: [`REGISTRY`] or the id of
/// an override. Values cached under an override never answer lookups made
/// after it is removed, and never shadow the registry's own value.
pub(crate) type Origin = u64;

pub(crate) const REGISTRY: Origin = 0;

/// Cached instance. A slot is `Initializing` between commit and the end of
/// its init hook; until then only the resolution that built it is served.
pub(crate) enum Slot {
    Initializing { instance: AnyArc, by: ResolutionId },
    Ready(AnyArc),
}

/// A destroy hook owed to a built instance.
pub(crate) struct TeardownEntry {
    pub(crate) key: Key,
    pub(crate) instance: AnyArc,
    pub(crate) hook: Cow<'static, str>,
    pub(crate) hooks: Arc<Hooks>,
}

/// A context that has just closed, with the teardown it owes.
pub(crate) struct Closed {
    pub(crate) name: ScopeName,
    pub(crate) id: usize,
    pub(crate) entries: Vec<TeardownEntry>,
}

#[derive(Default)]
struct State {
    slots: HashMap<Key, SmallVec<[(Origin, Slot); 1]>>,
    // Creation order
    teardown: Vec<TeardownEntry>,
    closed: bool,
    // Exit was requested while nested scopes were active
    exit_pending: bool,
}

impl State {
    fn slot_mut(&mut self, key: &Key, origin: Origin) -> Option<&mut Slot> {
        self.slots
            .get_mut(key)?
            .iter_mut()
            .find(|(o, _)| *o == origin)
            .map(|(_, slot)| slot)
    }
}

/// Storage for one entered scope: cached instances plus the teardown
/// sequence, linked to the enclosing scope.
pub(crate) struct ScopeContext {
    pub(crate) id: usize,
    pub(crate) name: ScopeName,
    pub(crate) parent: Option<Arc<ScopeContext>>,
    state: Mutex<State>,
    live_children: AtomicUsize,
}

impl ScopeContext {
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self {
            id: 0,
            name: ScopeName::APP,
            parent: None,
            state: Mutex::new(State::default()),
            live_children: AtomicUsize::new(0),
        })
    }

    /// Opens a scope nested in `parent`.
    pub(crate) fn child(parent: &Arc<Self>, id: usize, name: ScopeName) -> DiResult<Arc<Self>> {
        if name.is_app() {
            return Err(DiError::scope(None, "`app` is the root scope and cannot be entered"));
        }
        // Checked under the parent's lock so a concurrent exit cannot miss
        // the new child.
        let state = parent.state.lock();
        if state.closed || state.exit_pending {
            return Err(DiError::scope(
                None,
                format!("cannot enter `{name}`: enclosing scope `{}` has exited", parent.name),
            ));
        }
        parent.live_children.fetch_add(1, Ordering::SeqCst);
        drop(state);
        Ok(Arc::new(Self {
            id,
            name,
            parent: Some(parent.clone()),
            state: Mutex::new(State::default()),
            live_children: AtomicUsize::new(0),
        }))
    }

    /// Innermost context named `name`, walking outward from `self`.
    pub(crate) fn find(self: &Arc<Self>, name: &ScopeName) -> Option<Arc<ScopeContext>> {
        let mut current = Some(self);
        while let Some(context) = current {
            if &context.name == name {
                return Some(context.clone());
            }
            current = context.parent.as_ref();
        }
        None
    }

    /// Names of the active scopes from innermost to the root, for diagnostics.
    pub(crate) fn path(&self) -> String {
        let mut names = vec![self.name.to_string()];
        let mut current = self.parent.as_ref();
        while let Some(context) = current {
            names.push(context.name.to_string());
            current = context.parent.as_ref();
        }
        names.join(" < ")
    }

    /// Cached instance for `key`: a ready one, or one that resolution `by`
    /// is still initializing.
    pub(crate) fn cached(&self, key: &Key, origin: Origin, by: ResolutionId) -> Option<AnyArc> {
        let mut state = self.state.lock();
        match state.slot_mut(key, origin)? {
            Slot::Ready(instance) => Some(instance.clone()),
            Slot::Initializing { instance, by: builder } if *builder == by => Some(instance.clone()),
            Slot::Initializing { .. } => None,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Stores `instance` as `Initializing` and queues its teardown entry.
    pub(crate) fn commit(
        &self,
        key: &Key,
        origin: Origin,
        instance: AnyArc,
        by: ResolutionId,
        teardown: Option<TeardownEntry>,
    ) -> DiResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error(key));
        }
        let slot = Slot::Initializing { instance, by };
        match state.slot_mut(key, origin) {
            Some(existing) => *existing = slot,
            None => state.slots.entry(key.clone()).or_default().push((origin, slot)),
        }
        state.teardown.extend(teardown);
        Ok(())
    }

    pub(crate) fn mark_ready(&self, key: &Key, origin: Origin) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slot_mut(key, origin) {
            let ready = match slot {
                Slot::Initializing { instance, .. } => Slot::Ready(instance.clone()),
                Slot::Ready(_) => return,
            };
            *slot = ready;
        }
    }

    /// Forgets the value cached for `key` under `origin`. A queued destroy
    /// hook still runs when the context closes.
    pub(crate) fn evict(&self, key: &Key, origin: Origin) {
        let mut state = self.state.lock();
        if let Some(entries) = state.slots.get_mut(key) {
            entries.retain(|(o, _)| *o != origin);
            if entries.is_empty() {
                state.slots.remove(key);
            }
        }
    }

    /// Queues teardown for an instance this context does not cache.
    pub(crate) fn push_teardown(&self, entry: TeardownEntry) -> DiResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error(&entry.key));
        }
        state.teardown.push(entry);
        Ok(())
    }

    /// Closes the context and hands back the teardown it owes, in creation
    /// order. Cached instances are released.
    ///
    /// With live nested scopes this fails. When `defer` is set the context
    /// is then marked to close together with its last nested scope, and the
    /// `Closed` list of that nested scope's exit carries it too.
    pub(crate) fn close(&self, defer: bool) -> DiResult<Vec<Closed>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DiError::scope(None, format!("scope `{}` has already exited", self.name)));
        }
        let children = self.live_children.load(Ordering::SeqCst);
        if children > 0 {
            state.exit_pending |= defer;
            return Err(DiError::scope(
                None,
                format!("scope `{}` still has {children} active nested scope(s)", self.name),
            ));
        }
        let mut closed = vec![self.seal(&mut state)];
        drop(state);

        // Release the parent; it may have been waiting on this scope to exit.
        let mut current = self.parent.as_ref();
        while let Some(parent) = current {
            let mut state = parent.state.lock();
            let remaining = parent.live_children.fetch_sub(1, Ordering::SeqCst) - 1;
            if remaining > 0 || !state.exit_pending || state.closed {
                break;
            }
            tracing::debug!(scope = %parent.name, id = parent.id, "closing scope after its last nested scope");
            closed.push(parent.seal(&mut state));
            drop(state);
            current = parent.parent.as_ref();
        }
        Ok(closed)
    }

    fn seal(&self, state: &mut State) -> Closed {
        state.closed = true;
        state.exit_pending = false;
        state.slots.clear();
        Closed {
            name: self.name.clone(),
            id: self.id,
            entries: std::mem::take(&mut state.teardown),
        }
    }

    /// Empties the cache and teardown sequence without closing.
    pub(crate) fn drain(&self) -> Vec<TeardownEntry> {
        let mut state = self.state.lock();
        state.slots.clear();
        std::mem::take(&mut state.teardown)
    }

    pub(crate) fn pending_teardown(&self) -> usize {
        self.state.lock().teardown.len()
    }

    fn closed_error(&self, key: &Key) -> DiError {
        DiError::scope(Some(key), format!("scope `{}` has exited", self.name))
    }
}

/// Marks a committed slot ready when dropped, whether the init hook
/// finished, failed or its future was cancelled.
pub(crate) struct ReadyOnDrop<'a> {
    context: &'a ScopeContext,
    key: &'a Key,
    origin: Origin,
}

impl<'a> ReadyOnDrop<'a> {
    pub(crate) fn new(context: &'a ScopeContext, key: &'a Key, origin: Origin) -> Self {
        Self { context, key, origin }
    }
}

impl Drop for ReadyOnDrop<'_> {
    fn drop(&mut self) {
        self.context.mark_ready(self.key, self.origin);
    }
}
