//! Resolution frames for cycle detection.
//!
//! A frame tracks the keys one logical resolution is currently building.
//! Lookups that re-enter the container from a provider or hook, through a
//! captured `Container` or `ScopedResolver` instead of the `Injector`, join
//! the resolution that invoked them: sync callers find it through a
//! thread-local, async callers through a task-local. Both are set only while
//! a resolve call runs, so separate calls never share a frame.

use std::cell::RefCell;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::{DiError, DiResult};
use crate::key::Key;

pub(crate) const MAX_DEPTH: usize = 1024;

/// Identity of one logical resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ResolutionId(u64);

static NEXT_RESOLUTION: AtomicU64 = AtomicU64::new(1);

struct Resolution {
    id: ResolutionId,
    // Address of the container this resolution runs in
    container: usize,
    path: Mutex<SmallVec<[Key; 8]>>,
}

impl Resolution {
    fn fresh(container: usize) -> Arc<Self> {
        Arc::new(Self {
            id: ResolutionId(NEXT_RESOLUTION.fetch_add(1, Ordering::Relaxed)),
            container,
            path: Mutex::new(SmallVec::new()),
        })
    }
}

thread_local! {
    static ACTIVE: RefCell<Option<Arc<Resolution>>> = const { RefCell::new(None) };
}

tokio::task_local! {
    static TASK_RESOLUTION: Arc<Resolution>;
}

fn enclosing(container: usize) -> Option<Arc<Resolution>> {
    TASK_RESOLUTION
        .try_with(Arc::clone)
        .ok()
        .or_else(|| ACTIVE.with(|active| active.borrow().clone()))
        .filter(|resolution| resolution.container == container)
}

struct Restore(Option<Arc<Resolution>>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        let _ = ACTIVE.try_with(|active| *active.borrow_mut() = previous);
    }
}

/// Runs a synchronous resolve call, joining the enclosing resolution of the
/// same container when there is one.
pub(crate) fn run_blocking<R>(container: usize, max_depth: usize, f: impl FnOnce(&mut Frame) -> R) -> R {
    let resolution = enclosing(container).unwrap_or_else(|| Resolution::fresh(container));
    let previous = ACTIVE.with(|active| active.borrow_mut().replace(resolution.clone()));
    let _restore = Restore(previous);
    f(&mut Frame::join(resolution, max_depth))
}

/// Async counterpart of [`run_blocking`]. A new resolution stays visible to
/// everything its future runs, including sync lookups made from inside it.
pub(crate) async fn run_suspending<R, F, Fut>(container: usize, max_depth: usize, f: F) -> R
where
    F: FnOnce(Frame) -> Fut,
    Fut: Future<Output = R>,
{
    match enclosing(container) {
        Some(resolution) => f(Frame::join(resolution, max_depth)).await,
        None => {
            let resolution = Resolution::fresh(container);
            let fut = f(Frame::join(resolution.clone(), max_depth));
            TASK_RESOLUTION.scope(resolution, fut).await
        }
    }
}

/// Keys currently being built by one resolution, outermost first. Nested
/// requests made during the resolution share the frame; concurrent
/// resolutions never see each other's keys.
pub(crate) struct Frame {
    resolution: Arc<Resolution>,
    max_depth: usize,
}

impl Frame {
    #[cfg(test)]
    pub(crate) fn new(max_depth: usize) -> Self {
        Self::join(Resolution::fresh(0), max_depth)
    }

    fn join(resolution: Arc<Resolution>, max_depth: usize) -> Self {
        Self { resolution, max_depth }
    }

    /// Pushes `key`, failing if it is already being built.
    pub(crate) fn enter(&mut self, key: &Key) -> DiResult<()> {
        let mut path = self.resolution.path.lock();
        // Checked before the push so the chain ends with the repeat
        if let Some(pos) = path.iter().position(|k| k == key) {
            let mut chain: Vec<Key> = path[pos..].to_vec();
            chain.push(key.clone());
            return Err(DiError::Circular { chain });
        }
        if path.len() >= self.max_depth {
            return Err(DiError::DepthExceeded(path.len()));
        }
        path.push(key.clone());
        Ok(())
    }

    /// Removes the newest entry for `key`. Nested lookups awaited side by
    /// side may finish out of order, so this is not a strict pop.
    pub(crate) fn exit(&mut self, key: &Key) {
        let mut path = self.resolution.path.lock();
        if let Some(pos) = path.iter().rposition(|k| k == key) {
            path.remove(pos);
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.resolution.path.lock().len()
    }

    pub(crate) fn id(&self) -> ResolutionId {
        self.resolution.id
    }

    /// Snapshot of the keys in progress, outermost first.
    pub(crate) fn path(&self) -> Vec<Key> {
        self.resolution.path.lock().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key_of_type;

    struct A;
    struct B;
    struct C;

    #[test]
    fn chain_starts_at_first_occurrence() {
        let mut frame = Frame::new(MAX_DEPTH);
        frame.enter(&key_of_type::<C>()).unwrap();
        frame.enter(&key_of_type::<A>()).unwrap();
        frame.enter(&key_of_type::<B>()).unwrap();

        let err = frame.enter(&key_of_type::<A>()).unwrap_err();
        let chain: Vec<String> = err.cycle().unwrap().iter().map(|k| k.short_name()).collect();
        assert_eq!(chain, ["A", "B", "A"]);
        assert_eq!(frame.depth(), 3);
    }

    #[test]
    fn depth_guard() {
        let mut frame = Frame::new(2);
        frame.enter(&key_of_type::<A>()).unwrap();
        frame.enter(&key_of_type::<B>()).unwrap();
        assert!(matches!(frame.enter(&key_of_type::<C>()), Err(DiError::DepthExceeded(2))));
    }

    #[test]
    fn exit_allows_reentry() {
        let mut frame = Frame::new(MAX_DEPTH);
        let a = key_of_type::<A>();
        frame.enter(&a).unwrap();
        frame.exit(&a);
        frame.enter(&a).unwrap();
    }

    #[test]
    fn nested_blocking_calls_share_the_frame() {
        let a = key_of_type::<A>();
        run_blocking(1, MAX_DEPTH, |outer| {
            outer.enter(&a).unwrap();
            let nested = run_blocking(1, MAX_DEPTH, |inner| {
                assert_eq!(inner.id(), outer.id());
                inner.enter(&a)
            });
            assert!(matches!(nested, Err(DiError::Circular { .. })));

            // Another container starts its own resolution.
            run_blocking(2, MAX_DEPTH, |other| {
                assert_ne!(other.id(), outer.id());
                other.enter(&a).unwrap();
            });
        });

        let first = run_blocking(1, MAX_DEPTH, |frame| frame.id());
        let second = run_blocking(1, MAX_DEPTH, |frame| frame.id());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn nested_async_calls_share_the_frame() {
        let b = key_of_type::<B>();
        run_suspending(1, MAX_DEPTH, |mut outer| async move {
            outer.enter(&b).unwrap();
            let id = outer.id();
            let nested = run_suspending(1, MAX_DEPTH, |inner| async move { inner.id() }).await;
            assert_eq!(nested, id);
            // Sync lookups made from inside the task join it as well.
            assert_eq!(run_blocking(1, MAX_DEPTH, |inner| inner.id()), id);
        })
        .await;
    }
}
