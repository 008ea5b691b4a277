//! Driving the shared resolution future from synchronous callers.

use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll, Waker};

/// Polls `fut` exactly once. Synchronous resolution never suspends, so
/// `None` means a suspension point slipped through.
pub(crate) fn run_sync<F: Future>(fut: F) -> Option<F::Output> {
    let mut fut = pin!(fut);
    let mut cx = Context::from_waker(Waker::noop());
    match fut.as_mut().poll(&mut cx) {
        Poll::Ready(output) => Some(output),
        Poll::Pending => None,
    }
}

#[cfg(test)]
mod tests {
    use super::run_sync;

    #[test]
    fn ready_future_completes() {
        assert_eq!(run_sync(async { 7 }), Some(7));
    }

    #[test]
    fn pending_future_is_reported() {
        assert_eq!(run_sync(std::future::pending::<()>()), None);
    }
}
