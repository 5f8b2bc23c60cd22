//! Shared mutable state with change notification.
//!
//! Every piece of state touched by more than one task lives inside a
//! [`Shared`] cell. Reads and read-modify-writes run as closures under the
//! cell's lock, so a group of related updates is one indivisible step.
//! Tasks that need to wait for a condition park on the cell and are woken
//! whenever any update commits, never by polling.

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A mutex-guarded state value with wakeup support.
///
/// The lock is never held across an `.await`; closures passed to
/// [`Shared::read`], [`Shared::update`] and [`Shared::wait_for`] must not
/// block.
pub struct Shared<S> {
    state: Mutex<S>,
    changed: Notify,
}

impl<S> Shared<S> {
    pub fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
            changed: Notify::new(),
        }
    }

    /// Runs `f` against the state under the lock, without signalling a change.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.lock())
    }

    /// Runs `f` against the state under the lock and wakes every waiter.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let result = f(&mut self.state.lock());
        self.changed.notify_waiters();
        result
    }

    /// Blocks until `f` returns `Some`, re-evaluating whenever the state
    /// changes.
    ///
    /// The predicate runs under the lock: checking the state and acting on
    /// it (including mutating it) is a single indivisible step. A predicate
    /// that checks several conditions checks them in a fixed order, which is
    /// what gives callers priority among alternatives. Waiter registration
    /// happens before each evaluation, so an update committed between the
    /// check and the park cannot be missed.
    pub async fn wait_for<R>(&self, mut f: impl FnMut(&mut S) -> Option<R>) -> R {
        loop {
            // Register with the notifier before evaluating: a bare
            // `notified()` future only starts listening once polled, which
            // would open a window for a lost wakeup.
            let mut notified = std::pin::pin!(self.changed.notified());
            notified.as_mut().enable();

            let decision = f(&mut self.state.lock());
            if let Some(result) = decision {
                // The predicate may have mutated the state on its way out.
                self.changed.notify_waiters();
                return result;
            }
            notified.await;
        }
    }
}
