use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A single-fire signal with no missed wakeups, regardless of how `fire`
/// and `wait` interleave.
///
/// `Notify::notify_waiters` only wakes tasks that are already registered;
/// a task that calls `notified()` after the fire would otherwise wait
/// forever. `OneShotFlag` closes that race by pairing the notification with
/// an `AtomicBool` and enabling the `Notified` future before checking it,
/// per `tokio::sync::Notify`'s documented pattern.
///
/// Used for a listener's cancel signal, the broadcaster's `died` signal, and
/// the per-generation delivery barrier (`died` fires once; a fresh barrier
/// is built every generation).
pub(crate) struct OneShotFlag {
    fired: AtomicBool,
    notify: Notify,
}

impl OneShotFlag {
    pub(crate) fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Idempotent: firing an already-fired flag has no further effect.
    pub(crate) fn fire(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already fired, otherwise resolves on the next
    /// `fire()`.
    pub(crate) async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_resolves_after_fire() {
        let flag = Arc::new(OneShotFlag::new());
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move {
                flag.wait().await;
            })
        };
        // Give the waiter a chance to register before firing.
        tokio::task::yield_now().await;
        flag.fire();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn wait_resolves_immediately_if_already_fired() {
        let flag = OneShotFlag::new();
        flag.fire();
        flag.fire(); // idempotent
        flag.wait().await;
    }
}
