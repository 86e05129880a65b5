use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::handle::Broadcaster;

const INGRESS_CAPACITY: usize = 1;

type DedupEq<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Bundles an owned ingress channel together with the [`Broadcaster`] it
/// feeds, for callers who don't already have an upstream channel of their
/// own lying around.
///
/// The ingress channel has a capacity of 1 (the closest Rust analogue of
/// the original's unbuffered `chan T`): `send` only blocks for as long as it
/// takes the engine to read the previous value off it, never indefinitely,
/// as long as the broadcaster is alive.
///
/// Variants, matching the original's `Listenable`/`ListenableM`/
/// `ListenableC`/`ListenableCM`: plain ([`new`](Self::new)), memorized
/// ([`new_memorized`](Self::new_memorized)), and optionally deduped
/// ([`new_deduped`](Self::new_deduped),
/// [`new_memorized_deduped`](Self::new_memorized_deduped)) — the
/// "comparable" distinction itself is not a separate variant here, since
/// [`Broadcaster::until`] and friends are just methods gated on `T: PartialEq`
/// rather than a distinct controller shape.
pub struct Controller<T> {
    broadcaster: Broadcaster<T>,
    ingress: mpsc::Sender<T>,
    memorized: bool,
    dedup: Option<DedupEq<T>>,
    last: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Controller<T> {
    fn clone(&self) -> Self {
        Self {
            broadcaster: self.broadcaster.clone(),
            ingress: self.ingress.clone(),
            memorized: self.memorized,
            dedup: self.dedup.clone(),
            last: self.last.clone(),
        }
    }
}

impl<T> Controller<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A plain controller: no memorized value, no dedup.
    pub fn new() -> Self {
        let (ingress, rx) = mpsc::channel(INGRESS_CAPACITY);
        Self {
            broadcaster: Broadcaster::new(rx),
            ingress,
            memorized: false,
            dedup: None,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// A memorized controller, seeded with `initial`.
    pub fn new_memorized(initial: T) -> Self {
        let (ingress, rx) = mpsc::channel(INGRESS_CAPACITY);
        Self {
            broadcaster: Broadcaster::new_memorized(rx, initial),
            ingress,
            memorized: true,
            dedup: None,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// The ingress side of the controller's channel. Cloneable, so multiple
    /// producers can feed the same controller.
    pub fn sink(&self) -> mpsc::Sender<T> {
        self.ingress.clone()
    }

    /// The broadcaster side, for `bind`/`listen`/`detach`/`current`.
    pub fn broadcaster(&self) -> &Broadcaster<T> {
        &self.broadcaster
    }

    /// Sends a value through the controller.
    ///
    /// Before the broadcaster is live (no `bind`/`listen`/`detach`/`current`
    /// call has started its engine task yet), this is a no-op and returns
    /// `false` — except in a memorized controller, where it instead replaces
    /// the memorized value directly and still returns `false` ("not
    /// delivered", since no listener could have received it). Once live, the
    /// value is posted through the ingress channel, blocking only until the
    /// engine reads it off; the return value reports whether that handoff
    /// succeeded.
    ///
    /// In a deduped controller, a value equal (by the comparator fixed at
    /// construction) to the last one sent is dropped before either path and
    /// also reports `false`.
    pub async fn send(&self, value: T) -> bool {
        if let Some(eq) = &self.dedup {
            let mut last = self.last.lock().await;
            if last.as_ref().is_some_and(|prev| eq(prev, &value)) {
                return false;
            }
            *last = Some(value.clone());
        }
        if !self.broadcaster.initialized() {
            if self.memorized {
                self.broadcaster.set_memorized_before_init(value);
            }
            return false;
        }
        self.ingress.send(value).await.is_ok()
    }
}

impl<T> Controller<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// A plain controller that drops inputs equal to the last value sent.
    pub fn new_deduped() -> Self {
        let mut c = Self::new();
        c.dedup = Some(Arc::new(|a: &T, b: &T| a == b));
        c
    }

    /// A memorized controller that drops inputs equal to the last value
    /// sent.
    pub fn new_memorized_deduped(initial: T) -> Self {
        let mut c = Self::new_memorized(initial);
        c.dedup = Some(Arc::new(|a: &T, b: &T| a == b));
        c
    }
}

impl<T> Default for Controller<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_any_listener_is_not_delivered() {
        let c = Controller::new();
        assert!(!c.send(1).await);
    }

    #[tokio::test]
    async fn send_after_listener_is_delivered() {
        let c = Controller::new();
        let (mut rx, _cancel) = c.broadcaster().listen().await;
        assert!(c.send(1).await);
        assert_eq!(rx.recv().await, Some(1));
    }

    #[tokio::test]
    async fn memorized_send_before_any_listener_replaces_current() {
        let c = Controller::new_memorized(42);
        assert!(!c.send(7).await);
        assert_eq!(c.broadcaster().current(), Some(7));
    }

    #[tokio::test]
    async fn memorized_listener_sees_replaced_value_then_subsequent_sends() {
        let c = Controller::new_memorized(42);
        assert!(!c.send(7).await);
        let (mut rx, _cancel) = c.broadcaster().listen().await;
        assert_eq!(rx.recv().await, Some(7));
        assert!(c.send(9).await);
        assert_eq!(rx.recv().await, Some(9));
    }

    #[tokio::test]
    async fn deduped_controller_drops_repeat_of_last_value() {
        let c = Controller::new_deduped();
        let (mut rx, _cancel) = c.broadcaster().listen().await;
        assert!(c.send(1).await);
        assert_eq!(rx.recv().await, Some(1));
        assert!(!c.send(1).await);
        assert!(c.send(2).await);
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn listener_observes_closure_after_controller_dropped() {
        let c = Controller::new();
        let (rx, _cancel) = c.broadcaster().listen().await;
        drop(c);
        let mut rx = rx;
        assert_eq!(rx.recv().await, None);
    }
}
