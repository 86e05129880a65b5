use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::buffer::Cursor;
use crate::signal::OneShotFlag;

/// A registered listener: a place to deliver values, a cancel signal, and
/// its position in the value chain.
///
/// Owned exclusively by the engine task once registered — the registry
/// mutates `cursor` directly as deliveries happen, which is safe only
/// because nothing outside the engine ever touches it.
pub(crate) struct Listener<T> {
    pub(crate) sink: mpsc::Sender<T>,
    pub(crate) cancel: Arc<OneShotFlag>,
    pub(crate) cursor: Cursor<T>,
}

/// Returned by [`crate::Broadcaster::bind`] and [`crate::Broadcaster::listen`].
///
/// Calling `cancel` unregisters the listener and closes its sink. Calling it
/// more than once, or after the listener has already been torn down for some
/// other reason (upstream closed, broadcaster detached), is a safe no-op.
pub struct CancelHandle {
    pub(crate) signal: Arc<OneShotFlag>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.signal.fire();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_fired()
    }
}

/// A request to register a new listener, sent to the engine over its
/// subscribe channel.
///
/// `ack` turns the handoff into a true rendezvous: the engine fires it only
/// once the listener has actually been placed on a list (or declined), so
/// the caller awaiting `bind`/`listen` cannot observe its own call returning
/// before the subscription is visible to the engine. Without this, a value
/// sent by the producer immediately after `bind` returns could race the
/// still-buffered subscribe request and be ingested first.
pub(crate) struct SubscribeRequest<T> {
    pub(crate) sink: mpsc::Sender<T>,
    pub(crate) cancel: Arc<OneShotFlag>,
    pub(crate) ack: oneshot::Sender<()>,
}

/// Everything a caller can ask of the running engine outside of the
/// upstream value stream itself.
pub(crate) enum EngineMsg<T> {
    Subscribe(SubscribeRequest<T>),
    Detach,
}
