use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use tokio::sync::{mpsc, oneshot, OnceCell};

use crate::buffer::Node;
use crate::engine::{self, Shared};
use crate::listener::{CancelHandle, EngineMsg, SubscribeRequest};
use crate::signal::OneShotFlag;

// The channel itself is buffered so many concurrent `bind` callers can
// enqueue without contending; the actual rendezvous with the engine (the
// happens-before guarantee a subscription needs) comes from the `ack`
// oneshot each `SubscribeRequest` carries, not from this capacity.
const SUBSCRIBE_CHANNEL_CAPACITY: usize = 64;
const LISTEN_SINK_CAPACITY: usize = 1;

struct Startup<T> {
    upstream: mpsc::Receiver<T>,
    engine_rx: mpsc::Receiver<EngineMsg<T>>,
}

/// The fan-out multiplexer core: one upstream receiver, an arbitrary number
/// of listeners. Cloning a `Broadcaster` is cheap and shares the same
/// underlying engine task.
///
/// The engine task is not spawned at construction time — it starts lazily
/// on the first [`bind`](Self::bind)/[`listen`](Self::listen)/
/// [`detach`](Self::detach)/[`current`](Self::current) call, guarded so that
/// concurrent first calls from clones of the same handle still spawn the
/// engine exactly once.
pub struct Broadcaster<T> {
    shared: Arc<Shared<T>>,
    engine_tx: mpsc::Sender<EngineMsg<T>>,
    init: Arc<OnceCell<()>>,
    startup: Arc<Mutex<Option<Startup<T>>>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            engine_tx: self.engine_tx.clone(),
            init: self.init.clone(),
            startup: self.startup.clone(),
        }
    }
}

impl<T> Broadcaster<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wraps an upstream receiver. Plain mode: a listener registered before
    /// any upstream value arrives sees nothing until the next value.
    pub fn new(upstream: mpsc::Receiver<T>) -> Self {
        Self::new_with(upstream, None)
    }

    /// As [`new`](Self::new), but memorizes the latest value: a newly
    /// registered listener is first fed `initial` (or whatever upstream
    /// value has superseded it), then subsequent upstream values.
    pub fn new_memorized(upstream: mpsc::Receiver<T>, initial: T) -> Self {
        Self::new_with(upstream, Some(initial))
    }

    fn new_with(upstream: mpsc::Receiver<T>, initial: Option<T>) -> Self {
        let (engine_tx, engine_rx) = mpsc::channel(SUBSCRIBE_CHANNEL_CAPACITY);
        let memorized = initial.is_some();
        let tail = match initial {
            Some(value) => ArcSwapOption::from(Some(Node::new(value))),
            None => ArcSwapOption::from(None),
        };
        let shared = Arc::new(Shared {
            died: OneShotFlag::new(),
            tail,
            memorized,
        });
        Self {
            shared,
            engine_tx,
            init: Arc::new(OnceCell::new()),
            startup: Arc::new(Mutex::new(Some(Startup { upstream, engine_rx }))),
        }
    }

    async fn ensure_init(&self) {
        let shared = self.shared.clone();
        let startup = self.startup.clone();
        self.init
            .get_or_init(|| async move {
                let Startup { upstream, engine_rx } = startup
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .take()
                    .expect("ensure_init's initializer runs exactly once");
                tokio::spawn(engine::run(shared, upstream, engine_rx));
            })
            .await;
    }

    /// Whether the engine task has been spawned yet.
    pub fn initialized(&self) -> bool {
        self.init.initialized()
    }

    /// Registers `sink` as a listener. If the broadcaster is already dead
    /// (upstream closed or detached), returns a no-op cancel and `sink` is
    /// left untouched.
    pub async fn bind(&self, sink: mpsc::Sender<T>) -> CancelHandle {
        self.bind_with(sink, Arc::new(OneShotFlag::new())).await
    }

    pub(crate) async fn bind_with(&self, sink: mpsc::Sender<T>, signal: Arc<OneShotFlag>) -> CancelHandle {
        self.ensure_init().await;
        if self.shared.died.is_fired() {
            return CancelHandle { signal };
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        let req = SubscribeRequest {
            sink,
            cancel: signal.clone(),
            ack: ack_tx,
        };
        if self.engine_tx.send(EngineMsg::Subscribe(req)).await.is_ok() {
            // Block until the engine has actually registered (or declined)
            // the listener, not merely until the request is enqueued: this
            // is the rendezvous that makes a subscription happen-before any
            // value the producer sends after `bind` returns.
            let _ = ack_rx.await;
        } else {
            signal.fire();
        }
        CancelHandle { signal }
    }

    /// Creates a fresh channel, registers it as a listener, and returns the
    /// receiving half alongside its cancel handle.
    pub async fn listen(&self) -> (mpsc::Receiver<T>, CancelHandle) {
        let (tx, rx) = mpsc::channel(LISTEN_SINK_CAPACITY);
        let cancel = self.bind(tx).await;
        (rx, cancel)
    }

    pub(crate) async fn listen_with(&self, signal: Arc<OneShotFlag>) -> (mpsc::Receiver<T>, CancelHandle) {
        let (tx, rx) = mpsc::channel(LISTEN_SINK_CAPACITY);
        let cancel = self.bind_with(tx, signal).await;
        (rx, cancel)
    }

    /// Prematurely detaches the broadcaster from its upstream. No further
    /// upstream values are broadcast and no new listeners are accepted;
    /// existing listeners still drain whatever has already been buffered
    /// for them.
    pub async fn detach(&self) {
        self.ensure_init().await;
        let _ = self.engine_tx.send(EngineMsg::Detach).await;
    }

    /// Returns the latest memorized value, if this broadcaster is
    /// memorized and at least one value (initial or upstream) exists.
    ///
    /// Synchronous and lock-free: it reads straight off the shared tail
    /// pointer without going through the engine.
    pub fn current(&self) -> Option<T> {
        self.shared.tail.load_full().map(|node| node.value().clone())
    }

    /// Replaces the memorized value directly, bypassing the engine.
    ///
    /// Only meaningful, and only ever called, before the engine task has
    /// been spawned: [`crate::Controller::send`] uses this for a memorized
    /// controller's `Send` while the broadcaster is still `Uninit`, matching
    /// the original's "`Send` before any listener replaces the memorized
    /// value" behavior. Once the engine is running, the tail is mutated only
    /// from inside it.
    pub(crate) fn set_memorized_before_init(&self, value: T) {
        self.shared.tail.store(Some(Node::new(value)));
    }
}
