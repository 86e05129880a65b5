use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::buffer::Node;
use crate::fragment::{self, Outcome};
use crate::listener::{EngineMsg, Listener, SubscribeRequest};
use crate::pool::SelectorPool;
use crate::registry::Registry;
use crate::signal::OneShotFlag;

/// State shared between every [`crate::Broadcaster`] handle and the engine
/// task that owns the registry. Everything here is either append-only,
/// single-fire, or read-only from outside the engine.
pub(crate) struct Shared<T> {
    pub(crate) died: OneShotFlag,
    pub(crate) tail: ArcSwapOption<Node<T>>,
    pub(crate) memorized: bool,
}

/// Runs the engine loop to completion: `Running` (racing upstream values,
/// subscribe requests, and in-flight listener deliveries) until the
/// upstream closes or the broadcaster is detached, then `Cleaning` (draining
/// the active list with no new listeners accepted), then `Dead`.
///
/// This is a direct generalization of the Go original's `broadcaster.loop`
/// + `doSelect`: one generation per call to the inner select, a fresh
/// barrier per generation, collect-first-then-drain-the-rest as the
/// resolution protocol.
pub(crate) async fn run<T>(
    shared: Arc<Shared<T>>,
    mut upstream: mpsc::Receiver<T>,
    mut engine_rx: mpsc::Receiver<EngineMsg<T>>,
) where
    T: Clone + Send + Sync + 'static,
{
    let pool = SelectorPool::global();
    let mut registry: Registry<T> = Registry::new();

    loop {
        let (winner, outcomes) = run_generation(&mut registry, pool, &mut upstream, &mut engine_rx).await;

        for outcome in outcomes {
            apply_outcome(&mut registry, outcome, false);
        }

        match winner {
            Some(Winner::Value(value)) => {
                trace!("ingested upstream value");
                let node = Node::new(value);
                if let Some(prev_tail) = shared.tail.load_full() {
                    prev_tail.link(node.clone());
                }
                shared.tail.store(Some(node.clone()));
                // Every starved listener was, by definition, caught up to the
                // previous tail; they all owe exactly this new node next.
                // The registry splice below only moves list membership in
                // O(1) — each promoted listener's cursor still has to be
                // pointed at `node` individually.
                for idx in registry.starved_indices() {
                    registry.get_mut(idx).cursor = Some(node.clone());
                }
                registry.promote_all_starved();
            }
            Some(Winner::UpstreamClosed) => {
                debug!("upstream closed, entering cleanup");
                break;
            }
            Some(Winner::Detached) => {
                debug!("detach requested, entering cleanup");
                break;
            }
            Some(Winner::Subscribe(req)) => handle_subscribe(&mut registry, &shared, req),
            None => {}
        }
    }

    trace!("broadcaster entering cleanup");
    shared.died.fire();
    // Every starved listener's sink is closed immediately; only the active
    // list still gets drained generation by generation.
    for idx in registry.starved_indices() {
        registry.remove(idx, false);
    }
    // Any subscribe that raced the transition above and is still sitting in
    // the channel buffer gets declined (its sink dropped) rather than leaked
    // until the whole engine tears down. The ack still fires so a caller
    // blocked in `bind_with` observes the decline instead of hanging.
    while let Ok(msg) = engine_rx.try_recv() {
        if let EngineMsg::Subscribe(req) = msg {
            trace!("subscribe declined: broadcaster already dead");
            let _ = req.ack.send(());
        }
    }

    while !registry.is_active_empty() {
        let outcomes = run_cleaning_generation(&mut registry, pool).await;
        for outcome in outcomes {
            apply_outcome(&mut registry, outcome, true);
        }
    }
    debug!("broadcaster cleanup complete, all listeners drained");
}

enum Winner<T> {
    Value(T),
    Subscribe(SubscribeRequest<T>),
    UpstreamClosed,
    Detached,
}

/// Fans out wait fragments for every active and starved listener, races
/// them against the upstream value / subscribe-request channels in the
/// engine's own native select, then raises the barrier and drains whatever
/// fragments hadn't resolved yet. Returns the winning non-fragment event (if
/// any) plus every fragment [`Outcome`] collected this generation.
async fn run_generation<T>(
    registry: &mut Registry<T>,
    pool: &'static SelectorPool,
    upstream: &mut mpsc::Receiver<T>,
    engine_rx: &mut mpsc::Receiver<EngineMsg<T>>,
) -> (Option<Winner<T>>, Vec<Outcome>)
where
    T: Clone + Send + Sync + 'static,
{
    let (barrier, mut reply_rx, n) = fan_out(registry, pool);
    trace!(fragments = n, "fanned out wait fragments for generation");

    enum Event<T> {
        Upstream(Option<T>),
        Subscribe(Option<EngineMsg<T>>),
        Fragment(Outcome),
    }

    let event = tokio::select! {
        v = upstream.recv() => Event::Upstream(v),
        m = engine_rx.recv() => Event::Subscribe(m),
        Some(o) = reply_rx.recv() => Event::Fragment(o),
    };

    let mut outcomes = Vec::with_capacity(n);
    let winner = match event {
        Event::Fragment(o) => {
            outcomes.push(o);
            None
        }
        Event::Upstream(Some(v)) => Some(Winner::Value(v)),
        Event::Upstream(None) => Some(Winner::UpstreamClosed),
        Event::Subscribe(Some(EngineMsg::Subscribe(req))) => Some(Winner::Subscribe(req)),
        Event::Subscribe(Some(EngineMsg::Detach)) => Some(Winner::Detached),
        Event::Subscribe(None) => Some(Winner::UpstreamClosed), // no handle can ever reach us again
    };

    barrier.fire();
    while outcomes.len() < n {
        match reply_rx.recv().await {
            Some(o) => outcomes.push(o),
            None => break,
        }
    }

    (winner, outcomes)
}

/// As [`run_generation`], but for the cleanup phase: only active listeners
/// get fragments, and there is no upstream/subscribe branch to race.
async fn run_cleaning_generation<T>(registry: &mut Registry<T>, pool: &'static SelectorPool) -> Vec<Outcome>
where
    T: Clone + Send + Sync + 'static,
{
    let (barrier, mut reply_rx, n) = fan_out_active_only(registry, pool);
    let mut outcomes = Vec::with_capacity(n);
    if n == 0 {
        return outcomes;
    }
    if let Some(first) = reply_rx.recv().await {
        outcomes.push(first);
    }
    barrier.fire();
    while outcomes.len() < n {
        match reply_rx.recv().await {
            Some(o) => outcomes.push(o),
            None => break,
        }
    }
    outcomes
}

fn fan_out<T>(
    registry: &Registry<T>,
    pool: &'static SelectorPool,
) -> (Arc<OneShotFlag>, mpsc::UnboundedReceiver<Outcome>, usize)
where
    T: Clone + Send + Sync + 'static,
{
    let barrier = Arc::new(OneShotFlag::new());
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let mut n = 0;

    for idx in registry.active_indices() {
        let listener = registry.get(idx);
        let value = listener
            .cursor
            .as_ref()
            .expect("active listener has a pending value")
            .value()
            .clone();
        pool.submit(fragment::run_active(
            reply_tx.clone(),
            barrier.clone(),
            listener.cancel.clone(),
            listener.sink.clone(),
            value,
            idx,
        ));
        n += 1;
    }

    for idx in registry.starved_indices() {
        let listener = registry.get(idx);
        pool.submit(fragment::run_starved(
            reply_tx.clone(),
            barrier.clone(),
            listener.cancel.clone(),
            idx,
        ));
        n += 1;
    }

    (barrier, reply_rx, n)
}

fn fan_out_active_only<T>(
    registry: &Registry<T>,
    pool: &'static SelectorPool,
) -> (Arc<OneShotFlag>, mpsc::UnboundedReceiver<Outcome>, usize)
where
    T: Clone + Send + Sync + 'static,
{
    let barrier = Arc::new(OneShotFlag::new());
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let mut n = 0;
    for idx in registry.active_indices() {
        let listener = registry.get(idx);
        let value = listener
            .cursor
            .as_ref()
            .expect("active listener has a pending value")
            .value()
            .clone();
        pool.submit(fragment::run_active(
            reply_tx.clone(),
            barrier.clone(),
            listener.cancel.clone(),
            listener.sink.clone(),
            value,
            idx,
        ));
        n += 1;
    }
    (barrier, reply_rx, n)
}

fn apply_outcome<T>(registry: &mut Registry<T>, outcome: Outcome, cleaning: bool) {
    match outcome {
        Outcome::Declined => {}
        Outcome::Cancelled { idx } => {
            trace!(idx, "listener cancelled");
            let was_active = registry.get(idx).cursor.is_some();
            registry.remove(idx, was_active);
        }
        Outcome::Delivered { idx } => {
            let next = {
                let listener = registry.get_mut(idx);
                let delivered = listener
                    .cursor
                    .take()
                    .expect("delivered listener had a pending value");
                delivered.next()
            };
            registry.get_mut(idx).cursor = next.clone();
            if next.is_none() {
                if cleaning {
                    registry.remove(idx, true);
                } else {
                    registry.move_to_starved(idx);
                }
            }
        }
    }
}

fn handle_subscribe<T>(registry: &mut Registry<T>, shared: &Shared<T>, req: SubscribeRequest<T>)
where
    T: Clone,
{
    if req.cancel.is_fired() {
        // Cancelled before it was ever placed on a list: zero deliveries,
        // sink dropped here without ever being registered. The ack still
        // fires so the caller's `bind`/`listen` call returns.
        trace!("subscribe declined: cancelled before registration");
        let _ = req.ack.send(());
        return;
    }
    let cursor = if shared.memorized {
        shared.tail.load_full()
    } else {
        None
    };
    let listener = Listener {
        sink: req.sink,
        cancel: req.cancel,
        cursor,
    };
    if listener.cursor.is_some() {
        trace!("listener subscribed (memorized, active)");
        registry.insert_active(listener);
    } else {
        trace!("listener subscribed (starved)");
        registry.insert_starved(listener);
    }
    let _ = req.ack.send(());
}
