use std::sync::Arc;

use tokio::sync::mpsc;

use crate::signal::OneShotFlag;

/// What a single wait fragment resolved to.
pub(crate) enum Outcome {
    /// The listener's cancel fired, or its sink was found closed.
    Cancelled { idx: usize },
    /// The value was handed off to the listener's sink.
    Delivered { idx: usize },
    /// The barrier fired before this fragment resolved naturally.
    Declined,
}

/// Races, for one active listener, a barrier decline against cancellation
/// against a delivery attempt, and reports exactly one [`Outcome`] on
/// `reply`.
///
/// This corresponds to one listener's case pair inside the Go original's
/// `select1`/`select2`/`select4`/`select8` — one fragment per listener
/// (arity 1) rather than grouped, since `tokio::select!` has no native arity
/// limit to amortize. `Sender::reserve` is documented cancel-safe, so losing
/// the race to the barrier or to `cancel` never leaves a half-delivered
/// value behind.
pub(crate) async fn run_active<T: Send + 'static>(
    reply: mpsc::UnboundedSender<Outcome>,
    barrier: Arc<OneShotFlag>,
    cancel: Arc<OneShotFlag>,
    sink: mpsc::Sender<T>,
    value: T,
    idx: usize,
) {
    let outcome = tokio::select! {
        _ = barrier.wait() => Outcome::Declined,
        _ = cancel.wait() => Outcome::Cancelled { idx },
        permit = sink.reserve() => match permit {
            Ok(permit) => {
                permit.send(value);
                Outcome::Delivered { idx }
            }
            Err(_) => Outcome::Cancelled { idx },
        },
    };
    let _ = reply.send(outcome);
}

/// As [`run_active`], but a starved listener has nothing to deliver yet: it
/// can only be cancelled or decline.
pub(crate) async fn run_starved(
    reply: mpsc::UnboundedSender<Outcome>,
    barrier: Arc<OneShotFlag>,
    cancel: Arc<OneShotFlag>,
    idx: usize,
) {
    let outcome = tokio::select! {
        _ = barrier.wait() => Outcome::Declined,
        _ = cancel.wait() => Outcome::Cancelled { idx },
    };
    let _ = reply.send(outcome);
}
