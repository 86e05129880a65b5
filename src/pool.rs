use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crossbeam_utils::CachePadded;
use tokio::sync::{mpsc, Mutex};

use crate::config::PoolConfig;

type BoxedJob = Pin<Box<dyn Future<Output = ()> + Send>>;

enum Job {
    Run(BoxedJob),
    Poison,
}

/// Process-wide worker pool that runs wait fragments.
///
/// Submitting a job never blocks beyond the cost of an unbounded-channel
/// send: if an idle worker can be claimed, the job queues for it to pick up;
/// otherwise a new worker task is spawned and pre-assigned the job directly,
/// matching the Go original's `pond`, which spawns `go b.worker(task)` for
/// every task when none is idle (`broadcast_pond.go`'s `loop`) — every
/// submitted fragment is guaranteed a concurrent runner, never just a
/// shared queue position behind an already-busy worker. A periodic reaper
/// retires one idle worker per tick via the same claim, the same shape as
/// the original's `idleLoop` (a 5-second ticker retiring one idle worker at
/// a time via a nil sentinel), translated from OS threads parked on a
/// channel receive to tokio tasks parked the same way.
///
/// `idle` is a counting semaphore, not a snapshot: `try_claim_idle`
/// atomically decrements it, so at most one caller (a `submit` or the
/// reaper) can ever act on a given idle worker's announcement. A worker
/// only increments it when it is genuinely about to park waiting for its
/// *next* job — never for the job it was spawned to run, which it's handed
/// directly — so a successful claim always corresponds to a worker that
/// will actually dequeue the message being sent.
pub(crate) struct SelectorPool {
    jobs_tx: mpsc::UnboundedSender<Job>,
    jobs_rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    // `total` only changes on spawn/retire. Cache-line padding keeps `idle`
    // and `total` from bouncing the same line between cores under
    // concurrent submission, the same idiom `veloce`'s SPSC channel uses for
    // its head/tail/closed atomics.
    idle: Arc<CachePadded<AtomicUsize>>,
    total: Arc<CachePadded<AtomicUsize>>,
}

/// Atomically claims one announced-idle worker, if one exists. Shared by
/// `submit` and the reaper so the two never race over the same worker.
fn try_claim_idle(idle: &AtomicUsize) -> bool {
    let mut current = idle.load(Ordering::SeqCst);
    while current > 0 {
        match idle.compare_exchange_weak(current, current - 1, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return true,
            Err(observed) => current = observed,
        }
    }
    false
}

impl SelectorPool {
    fn new(config: &PoolConfig) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let pool = Self {
            jobs_tx,
            jobs_rx: Arc::new(Mutex::new(jobs_rx)),
            idle: Arc::new(CachePadded::new(AtomicUsize::new(0))),
            total: Arc::new(CachePadded::new(AtomicUsize::new(0))),
        };
        pool.spawn_reaper(config.reaper_interval);
        pool
    }

    /// The process-wide pool, built lazily (with the default config, or
    /// whatever [`init_pool`] set before this was first called) on first use.
    pub(crate) fn global() -> &'static SelectorPool {
        static POOL: OnceLock<SelectorPool> = OnceLock::new();
        POOL.get_or_init(|| {
            let config = PENDING_CONFIG
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take()
                .unwrap_or_default();
            SelectorPool::new(&config)
        })
    }

    pub(crate) fn submit(&self, fut: impl Future<Output = ()> + Send + 'static) {
        let job = Job::Run(Box::pin(fut));
        if try_claim_idle(&self.idle) {
            let _ = self.jobs_tx.send(job);
        } else {
            // No idle worker to claim: spawn one and hand it this job
            // directly rather than queuing it and hoping an existing
            // worker gets to it — the queue may already hold fragments a
            // slow listener is blocking a busy worker on.
            self.spawn_worker(job);
        }
    }

    fn spawn_worker(&self, first: Job) {
        self.total.fetch_add(1, Ordering::SeqCst);
        let jobs_rx = self.jobs_rx.clone();
        let idle = self.idle.clone();
        let total = self.total.clone();
        tokio::spawn(async move {
            let mut next = Some(first);
            loop {
                let job = match next.take() {
                    Some(job) => job,
                    None => {
                        idle.fetch_add(1, Ordering::SeqCst);
                        match jobs_rx.lock().await.recv().await {
                            Some(job) => job,
                            None => break,
                        }
                    }
                };
                match job {
                    Job::Run(fut) => fut.await,
                    Job::Poison => break,
                }
            }
            total.fetch_sub(1, Ordering::SeqCst);
        });
    }

    fn spawn_reaper(&self, interval: Duration) {
        let jobs_tx = self.jobs_tx.clone();
        let idle = self.idle.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                // Only poisons a worker it actually claimed, so it can never
                // strand a job queued behind the poison message with one
                // fewer worker than the queue needs.
                if try_claim_idle(&idle) {
                    let _ = jobs_tx.send(Job::Poison);
                }
            }
        });
    }
}

static PENDING_CONFIG: std::sync::Mutex<Option<PoolConfig>> = std::sync::Mutex::new(None);

/// Configures the process-wide selector pool before first use. Has no
/// effect if the pool has already been built by a prior `bind`/`listen`/
/// `detach`/`current` call anywhere in the process — first writer wins.
pub fn init_pool(config: PoolConfig) {
    *PENDING_CONFIG
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(config);
}
