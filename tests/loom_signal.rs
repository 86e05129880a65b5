//! Model-checks the fire-once, no-missed-wakeup shape that
//! `crate::signal::OneShotFlag` relies on: a waiter that is already
//! spinning on an atomic must observe a concurrent `store` under every
//! interleaving loom explores. `loom` only instruments its own
//! synchronization primitives, not `tokio::sync::Notify`, so this models
//! the underlying flag-visibility guarantee in isolation rather than
//! driving `OneShotFlag` itself.

#![cfg(loom)]

use loom::sync::atomic::{AtomicBool, Ordering};
use loom::sync::Arc;
use loom::thread;

#[test]
fn fire_is_visible_to_a_spinning_waiter() {
    loom::model(|| {
        let fired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let fired = fired.clone();
            thread::spawn(move || {
                while !fired.load(Ordering::Acquire) {
                    thread::yield_now();
                }
            })
        };
        fired.store(true, Ordering::Release);
        waiter.join().unwrap();
    });
}

#[test]
fn double_fire_is_idempotent_under_concurrent_firers() {
    loom::model(|| {
        let fired = Arc::new(AtomicBool::new(false));
        let notified = Arc::new(loom::sync::atomic::AtomicUsize::new(0));

        let fire = |fired: Arc<AtomicBool>, notified: Arc<loom::sync::atomic::AtomicUsize>| {
            if !fired.swap(true, Ordering::SeqCst) {
                notified.fetch_add(1, Ordering::SeqCst);
            }
        };

        let t1 = {
            let fired = fired.clone();
            let notified = notified.clone();
            thread::spawn(move || fire(fired, notified))
        };
        let t2 = {
            let fired = fired.clone();
            let notified = notified.clone();
            thread::spawn(move || fire(fired, notified))
        };
        t1.join().unwrap();
        t2.join().unwrap();

        assert_eq!(notified.load(Ordering::SeqCst), 1);
    });
}
