use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::lock;
use crate::scheduler::{Scheduler, TimerHandle};

struct Pending {
    generation: u64,
    handle: TimerHandle,
}

struct DebounceInner<A> {
    func: Box<dyn Fn(A) + Send + Sync>,
    wait: Duration,
    scheduler: Arc<dyn Scheduler>,
    pending: Mutex<Option<Pending>>,
    generation: Mutex<u64>,
}

/// Coalesces bursts of calls into one trailing call.
///
/// Every [`call`](Self::call) resets the quiet window; when it finally
/// elapses the wrapped function runs once with the arguments of the most
/// recent call. Nothing is returned to callers, and a panic inside the
/// wrapped function happens on the scheduler's turn, not the caller's.
pub struct Debouncer<A> {
    inner: Arc<DebounceInner<A>>,
}

impl<A> Clone for Debouncer<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: Send + 'static> Debouncer<A> {
    pub fn new<F>(scheduler: Arc<dyn Scheduler>, wait: Duration, func: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DebounceInner {
                func: Box::new(func),
                wait,
                scheduler,
                pending: Mutex::new(None),
                generation: Mutex::new(0),
            }),
        }
    }

    pub fn call(&self, args: A) {
        let generation = {
            let mut generation = lock(&self.inner.generation);
            *generation += 1;
            *generation
        };

        self.cancel();

        let inner = self.inner.clone();
        let handle = self.inner.scheduler.set_timeout(
            self.inner.wait,
            Box::new(move || {
                {
                    let mut pending = lock(&inner.pending);
                    if pending.as_ref().map(|p| p.generation) == Some(generation) {
                        *pending = None;
                    }
                }
                (inner.func)(args);
            }),
        );

        *lock(&self.inner.pending) = Some(Pending { generation, handle });
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        if let Some(pending) = lock(&self.inner.pending).take() {
            self.inner.scheduler.clear_timeout(pending.handle);
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.inner.pending).is_some()
    }

    pub fn wait(&self) -> Duration {
        self.inner.wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    fn counting_debouncer(
        wait_ms: u64,
    ) -> (Arc<ManualScheduler>, Debouncer<u32>, Arc<Mutex<Vec<u32>>>) {
        let clock = Arc::new(ManualScheduler::new());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let debouncer = Debouncer::new(
            clock.clone(),
            Duration::from_millis(wait_ms),
            move |v: u32| calls_clone.lock().unwrap().push(v),
        );
        (clock, debouncer, calls)
    }

    #[test]
    fn test_burst_collapses_to_last_call() {
        let (clock, debouncer, calls) = counting_debouncer(100);

        debouncer.call(1);
        clock.advance_by(Duration::from_millis(50));
        debouncer.call(2);
        clock.advance_by(Duration::from_millis(50));
        debouncer.call(3);

        // 100ms since the first call, but only 0ms since the last
        assert!(calls.lock().unwrap().is_empty());
        assert!(debouncer.is_pending());

        clock.advance_by(Duration::from_millis(100));
        assert_eq!(*calls.lock().unwrap(), vec![3]);
        assert!(!debouncer.is_pending());
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_separate_windows_fire_separately() {
        let (clock, debouncer, calls) = counting_debouncer(10);

        debouncer.call(1);
        clock.advance_by(Duration::from_millis(10));
        debouncer.call(2);
        clock.advance_by(Duration::from_millis(10));

        assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_cancel_drops_pending_call() {
        let (clock, debouncer, calls) = counting_debouncer(10);

        debouncer.call(7);
        debouncer.cancel();
        clock.advance_by(Duration::from_secs(1));

        assert!(calls.lock().unwrap().is_empty());
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_clones_share_the_window() {
        let (clock, debouncer, calls) = counting_debouncer(10);
        let other = debouncer.clone();

        debouncer.call(1);
        other.call(2);
        clock.advance_by(Duration::from_millis(10));

        assert_eq!(*calls.lock().unwrap(), vec![2]);
        assert_eq!(other.wait(), Duration::from_millis(10));
    }
}
