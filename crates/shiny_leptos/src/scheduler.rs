//! Timer and frame scheduling.
//!
//! Everything in this crate that runs "later" (debounced input sends, the
//! coalesced rebind pass) goes through a [`Scheduler`]. In the browser that is
//! [`BrowserScheduler`]; everywhere else, and in tests, [`ManualScheduler`]
//! provides a virtual clock that only moves when told to.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::lock;

/// Unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a pending timeout so it can be cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub(crate) u64);

/// Source of timeouts and "next paint" callbacks.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `task` once `delay` has elapsed.
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerHandle;

    /// Cancel a timeout. Clearing a fired or unknown handle does nothing.
    fn clear_timeout(&self, handle: TimerHandle);

    /// Run `task` before the next repaint, after pending DOM updates.
    fn request_frame(&self, task: Task);
}

struct ClockState {
    now: Duration,
    next_id: u64,
    /// Keyed by (deadline, id) so equal deadlines fire in scheduling order
    timers: BTreeMap<(Duration, u64), Task>,
    frames: VecDeque<Task>,
}

/// Virtual clock for deterministic tests.
///
/// Time only advances through [`advance_by`](Self::advance_by) and frame
/// callbacks only run through [`run_frame`](Self::run_frame). Tasks run with
/// no lock held, so they are free to schedule more work.
pub struct ManualScheduler {
    state: Mutex<ClockState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                now: Duration::ZERO,
                next_id: 0,
                timers: BTreeMap::new(),
                frames: VecDeque::new(),
            }),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        lock(&self.state).now
    }

    /// Advance virtual time, firing every timer whose deadline is reached.
    ///
    /// Timers scheduled by a firing task are also fired if they fall inside
    /// the window. Returns the number of timers fired.
    pub fn advance_by(&self, delta: Duration) -> usize {
        let target = lock(&self.state).now + delta;
        let mut fired = 0;

        loop {
            let task = {
                let mut state = lock(&self.state);
                let due = state
                    .timers
                    .keys()
                    .next()
                    .copied()
                    .filter(|(deadline, _)| *deadline <= target);
                match due {
                    Some(key) => {
                        state.now = key.0;
                        state.timers.remove(&key)
                    }
                    None => None,
                }
            };

            match task {
                Some(task) => {
                    task();
                    fired += 1;
                }
                None => break,
            }
        }

        lock(&self.state).now = target;
        fired
    }

    /// Run the frame callbacks queued so far. Callbacks requested while the
    /// frame runs wait for the next one. Returns the number run.
    pub fn run_frame(&self) -> usize {
        let frames: Vec<Task> = lock(&self.state).frames.drain(..).collect();
        let count = frames.len();
        for task in frames {
            task();
        }
        count
    }

    pub fn pending_timers(&self) -> usize {
        lock(&self.state).timers.len()
    }

    pub fn pending_frames(&self) -> usize {
        lock(&self.state).frames.len()
    }

    /// Time until the next timer fires, if any.
    pub fn time_to_next_timer(&self) -> Option<Duration> {
        let state = lock(&self.state);
        state
            .timers
            .keys()
            .next()
            .map(|(deadline, _)| deadline.saturating_sub(state.now))
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerHandle {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.now + delay;
        state.timers.insert((deadline, id), task);
        TimerHandle(id)
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        lock(&self.state)
            .timers
            .retain(|(_, id), _| *id != handle.0);
    }

    fn request_frame(&self, task: Task) {
        lock(&self.state).frames.push_back(task);
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserScheduler;

#[cfg(target_arch = "wasm32")]
mod browser {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use leptos::prelude::{TimeoutHandle, request_animation_frame, set_timeout_with_handle};

    use super::{Scheduler, Task, TimerHandle};
    use crate::lock;

    /// Scheduler backed by `window.setTimeout` and `requestAnimationFrame`.
    #[derive(Default)]
    pub struct BrowserScheduler {
        next_id: AtomicU64,
        handles: Arc<Mutex<HashMap<u64, TimeoutHandle>>>,
    }

    impl BrowserScheduler {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Scheduler for BrowserScheduler {
        fn set_timeout(&self, delay: Duration, task: Task) -> TimerHandle {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let handles = self.handles.clone();

            match set_timeout_with_handle(
                move || {
                    lock(&handles).remove(&id);
                    task();
                },
                delay,
            ) {
                Ok(handle) => {
                    lock(&self.handles).insert(id, handle);
                }
                Err(e) => {
                    leptos::logging::error!("[BrowserScheduler] setTimeout failed: {:?}", e);
                }
            }

            TimerHandle(id)
        }

        fn clear_timeout(&self, handle: TimerHandle) {
            if let Some(timeout) = lock(&self.handles).remove(&handle.0) {
                timeout.clear();
            }
        }

        fn request_frame(&self, task: Task) {
            request_animation_frame(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |label: &'static str| -> Task {
            let log = log_clone.clone();
            Box::new(move || log.lock().unwrap().push(label))
        };
        (log, make)
    }

    #[test]
    fn test_clock_starts_at_zero() {
        let clock = ManualScheduler::new();
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(clock.time_to_next_timer(), None);
    }

    #[test]
    fn test_timer_fires_at_deadline() {
        let clock = ManualScheduler::new();
        let (log, task) = recorder();

        clock.set_timeout(Duration::from_millis(100), task("a"));
        assert_eq!(clock.advance_by(Duration::from_millis(99)), 0);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(clock.time_to_next_timer(), Some(Duration::from_millis(1)));

        assert_eq!(clock.advance_by(Duration::from_millis(1)), 1);
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        assert_eq!(clock.pending_timers(), 0);
        assert_eq!(clock.now(), Duration::from_millis(100));
    }

    #[test]
    fn test_timers_fire_in_deadline_then_schedule_order() {
        let clock = ManualScheduler::new();
        let (log, task) = recorder();

        clock.set_timeout(Duration::from_millis(50), task("late"));
        clock.set_timeout(Duration::from_millis(10), task("first"));
        clock.set_timeout(Duration::from_millis(10), task("second"));

        clock.advance_by(Duration::from_millis(60));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "late"]);
    }

    #[test]
    fn test_cleared_timer_never_fires() {
        let clock = ManualScheduler::new();
        let (log, task) = recorder();

        let handle = clock.set_timeout(Duration::from_millis(10), task("cancelled"));
        clock.set_timeout(Duration::from_millis(20), task("kept"));
        clock.clear_timeout(handle);
        // Clearing twice is harmless
        clock.clear_timeout(handle);

        clock.advance_by(Duration::from_secs(1));
        assert_eq!(*log.lock().unwrap(), vec!["kept"]);
    }

    #[test]
    fn test_task_can_schedule_follow_up_within_window() {
        let clock = Arc::new(ManualScheduler::new());
        let (log, task) = recorder();
        let follow_up = task("follow-up");

        let clock_clone = clock.clone();
        clock.set_timeout(
            Duration::from_millis(10),
            Box::new(move || {
                clock_clone.set_timeout(Duration::from_millis(10), follow_up);
            }),
        );

        assert_eq!(clock.advance_by(Duration::from_millis(25)), 2);
        assert_eq!(*log.lock().unwrap(), vec!["follow-up"]);
    }

    #[test]
    fn test_frames_requested_during_frame_wait_for_next() {
        let clock = Arc::new(ManualScheduler::new());
        let (log, task) = recorder();
        let next = task("next");

        let clock_clone = clock.clone();
        clock.request_frame(Box::new(move || clock_clone.request_frame(next)));
        clock.request_frame(task("same"));

        assert_eq!(clock.run_frame(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["same"]);
        assert_eq!(clock.pending_frames(), 1);

        assert_eq!(clock.run_frame(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["same", "next"]);
    }
}
