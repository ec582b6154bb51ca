//! Trailing-edge debounce.
//!
//! `DebounceTimer` is the pure state machine; `spawn_debounced` drives one
//! with a tokio task. Every trigger replaces the pending value and restarts
//! the window, so a burst of triggers produces a single call carrying the
//! last value, one window after the burst ends.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Timer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerState<T> {
    Idle,
    Pending { deadline: Instant, latest: T },
}

/// Result of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The timer was idle and a window started.
    Started,
    /// A window was already running and has been restarted.
    Reset,
}

/// Debounce state for one subscription.
#[derive(Debug)]
pub struct DebounceTimer<T> {
    window: Duration,
    state: TimerState<T>,
}

impl<T> DebounceTimer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: TimerState::Idle,
        }
    }

    pub fn state(&self) -> &TimerState<T> {
        &self.state
    }

    /// Record a trigger at `now`.
    pub fn trigger(&mut self, value: T, now: Instant) -> Transition {
        let transition = match self.state {
            TimerState::Idle => Transition::Started,
            TimerState::Pending { .. } => Transition::Reset,
        };
        self.state = TimerState::Pending {
            deadline: now + self.window,
            latest: value,
        };
        transition
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            TimerState::Idle => None,
            TimerState::Pending { deadline, .. } => Some(*deadline),
        }
    }

    /// Take the pending value if its window has elapsed at `now`.
    pub fn fire(&mut self, now: Instant) -> Option<T> {
        match self.deadline() {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Take the pending value regardless of its deadline.
    pub fn flush(&mut self) -> Option<T> {
        match std::mem::replace(&mut self.state, TimerState::Idle) {
            TimerState::Idle => None,
            TimerState::Pending { latest, .. } => Some(latest),
        }
    }
}

/// Spawn a task that debounces values sent on the returned channel.
///
/// `handler` is awaited to completion before the next window's value is
/// taken; values arriving meanwhile are coalesced. A pending value is
/// flushed when every sender has been dropped.
pub fn spawn_debounced<T, F, Fut>(window: Duration, handler: F) -> mpsc::UnboundedSender<T>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut timer = DebounceTimer::new(window);

        loop {
            match timer.deadline() {
                None => match rx.recv().await {
                    Some(value) => {
                        timer.trigger(value, Instant::now());
                    }
                    None => break,
                },
                Some(deadline) => {
                    tokio::select! {
                        received = rx.recv() => match received {
                            Some(value) => {
                                timer.trigger(value, Instant::now());
                            }
                            None => {
                                if let Some(value) = timer.flush() {
                                    handler(value).await;
                                }
                                break;
                            }
                        },
                        _ = sleep_until(deadline) => {
                            if let Some(value) = timer.fire(Instant::now()) {
                                handler(value).await;
                            }
                        }
                    }
                }
            }
        }

        debug!("Debounce driver stopped");
    });

    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    const WINDOW: Duration = Duration::from_millis(200);

    #[test]
    fn test_timer_transitions() {
        let start = Instant::now();
        let mut timer = DebounceTimer::new(WINDOW);
        assert_eq!(timer.state(), &TimerState::Idle);

        assert_eq!(timer.trigger(1, start), Transition::Started);
        assert_eq!(timer.trigger(2, start + Duration::from_millis(50)), Transition::Reset);
        assert_eq!(
            timer.deadline(),
            Some(start + Duration::from_millis(250))
        );

        // Not yet due.
        assert_eq!(timer.fire(start + Duration::from_millis(200)), None);
        assert_eq!(timer.fire(start + Duration::from_millis(250)), Some(2));
        assert_eq!(timer.state(), &TimerState::Idle);
        assert_eq!(timer.fire(start + Duration::from_secs(10)), None);
    }

    #[test]
    fn test_flush_takes_pending_value() {
        let mut timer = DebounceTimer::new(WINDOW);
        assert_eq!(timer.flush(), None);

        timer.trigger("latest", Instant::now());
        assert_eq!(timer.flush(), Some("latest"));
        assert_eq!(timer.deadline(), None);
    }

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> futures::future::BoxFuture<'static, ()>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let handler = move |value: u32| -> futures::future::BoxFuture<'static, ()> {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().await.push(value);
            })
        };
        (calls, handler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_yields_single_call_with_last_value() {
        let (calls, handler) = recorder();
        let tx = spawn_debounced(WINDOW, handler);

        for value in 1..=5 {
            tx.send(value).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(calls.lock().await.is_empty());

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(*calls.lock().await, vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_fire_separately() {
        let (calls, handler) = recorder();
        let tx = spawn_debounced(WINDOW, handler);

        tx.send(1).unwrap();
        tokio::time::sleep(WINDOW * 2).await;
        tx.send(2).unwrap();
        tokio::time::sleep(WINDOW * 2).await;

        assert_eq!(*calls.lock().await, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_value_flushed_on_close() {
        let (calls, handler) = recorder();
        let tx = spawn_debounced(WINDOW, handler);

        tx.send(7).unwrap();
        drop(tx);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*calls.lock().await, vec![7]);
    }
}
