//! A re-armable one-shot deadline.
//!
//! The timer holds no task of its own. The owner polls it with
//! [`fire_if_due`](CoalescingTimer::fire_if_due), or awaits
//! [`expired`](CoalescingTimer::expired) inside a `select!` and then calls
//! `fire_if_due` from the handler.

use std::time::Duration;

use tokio::time::Instant;

/// Coalesces repeated arming into a single firing.
#[derive(Debug, Clone)]
pub struct CoalescingTimer {
    window: Duration,
    deadline: Option<Instant>,
}

impl CoalescingTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start or restart the window at `now`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and return true if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Resolves at the deadline. Never resolves while disarmed.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    #[test]
    fn test_fires_once_after_window() {
        let start = Instant::now();
        let mut timer = CoalescingTimer::new(WINDOW);
        assert!(!timer.fire_if_due(start + WINDOW));

        timer.arm(start);
        assert!(timer.is_armed());
        assert!(!timer.fire_if_due(start + Duration::from_millis(299)));
        assert!(timer.fire_if_due(start + WINDOW));
        assert!(!timer.is_armed());
        assert!(!timer.fire_if_due(start + WINDOW * 2));
    }

    #[test]
    fn test_rearm_pushes_deadline() {
        let start = Instant::now();
        let mut timer = CoalescingTimer::new(WINDOW);
        timer.arm(start);
        timer.arm(start + Duration::from_millis(200));
        assert!(!timer.fire_if_due(start + WINDOW));
        assert!(timer.fire_if_due(start + Duration::from_millis(500)));
    }

    #[test]
    fn test_cancel() {
        let start = Instant::now();
        let mut timer = CoalescingTimer::new(WINDOW);
        timer.arm(start);
        timer.cancel();
        assert!(!timer.is_armed());
        assert!(!timer.fire_if_due(start + WINDOW));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_waits_for_deadline() {
        let start = Instant::now();
        let mut timer = CoalescingTimer::new(WINDOW);
        timer.arm(start);
        timer.expired().await;
        assert!(start.elapsed() >= WINDOW);
        assert!(timer.fire_if_due(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_never_expires() {
        let timer = CoalescingTimer::new(WINDOW);
        let waited = tokio::time::timeout(Duration::from_secs(10), timer.expired()).await;
        assert!(waited.is_err());
    }
}
