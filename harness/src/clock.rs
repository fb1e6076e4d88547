// Clock abstraction for deterministic time control.
//
// Strategy delays and slot pacing depend on this trait instead of calling
// tokio time directly, so tests drive time explicitly while production runs
// against the real clock.

use std::future::Future;
use std::pin::Pin;
use tokio::time::{self, Duration, Instant};

/// Clock abstraction trait - all time-dependent harness code depends on this
///
/// # Examples
///
/// ```rust,ignore
/// let clock: Arc<dyn Clock> = Arc::new(SystemClock);
/// clock.sleep(Duration::from_millis(100)).await;
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current instant in time
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration
    ///
    /// In tests (PausedClock), this cooperates with tokio::time::pause() so
    /// no real waiting occurs.
    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// System real-time clock (production environment)
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

/// Paused clock (test environment)
///
/// Works with tokio's `time::pause()` mechanism; time only advances when
/// explicitly told to via `advance()`. Use with
/// `#[tokio::test(start_paused = true)]`.
pub struct PausedClock;

impl PausedClock {
    /// Creates a new PausedClock and pauses tokio time
    ///
    /// With `#[tokio::test(start_paused = true)]` time is already paused,
    /// so this is just a convenience.
    pub fn new() -> Self {
        time::pause();
        Self
    }

    /// Manually advance time by the specified duration
    ///
    /// Pending `sleep()` futures that expire during the advancement are
    /// woken up.
    pub async fn advance(&self, d: Duration) {
        time::advance(d).await
    }
}

impl Clock for PausedClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_paused_clock_advancement() {
        let clock = Arc::new(PausedClock::new());
        let start = clock.now();

        clock.advance(Duration::from_secs(1)).await;
        assert_eq!(clock.now() - start, Duration::from_secs(1));

        clock.advance(Duration::from_secs(2)).await;
        assert_eq!(clock.now() - start, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_paused_clock_sleep() {
        let clock = Arc::new(PausedClock::new());

        let sleep_task = {
            let clock_clone = clock.clone();
            tokio::spawn(async move {
                clock_clone.sleep(Duration::from_millis(100)).await;
                42
            })
        };

        // Give the sleep task a moment to register
        tokio::time::sleep(Duration::from_millis(1)).await;

        clock.advance(Duration::from_millis(150)).await;
        assert_eq!(sleep_task.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_system_clock() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let start = clock.now();

        clock.sleep(Duration::from_millis(10)).await;

        assert!(clock.now() - start >= Duration::from_millis(10));
    }
}
