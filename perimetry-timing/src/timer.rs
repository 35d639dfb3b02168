use std::future::Future;
use std::time::{Duration, Instant};

/// Clock and suspension source for the trial loop.
///
/// `now` is measured from the timer's own origin, so two clones of one timer
/// agree on every timestamp.
pub trait Timer: Clone + Send + Sync + 'static {
    fn now(&self) -> Duration;

    fn elapsed(&self, since: Duration) -> Duration {
        self.now().saturating_sub(since)
    }

    /// Suspends the calling task for `d`.
    fn sleep(&self, d: Duration) -> impl Future<Output = ()> + Send;
}

/// Timer on the tokio clock. Honours paused time in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimer {
    start: tokio::time::Instant,
}

impl MonotonicTimer {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for MonotonicTimer {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(d)
    }
}

/// Wall-clock timer that sleeps on the OS monotonic clock instead of the
/// runtime's timer wheel, trading a blocking-pool thread for sub-millisecond
/// wake-up accuracy.
#[derive(Debug, Clone, Copy)]
pub struct HighPrecisionTimer {
    pub start: Instant,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) -> impl Future<Output = ()> + Send {
        async move {
            // A dropped handle does not cancel the sleep; the blocking thread
            // simply finishes on its own.
            let _ = tokio::task::spawn_blocking(move || high_precision_sleep(d)).await;
        }
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks the current thread for `duration`.
pub fn high_precision_sleep(duration: Duration) {
    #[cfg(target_os = "linux")]
    linux_sleep(duration);
    #[cfg(not(target_os = "linux"))]
    std::thread::sleep(duration);
}

#[cfg(target_os = "linux")]
fn linux_sleep(duration: Duration) {
    use libc::{CLOCK_MONOTONIC, EINTR, clock_nanosleep, timespec};

    let mut req = timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };
    let mut rem = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    // Relative sleeps report the unslept remainder when a signal interrupts them.
    loop {
        let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
        if rc != EINTR {
            break;
        }
        req = rem;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn monotonic_timer_follows_the_runtime_clock() {
        let timer = MonotonicTimer::new();
        let before = timer.now();
        timer.sleep(Duration::from_millis(250)).await;
        assert_eq!(timer.elapsed(before), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_an_origin() {
        let timer = MonotonicTimer::new();
        let copy = timer;
        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(timer.now(), copy.now());
    }

    #[test]
    fn elapsed_saturates() {
        let timer = HighPrecisionTimer::new();
        assert_eq!(timer.elapsed(Duration::from_secs(3600)), Duration::ZERO);
    }

    #[tokio::test]
    async fn high_precision_sleep_waits_at_least_the_request() {
        let timer = HighPrecisionTimer::new();
        let before = timer.now();
        timer.sleep(Duration::from_millis(5)).await;
        assert!(timer.elapsed(before) >= Duration::from_millis(5));
    }
}
