use std::time::{Duration, Instant};

/// Time source for the timing-sensitive stages.
pub trait Clock: Send {
    fn now(&self) -> Instant;
    /// Blocks the calling thread.
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
