use std::time::{Duration, Instant};

use crate::{
    clock::{Clock, SystemClock},
    source::{ReadResult, Source, Transform},
};

/// Longest spacing between frames; slower rates are clamped to it.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Limits output to a target frame rate by holding frames back until
/// their scheduled emission time. A rate `<= 0` disables throttling.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    frame_rate: f32,
}

impl Throttle {
    pub fn new(frame_rate: f32) -> Self {
        Self { frame_rate }
    }
}

impl<S: Source> Transform<S> for Throttle {
    type Output = Throttled<S, SystemClock>;

    fn apply(self, upstream: S) -> Self::Output {
        Throttled::new(upstream, self.frame_rate, SystemClock)
    }
}

pub struct Throttled<S, C = SystemClock> {
    upstream: S,
    interval: Option<Duration>,
    deadline: Option<Instant>,
    clock: C,
}

impl<S: Source, C: Clock> Throttled<S, C> {
    pub fn new(upstream: S, frame_rate: f32, clock: C) -> Self {
        let interval = (frame_rate.is_finite() && frame_rate > 0.0).then(|| {
            Duration::try_from_secs_f64(1.0 / frame_rate as f64)
                .map_or(MAX_INTERVAL, |interval| interval.min(MAX_INTERVAL))
        });
        Self {
            upstream,
            interval,
            deadline: None,
            clock,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    fn wait_turn(&mut self, interval: Duration) {
        let now = self.clock.now();
        // First frame goes out immediately.
        let deadline = self.deadline.unwrap_or(now);

        let next = if now < deadline {
            self.clock.sleep(deadline - now);
            deadline + interval
        } else if now - deadline >= interval {
            // A whole frame behind: restart the schedule rather than burst.
            log::trace!(
                "throttle behind schedule by {:?}, resetting deadline",
                now - deadline
            );
            now + interval
        } else {
            deadline + interval
        };
        self.deadline = Some(next);
    }
}

impl<S: Source, C: Clock> Source for Throttled<S, C> {
    type Item = S::Item;

    fn read(&mut self) -> ReadResult<S::Item> {
        let Some(interval) = self.interval else {
            return self.upstream.read();
        };

        let item = self.upstream.read()?;
        self.wait_turn(interval);
        Ok(item)
    }
}

#[cfg(test)]
#[path = "throttle_test.rs"]
mod throttle_test;
