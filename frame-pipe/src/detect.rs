use std::time::{Duration, Instant};

use crate::{
    clock::{Clock, SystemClock},
    frame::{MediaProperties, VideoFrame},
    source::{ReadResult, Source, Transform},
};

/// Estimates closer than this are reported as unchanged.
pub const FRAME_RATE_EPSILON: f32 = 0.5;

/// Calls an observer with the stream properties before the first frame and
/// whenever they change afterwards.
pub struct DetectChanges<F> {
    poll_interval: Duration,
    on_change: F,
}

impl<F> DetectChanges<F>
where
    F: FnMut(MediaProperties) + Send,
{
    pub fn new(poll_interval: Duration, on_change: F) -> Self {
        Self {
            poll_interval,
            on_change,
        }
    }
}

impl<S, F> Transform<S> for DetectChanges<F>
where
    S: Source<Item = VideoFrame>,
    F: FnMut(MediaProperties) + Send,
{
    type Output = ChangeDetector<S, F, SystemClock>;

    fn apply(self, upstream: S) -> Self::Output {
        ChangeDetector::new(upstream, self.poll_interval, self.on_change, SystemClock)
    }
}

/// Frames carry no rate metadata, so the rate is the number of arrivals in
/// a window of at least `poll_interval`, divided by the window length.
/// Size and pixel format changes are reported on the frame they appear.
///
/// The observer runs inline on the reading thread and adds to the latency
/// of that read.
pub struct ChangeDetector<S, F, C = SystemClock> {
    upstream: S,
    poll_interval: Duration,
    on_change: F,
    clock: C,
    reported: Option<MediaProperties>,
    frame_rate: f32,
    window_start: Option<Instant>,
    window_frames: u32,
}

impl<S, F, C> ChangeDetector<S, F, C>
where
    S: Source<Item = VideoFrame>,
    F: FnMut(MediaProperties) + Send,
    C: Clock,
{
    pub fn new(upstream: S, poll_interval: Duration, on_change: F, clock: C) -> Self {
        Self {
            upstream,
            poll_interval,
            on_change,
            clock,
            reported: None,
            frame_rate: 0.0,
            window_start: None,
            window_frames: 0,
        }
    }

    /// Last snapshot handed to the observer.
    pub fn properties(&self) -> Option<MediaProperties> {
        self.reported
    }

    fn sample_frame_rate(&mut self, now: Instant) {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return;
        };

        self.window_frames += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= self.poll_interval && !elapsed.is_zero() {
            self.frame_rate = self.window_frames as f32 / elapsed.as_secs_f32();
            self.window_start = Some(now);
            self.window_frames = 0;
        }
    }

    fn changed(&self, current: &MediaProperties) -> bool {
        match &self.reported {
            None => true,
            Some(last) => {
                last.width != current.width
                    || last.height != current.height
                    || last.pixel_format != current.pixel_format
                    || (last.frame_rate - current.frame_rate).abs() > FRAME_RATE_EPSILON
            }
        }
    }
}

impl<S, F, C> Source for ChangeDetector<S, F, C>
where
    S: Source<Item = VideoFrame>,
    F: FnMut(MediaProperties) + Send,
    C: Clock,
{
    type Item = VideoFrame;

    fn read(&mut self) -> ReadResult<VideoFrame> {
        let (frame, release) = self.upstream.read()?;

        let now = self.clock.now();
        self.sample_frame_rate(now);

        let current = MediaProperties {
            width: frame.width(),
            height: frame.height(),
            frame_rate: self.frame_rate,
            pixel_format: frame.format(),
        };
        if self.changed(&current) {
            log::debug!(
                "media properties changed: {}x{} {} @ {:.2} fps",
                current.width,
                current.height,
                current.pixel_format,
                current.frame_rate
            );
            (self.on_change)(current);
            self.reported = Some(current);
        }

        Ok((frame, release))
    }
}

#[cfg(test)]
#[path = "detect_test.rs"]
mod detect_test;
