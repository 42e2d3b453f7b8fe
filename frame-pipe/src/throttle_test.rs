use std::time::{Duration, Instant};

use super::Throttled;
use crate::{
    clock::{Clock, manual::ManualClock},
    error::PipeError,
    source::{Release, Source, SourceExt, from_fn},
};

/// Upstream that hands out increasing numbers, advancing `clock` by `latency` per read.
fn counter(clock: ManualClock, latency: Duration) -> impl Source<Item = u32> {
    let mut n = 0;
    from_fn(move || {
        clock.advance(latency);
        n += 1;
        Ok((n, Release::noop()))
    })
}

fn emissions<S: Source>(src: &mut S, clock: &ManualClock, count: usize) -> Vec<Instant> {
    (0..count)
        .map(|_| {
            src.read().unwrap_or_else(|e| panic!("read failed: {}", e));
            clock.now()
        })
        .collect()
}

#[test]
fn test_non_positive_rate_passes_through() {
    for rate in [0.0, -5.0, f32::NAN] {
        let clock = ManualClock::new();
        let mut src = Throttled::new(counter(clock.clone(), Duration::ZERO), rate, clock.clone());
        assert!(src.interval().is_none());
        for expected in 1..=10 {
            assert_eq!(src.read().unwrap().0, expected);
        }
        assert!(clock.slept().is_empty());
    }
}

#[test]
fn test_fast_upstream_is_spaced_to_interval() {
    let clock = ManualClock::new();
    let mut src = Throttled::new(
        counter(clock.clone(), Duration::ZERO),
        10.0,
        clock.clone(),
    );

    let times = emissions(&mut src, &clock, 11);
    for pair in times.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_millis(100));
    }
    assert_eq!(times[10] - times[0], Duration::from_secs(1));
    // First frame is not held back.
    assert_eq!(clock.slept().len(), 10);
}

#[test]
fn test_deadline_advances_from_previous_deadline() {
    let clock = ManualClock::new();
    let mut src = Throttled::new(
        counter(clock.clone(), Duration::from_millis(30)),
        10.0,
        clock.clone(),
    );

    let times = emissions(&mut src, &clock, 12);
    // Upstream latency is absorbed by shorter sleeps; emissions stay on the
    // grid laid down by the first frame.
    for (k, t) in times.iter().enumerate().skip(2) {
        assert_eq!(*t - times[0], Duration::from_millis(100) * k as u32);
    }
    assert!(
        clock.slept()[2..]
            .iter()
            .all(|d| *d == Duration::from_millis(70))
    );
}

#[test]
fn test_stall_resets_schedule_without_burst() {
    let clock = ManualClock::new();
    let stall_clock = clock.clone();
    let mut n = 0u32;
    let upstream = from_fn(move || {
        n += 1;
        if n == 5 {
            stall_clock.advance(Duration::from_secs(1));
        }
        Ok((n, Release::noop()))
    });
    let mut src = Throttled::new(upstream, 10.0, clock.clone());

    let times = emissions(&mut src, &clock, 10);
    // The stalled frame goes out late, everything after it keeps full spacing.
    for pair in times[4..].windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_millis(100));
    }
}

#[test]
fn test_upstream_error_skips_wait() {
    let clock = ManualClock::new();
    let mut n = 0u32;
    let upstream = from_fn(move || {
        n += 1;
        if n == 2 {
            return Err(PipeError::upstream("capture timeout"));
        }
        Ok((n, Release::noop()))
    });
    let mut src = Throttled::new(upstream, 1.0, clock.clone());

    src.read().unwrap();
    let err = src.read().unwrap_err();
    assert!(matches!(err, PipeError::Upstream(_)));
    assert!(clock.slept().is_empty());

    // The schedule survives the failure.
    src.read().unwrap();
    assert_eq!(clock.slept(), vec![Duration::from_secs(1)]);
}

#[test]
fn test_end_of_stream_propagates() {
    let mut src = from_fn(|| -> crate::source::ReadResult<u32> { Err(PipeError::EndOfStream) })
        .throttle(30.0);
    assert!(src.read().unwrap_err().is_end_of_stream());
    assert!(src.read().unwrap_err().is_end_of_stream());
}

#[test]
fn test_real_clock_rate_is_close_to_target() {
    let mut src = from_fn(|| Ok(((), Release::noop()))).throttle(50.0);

    let start = Instant::now();
    let mut frames = 0;
    while start.elapsed() < Duration::from_secs(1) {
        src.read().unwrap();
        frames += 1;
    }
    assert!(
        (45..=56).contains(&frames),
        "expected about 50 frames in one second, got {}",
        frames
    );
}

#[test]
fn test_tiny_rate_is_clamped_to_max_interval() {
    for rate in [1e-30, f32::MIN_POSITIVE, 1e-6] {
        let clock = ManualClock::new();
        let mut src = Throttled::new(counter(clock.clone(), Duration::ZERO), rate, clock.clone());
        assert_eq!(src.interval(), Some(super::MAX_INTERVAL));

        assert_eq!(src.read().unwrap().0, 1);
        assert_eq!(src.read().unwrap().0, 2);
        assert_eq!(clock.slept(), vec![super::MAX_INTERVAL]);
    }
}
