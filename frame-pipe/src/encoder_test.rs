// ============================================================================
// Encoder bridge tests
// ============================================================================

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use super::Encoder;
use crate::{
    config::EncoderConfig,
    engine::mock::{Calls, Recorder, RecordingEngine},
    error::{EngineStatus, PipeError},
    frame::{PixelFormat, VideoFrame},
    pattern::TestPattern,
    source::{ReadResult, Release, Source, SourceExt, from_fn},
};

fn recorder() -> Recorder {
    Arc::new(Mutex::new(Calls::default()))
}

fn open_pattern(
    calls: &Recorder,
    format: PixelFormat,
) -> Encoder<TestPattern, RecordingEngine> {
    Encoder::open(
        TestPattern::new(32, 24, format),
        EncoderConfig::new(32, 24, 30.0),
        RecordingEngine::opener(calls.clone()),
    )
    .expect("open encoder")
}

#[test]
fn test_open_applies_default_bit_rate() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let calls = recorder();
    let config = EncoderConfig {
        bit_rate: 0,
        ..EncoderConfig::new(1920, 1080, 30.0)
    };
    let encoder = Encoder::open(
        TestPattern::new(1920, 1080, PixelFormat::I420),
        config,
        RecordingEngine::opener(calls.clone()),
    )?;

    assert_eq!(encoder.config().bit_rate, 100_000);
    assert_eq!(calls.lock().unwrap().opened[0].bit_rate, 100_000);

    let (unit, release) = encoder.read()?;
    assert!(!unit.is_empty());
    assert!(unit.is_key);
    assert_eq!(unit.pts, Some(0));
    assert!(release.is_noop());
    Ok(())
}

#[test]
fn test_invalid_config_never_opens_engine() {
    let calls = recorder();
    let result = Encoder::open(
        TestPattern::new(32, 24, PixelFormat::I420),
        EncoderConfig::new(0, 24, 30.0),
        RecordingEngine::opener(calls.clone()),
    );
    assert!(matches!(result, Err(PipeError::Config(_))));
    assert!(calls.lock().unwrap().opened.is_empty());
}

#[test]
fn test_engine_open_failure_is_reported() {
    let result: Result<Encoder<TestPattern, RecordingEngine>, _> = Encoder::open(
        TestPattern::new(32, 24, PixelFormat::I420),
        EncoderConfig::default(),
        |_: &EncoderConfig| Err(EngineStatus::InvalidParameter),
    );
    match result {
        Err(PipeError::Engine { op, status }) => {
            assert_eq!(op, "open");
            assert_eq!(status, EngineStatus::InvalidParameter);
        }
        _ => panic!("expected engine open failure"),
    }
}

#[test]
fn test_units_follow_frame_order() -> anyhow::Result<()> {
    let calls = recorder();
    let encoder = open_pattern(&calls, PixelFormat::I420);
    let pts: Vec<Option<i64>> = (0..5)
        .map(|_| encoder.read().map(|(unit, _)| unit.pts))
        .collect::<Result<_, _>>()?;
    assert_eq!(pts, (0..5).map(Some).collect::<Vec<_>>());
    assert_eq!(calls.lock().unwrap().encoded.len(), 5);
    Ok(())
}

#[test]
fn test_unit_pts_comes_from_engine_output() -> anyhow::Result<()> {
    let calls = recorder();
    calls
        .lock()
        .unwrap()
        .output_pts
        .extend([Some(100), None]);
    let encoder = open_pattern(&calls, PixelFormat::I420);

    let pts: Vec<Option<i64>> = (0..3)
        .map(|_| encoder.read().map(|(unit, _)| unit.pts))
        .collect::<Result<_, _>>()?;
    // The third frame falls back to its own pts.
    assert_eq!(pts, vec![Some(100), None, Some(2)]);
    Ok(())
}

#[test]
fn test_non_i420_source_is_normalized() -> anyhow::Result<()> {
    let calls = recorder();
    let encoder = open_pattern(&calls, PixelFormat::Rgb24);
    encoder.read()?;
    assert_eq!(calls.lock().unwrap().encoded, vec![(32, 24, false)]);
    Ok(())
}

#[test]
fn test_upstream_error_skips_engine() {
    let calls = recorder();
    let mut n = 0;
    let source = from_fn(move || -> ReadResult<VideoFrame> {
        n += 1;
        match n {
            1 => Err(PipeError::upstream("camera busy")),
            _ => Err(PipeError::EndOfStream),
        }
    });
    let encoder = Encoder::open(
        source,
        EncoderConfig::default(),
        RecordingEngine::opener(calls.clone()),
    )
    .unwrap();

    assert!(matches!(encoder.read(), Err(PipeError::Upstream(_))));
    assert!(encoder.read().unwrap_err().is_end_of_stream());
    assert!(calls.lock().unwrap().encoded.is_empty());
    assert!(!encoder.is_closed());
}

#[test]
fn test_engine_status_error_keeps_handle_open() -> anyhow::Result<()> {
    let calls = recorder();
    calls.lock().unwrap().encode_codes.push_back(3);
    let encoder = open_pattern(&calls, PixelFormat::I420);

    match encoder.read() {
        Err(PipeError::Engine { op, status }) => {
            assert_eq!(op, "encode");
            assert_eq!(status.code(), 3);
        }
        _ => panic!("expected engine status error"),
    }
    assert!(!encoder.is_closed());

    let (unit, _) = encoder.read()?;
    // The failed attempt consumed frame 0.
    assert_eq!(unit.pts, Some(1));
    Ok(())
}

#[test]
fn test_force_key_frame_applies_to_next_encode_only() -> anyhow::Result<()> {
    let calls = recorder();
    let encoder = open_pattern(&calls, PixelFormat::I420);
    encoder.read()?;
    encoder.force_key_frame()?;
    let (forced, _) = encoder.read()?;
    let (regular, _) = encoder.read()?;

    assert!(forced.is_key);
    assert!(!regular.is_key);
    let flags: Vec<bool> = calls
        .lock()
        .unwrap()
        .encoded
        .iter()
        .map(|(_, _, force)| *force)
        .collect();
    assert_eq!(flags, vec![false, true, false]);
    Ok(())
}

#[test]
fn test_force_key_frame_survives_failed_encode() -> anyhow::Result<()> {
    let calls = recorder();
    calls.lock().unwrap().encode_codes.push_back(2);
    let encoder = open_pattern(&calls, PixelFormat::I420);

    encoder.controller().force_key_frame()?;
    assert!(encoder.read().is_err());
    let (unit, _) = encoder.read()?;
    assert!(unit.is_key);
    assert_eq!(calls.lock().unwrap().encoded, vec![(32, 24, true)]);
    Ok(())
}

#[test]
fn test_set_bit_rate_forwards_until_closed() -> anyhow::Result<()> {
    let calls = recorder();
    let encoder = open_pattern(&calls, PixelFormat::I420);
    encoder.controller().set_bit_rate(500_000)?;
    encoder.set_bit_rate(750_000)?;
    assert_eq!(calls.lock().unwrap().bit_rates, vec![500_000, 750_000]);

    encoder.close()?;
    assert!(matches!(
        encoder.set_bit_rate(1_000_000),
        Err(PipeError::Closed)
    ));
    assert_eq!(calls.lock().unwrap().bit_rates.len(), 2);
    Ok(())
}

#[test]
fn test_close_is_idempotent() -> anyhow::Result<()> {
    let calls = recorder();
    let encoder = open_pattern(&calls, PixelFormat::I420);
    encoder.read()?;

    encoder.close()?;
    encoder.close()?;
    assert!(encoder.is_closed());
    assert!(encoder.read().unwrap_err().is_end_of_stream());
    assert!(encoder.read().unwrap_err().is_end_of_stream());
    encoder.force_key_frame()?;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.frees, 1);
    assert_eq!(calls.encoded.len(), 1);
    Ok(())
}

#[test]
fn test_failed_free_still_closes() {
    let calls = recorder();
    calls.lock().unwrap().free_code = 3;
    let encoder = open_pattern(&calls, PixelFormat::I420);

    match encoder.close() {
        Err(PipeError::Engine { op, status }) => {
            assert_eq!(op, "free");
            assert_eq!(status, EngineStatus::OutOfMemory);
        }
        other => panic!("expected free failure, got {:?}", other),
    }
    assert!(encoder.is_closed());
    assert!(encoder.close().is_ok());
    drop(encoder);
    assert_eq!(calls.lock().unwrap().frees, 1);
}

#[test]
fn test_drop_frees_open_engine_once() {
    let calls = recorder();
    drop(open_pattern(&calls, PixelFormat::I420));
    assert_eq!(calls.lock().unwrap().frees, 1);

    let calls = recorder();
    let encoder = open_pattern(&calls, PixelFormat::I420);
    encoder.close().unwrap();
    drop(encoder);
    assert_eq!(calls.lock().unwrap().frees, 1);
}

#[test]
fn test_frame_released_after_encode() -> anyhow::Result<()> {
    let calls = recorder();
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let mut pattern = TestPattern::new(16, 16, PixelFormat::I420);
    let source = from_fn(move || {
        let (frame, _) = pattern.read()?;
        let counter = counter.clone();
        Ok((
            frame,
            Release::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ))
    });
    let encoder = Encoder::open(
        source,
        EncoderConfig::new(16, 16, 30.0),
        RecordingEngine::opener(calls.clone()),
    )?;

    let (unit, _) = encoder.read()?;
    assert_eq!(released.load(Ordering::SeqCst), 1);
    // The unit is an owned copy and outlives the engine.
    drop(encoder);
    assert_eq!(&unit.data[..5], &[0, 0, 0, 1, 0x65]);
    Ok(())
}

#[test]
fn test_concurrent_read_and_close() {
    let calls = recorder();
    let encoder = Arc::new(open_pattern(&calls, PixelFormat::I420));
    let encoded = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let encoder = encoder.clone();
            let encoded = encoded.clone();
            std::thread::spawn(move || {
                loop {
                    match encoder.read() {
                        Ok(_) => {
                            encoded.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(PipeError::EndOfStream) => break,
                        Err(e) => panic!("unexpected read error: {}", e),
                    }
                }
            })
        })
        .collect();

    std::thread::sleep(Duration::from_millis(20));
    encoder.close().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert!(encoder.read().unwrap_err().is_end_of_stream());
    let calls = calls.lock().unwrap();
    assert_eq!(calls.frees, 1);
    assert_eq!(calls.encoded.len(), encoded.load(Ordering::SeqCst));
}

#[test]
fn test_encoder_ends_a_pull_chain() -> anyhow::Result<()> {
    let calls = recorder();
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = changes.clone();
    let source = TestPattern::new(48, 32, PixelFormat::Nv12)
        .limit(3)
        .throttle(0.0)
        .detect_changes(Duration::from_secs(1), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let mut encoder = Encoder::open(
        source,
        EncoderConfig::new(48, 32, 30.0),
        RecordingEngine::opener(calls.clone()),
    )?;

    let mut units = 0;
    loop {
        match Source::read(&mut encoder) {
            Ok(_) => units += 1,
            Err(PipeError::EndOfStream) => break,
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(units, 3);
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    Ok(())
}
