use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::{
    config::EncoderConfig,
    convert::Normalized,
    engine::{Engine, I420View},
    error::{EngineStatus, PipeError, Result},
    frame::{EncodedUnit, VideoFrame},
    source::{ReadResult, Release, Source},
};

pub trait KeyFrameController {
    /// Requests an IDR from the next encode call.
    fn force_key_frame(&self) -> Result<()>;
}

pub trait BitRateController {
    fn set_bit_rate(&self, bit_rate: u32) -> Result<()>;
}

pub trait EncoderController: KeyFrameController + BitRateController {}

impl<T: KeyFrameController + BitRateController> EncoderController for T {}

struct EncoderState<S, E> {
    source: Normalized<S>,
    /// `None` once closed.
    engine: Option<E>,
    force_key_frame: bool,
    frames: u64,
}

/// Pulls normalized frames from `S` and turns them into encoded units.
///
/// Every operation holds the handle's lock for its full duration, so reads
/// are encoded strictly one at a time and `close` waits for an in-flight
/// read. The engine is freed exactly once, by the first `close` or on drop.
pub struct Encoder<S, E: Engine> {
    config: EncoderConfig,
    inner: Mutex<EncoderState<S, E>>,
}

impl<S, E> Encoder<S, E>
where
    S: Source<Item = VideoFrame>,
    E: Engine,
{
    /// Validates `config` and opens the engine. Nothing is left behind on failure.
    pub fn open<F>(source: S, config: EncoderConfig, open_engine: F) -> Result<Self>
    where
        F: FnOnce(&EncoderConfig) -> Result<E, EngineStatus>,
    {
        let config = config.validate()?;
        let engine = open_engine(&config).map_err(|status| PipeError::engine("open", status))?;
        log::debug!(
            "encoder opened: {}x{}, bit rate: {}, max fps: {}",
            config.width,
            config.height,
            config.bit_rate,
            config.max_frame_rate
        );

        Ok(Self {
            config,
            inner: Mutex::new(EncoderState {
                source: Normalized::new(source),
                engine: Some(engine),
                force_key_frame: false,
                frames: 0,
            }),
        })
    }

    /// Effective configuration, defaults applied.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn controller(&self) -> &dyn EncoderController {
        self
    }

    pub fn is_closed(&self) -> bool {
        self.lock().engine.is_none()
    }

    fn lock(&self) -> MutexGuard<'_, EncoderState<S, E>> {
        // A panic inside an engine call leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encodes the next upstream frame. Returns end of stream once closed.
    ///
    /// The returned unit owns a copy of the engine output, so its release
    /// guard is a no-op.
    pub fn read(&self) -> ReadResult<EncodedUnit> {
        let mut guard = self.lock();
        let EncoderState {
            source,
            engine,
            force_key_frame,
            frames,
        } = &mut *guard;

        let Some(engine) = engine.as_mut() else {
            return Err(PipeError::EndOfStream);
        };

        let (frame, release) = source.read()?;
        let view = I420View::from_frame(&frame)?;

        let force = std::mem::take(force_key_frame);
        let output = match engine.encode(&view, force) {
            Ok(output) => output,
            Err(status) => {
                // The request still stands for the next attempt.
                *force_key_frame |= force;
                log::debug!("encode of {} failed: {}", frame, status);
                return Err(PipeError::engine("encode", status));
            }
        };

        let unit = EncodedUnit {
            data: Bytes::copy_from_slice(output.data),
            pts: output.pts,
            is_key: output.is_key,
        };
        *frames += 1;
        log::trace!("encoded frame {}: {}", frames, unit);

        release.release();
        Ok((unit, Release::noop()))
    }

    pub fn force_key_frame(&self) -> Result<()> {
        let mut state = self.lock();
        if state.engine.is_some() {
            state.force_key_frame = true;
        }
        Ok(())
    }

    pub fn set_bit_rate(&self, bit_rate: u32) -> Result<()> {
        let mut state = self.lock();
        let engine = state.engine.as_mut().ok_or(PipeError::Closed)?;
        engine
            .set_bit_rate(bit_rate)
            .map_err(|status| PipeError::engine("set_bit_rate", status))?;
        log::debug!("encoder bit rate set to {}", bit_rate);
        Ok(())
    }

    /// Frees the engine on the first call; later calls succeed without effect.
    /// A failed free is reported, but the handle is closed either way.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock();
        let Some(mut engine) = state.engine.take() else {
            return Ok(());
        };

        let result = engine.free();
        drop(engine);
        log::debug!("encoder closed after {} frames", state.frames);
        result.map_err(|status| PipeError::engine("free", status))
    }
}

impl<S, E> KeyFrameController for Encoder<S, E>
where
    S: Source<Item = VideoFrame>,
    E: Engine,
{
    fn force_key_frame(&self) -> Result<()> {
        Encoder::force_key_frame(self)
    }
}

impl<S, E> BitRateController for Encoder<S, E>
where
    S: Source<Item = VideoFrame>,
    E: Engine,
{
    fn set_bit_rate(&self, bit_rate: u32) -> Result<()> {
        Encoder::set_bit_rate(self, bit_rate)
    }
}

impl<S, E> Source for Encoder<S, E>
where
    S: Source<Item = VideoFrame>,
    E: Engine,
{
    type Item = EncodedUnit;

    fn read(&mut self) -> ReadResult<EncodedUnit> {
        Encoder::read(self)
    }
}

impl<S, E: Engine> Drop for Encoder<S, E> {
    fn drop(&mut self) {
        let state = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut engine) = state.engine.take() {
            if let Err(status) = engine.free() {
                log::warn!("encoder free on drop failed: {}", status);
            }
        }
    }
}

#[cfg(test)]
#[path = "encoder_test.rs"]
mod encoder_test;
