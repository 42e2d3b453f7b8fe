//! Encoding engine capability driven by the encoder bridge.
//!
//! The engine only ever sees pixel data through an [`I420View`] borrowed for
//! the duration of one `encode` call, and hands back output that borrows its
//! own internal buffer. The bridge copies that output before returning.

#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "ffmpeg")]
pub mod x264;

use crate::{
    error::{EngineStatus, PipeError, Result},
    frame::{PixelFormat, VideoFrame},
};

/// Borrowed planes of one I420 picture.
#[derive(Debug, Clone, Copy)]
pub struct I420View<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub y_stride: usize,
    pub c_stride: usize,
    pub width: u32,
    pub height: u32,
    pub pts: Option<i64>,
}

impl<'a> I420View<'a> {
    pub fn from_frame(frame: &'a VideoFrame) -> Result<Self> {
        if frame.format() != PixelFormat::I420 {
            return Err(PipeError::UnsupportedFormat(frame.format()));
        }
        let (y, u, v) = (frame.plane(0), frame.plane(1), frame.plane(2));
        if u.stride() != v.stride() {
            return Err(PipeError::InvalidFrame(format!(
                "chroma strides differ: {} vs {}",
                u.stride(),
                v.stride()
            )));
        }
        Ok(Self {
            y: y.data(),
            u: u.data(),
            v: v.data(),
            y_stride: y.stride(),
            c_stride: u.stride(),
            width: frame.width(),
            height: frame.height(),
            pts: frame.pts(),
        })
    }
}

/// Output of one encode call, valid until the engine is used again.
#[derive(Debug, Clone, Copy)]
pub struct EncodedOutput<'a> {
    pub data: &'a [u8],
    pub is_key: bool,
    /// pts of the input picture this output belongs to.
    pub pts: Option<i64>,
}

pub trait Engine: Send {
    /// Encodes one picture. `force_key_frame` asks for an IDR on this call.
    fn encode(
        &mut self,
        frame: &I420View<'_>,
        force_key_frame: bool,
    ) -> Result<EncodedOutput<'_>, EngineStatus>;

    /// Takes effect on a later `encode`.
    fn set_bit_rate(&mut self, bit_rate: u32) -> Result<(), EngineStatus>;

    /// Releases engine resources. Called at most once.
    fn free(&mut self) -> Result<(), EngineStatus>;
}
