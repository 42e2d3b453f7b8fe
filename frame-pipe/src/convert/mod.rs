//! Colorspace normalization to planar 4:2:0 (I420).
//!
//! RGB input uses BT.601 limited range. With the `ffmpeg` feature the
//! conversion runs through swscale, otherwise through `yuvutils-rs`.
//! Gray input keeps its luma plane and gets neutral chroma.

#[cfg(feature = "ffmpeg")]
mod scale;
#[cfg(not(feature = "ffmpeg"))]
mod yuv;

#[cfg(feature = "ffmpeg")]
use scale::Converter;
#[cfg(not(feature = "ffmpeg"))]
use yuv::Converter;

use bytes::Bytes;

use crate::{
    error::{PipeError, Result},
    frame::{PixelFormat, Plane, VideoFrame, chroma_size},
    source::{ReadResult, Release, Source, Transform},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ToI420;

impl<S: Source<Item = VideoFrame>> Transform<S> for ToI420 {
    type Output = Normalized<S>;

    fn apply(self, upstream: S) -> Self::Output {
        Normalized::new(upstream)
    }
}

/// Source adapter guaranteeing I420 output. I420 input is passed through
/// with its original buffers and release guard.
pub struct Normalized<S> {
    upstream: S,
    converter: Converter,
}

impl<S: Source<Item = VideoFrame>> Normalized<S> {
    pub fn new(upstream: S) -> Self {
        Self {
            upstream,
            converter: Converter::new(),
        }
    }
}

impl<S: Source<Item = VideoFrame>> Source for Normalized<S> {
    type Item = VideoFrame;

    fn read(&mut self) -> ReadResult<VideoFrame> {
        let (frame, release) = self.upstream.read()?;
        if frame.format() == PixelFormat::I420 {
            return Ok((frame, release));
        }

        let converted = normalize(&mut self.converter, &frame);
        // Converted frames own their pixels; the upstream buffer is done.
        release.release();
        match converted {
            Ok(converted) => Ok((converted, Release::noop())),
            Err(e) => {
                log::debug!("colorspace normalizer rejected {}: {}", frame, e);
                Err(e)
            }
        }
    }
}

/// Converts any supported format to I420. Compressed input is rejected.
pub fn to_i420(frame: &VideoFrame) -> Result<VideoFrame> {
    normalize(&mut Converter::new(), frame)
}

fn normalize(converter: &mut Converter, frame: &VideoFrame) -> Result<VideoFrame> {
    let converted = match frame.format() {
        PixelFormat::I420 => return Ok(frame.clone()),
        format @ PixelFormat::Mjpeg => return Err(PipeError::UnsupportedFormat(format)),
        PixelFormat::Gray8 => gray(frame)?,
        _ => converter.convert(frame)?,
    };
    Ok(converted.with_pts(frame.pts()))
}

fn gray(frame: &VideoFrame) -> Result<VideoFrame> {
    let (cw, ch) = chroma_size(frame.width(), frame.height());
    let neutral = Bytes::from(vec![128u8; cw * ch]);
    let luma = frame.plane(0);
    VideoFrame::new(
        frame.width(),
        frame.height(),
        PixelFormat::I420,
        vec![
            Plane::new(luma.bytes(), luma.stride()),
            Plane::new(neutral.clone(), cw),
            Plane::new(neutral, cw),
        ],
    )
}
