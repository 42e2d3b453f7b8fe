//! Synthetic frame source: a diagonal luma ramp with a bright vertical bar
//! moving a few pixels per frame.

use bytes::BytesMut;

use crate::{
    error::{PipeError, Result},
    frame::{PixelFormat, VideoFrame},
    source::{ReadResult, Release, Source},
};

const BAR_STEP: usize = 4;

pub struct TestPattern {
    width: u32,
    height: u32,
    format: PixelFormat,
    limit: Option<u64>,
    index: u64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            limit: None,
            index: 0,
        }
    }

    /// Ends the stream after `frames` frames.
    pub fn limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    fn luma(&self, x: usize, y: usize) -> u8 {
        let w = self.width as usize;
        let h = self.height as usize;
        let bar = (self.index as usize * BAR_STEP) % w;
        if x >= bar && x < bar + (w / 8).max(1) {
            return 235;
        }
        (16 + (x + y) * 200 / (w + h)) as u8
    }

    fn render(&self) -> Result<VideoFrame> {
        if self.width == 0 || self.height == 0 {
            return Err(PipeError::InvalidFrame(format!(
                "invalid pattern size {}x{}",
                self.width, self.height
            )));
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let mut buf = BytesMut::new();
        let luma_plane = |buf: &mut BytesMut| {
            for y in 0..h {
                for x in 0..w {
                    buf.extend_from_slice(&[self.luma(x, y)]);
                }
            }
        };
        let chroma_len = {
            let (cw, ch) = crate::frame::chroma_size(self.width, self.height);
            cw * ch
        };

        match self.format {
            PixelFormat::Gray8 => luma_plane(&mut buf),
            PixelFormat::I420 | PixelFormat::Nv12 | PixelFormat::Nv21 => {
                luma_plane(&mut buf);
                buf.resize(buf.len() + chroma_len * 2, 128);
            }
            PixelFormat::Yuyv | PixelFormat::Uyvy => {
                let luma_first = self.format == PixelFormat::Yuyv;
                for y in 0..h {
                    for x in (0..w).step_by(2) {
                        let y0 = self.luma(x, y);
                        let y1 = self.luma((x + 1).min(w - 1), y);
                        if luma_first {
                            buf.extend_from_slice(&[y0, 128, y1, 128]);
                        } else {
                            buf.extend_from_slice(&[128, y0, 128, y1]);
                        }
                    }
                }
            }
            PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Rgba | PixelFormat::Bgra => {
                let alpha = matches!(self.format, PixelFormat::Rgba | PixelFormat::Bgra);
                for y in 0..h {
                    for x in 0..w {
                        let l = self.luma(x, y);
                        buf.extend_from_slice(&[l, l, l]);
                        if alpha {
                            buf.extend_from_slice(&[255]);
                        }
                    }
                }
            }
            format @ PixelFormat::Mjpeg => return Err(PipeError::UnsupportedFormat(format)),
        }

        Ok(
            VideoFrame::packed(self.width, self.height, self.format, buf.freeze())?
                .with_pts(Some(self.index as i64)),
        )
    }
}

impl Source for TestPattern {
    type Item = VideoFrame;

    fn read(&mut self) -> ReadResult<VideoFrame> {
        if self.limit.is_some_and(|limit| self.index >= limit) {
            return Err(PipeError::EndOfStream);
        }
        let frame = self.render()?;
        self.index += 1;
        Ok((frame, Release::noop()))
    }
}
