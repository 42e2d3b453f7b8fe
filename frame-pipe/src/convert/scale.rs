use bytes::Bytes;
use ffmpeg_next::{format::Pixel, software::scaling};

use crate::{
    error::{PipeError, Result},
    frame::{PixelFormat, Plane, VideoFrame},
};

/// swscale context for one input format and size, with its frames.
struct Scaler {
    key: (PixelFormat, u32, u32),
    context: scaling::Context,
    input: ffmpeg_next::frame::Video,
    output: ffmpeg_next::frame::Video,
}

unsafe impl Send for Scaler {}

impl Scaler {
    fn new(key: (PixelFormat, u32, u32)) -> Result<Self> {
        let (format, width, height) = key;
        let pixel = pixel_of(format)?;
        let context = scaling::Context::get(
            pixel,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            scaling::flag::Flags::BILINEAR,
        )
        .map_err(convert_error)?;
        log::debug!("scaler created: {} {}x{} -> yuv420p", format, width, height);

        Ok(Self {
            key,
            context,
            input: ffmpeg_next::frame::Video::new(pixel, width, height),
            output: ffmpeg_next::frame::Video::empty(),
        })
    }

    fn run(&mut self, frame: &VideoFrame) -> Result<VideoFrame> {
        let layout = frame.format().plane_layout(frame.width(), frame.height());
        for (index, (row_bytes, rows)) in layout.into_iter().enumerate() {
            let src = frame.plane(index);
            let dst_stride = self.input.stride(index);
            let dst = self.input.data_mut(index);
            for y in 0..rows {
                let start = y * dst_stride;
                dst[start..start + row_bytes].copy_from_slice(src.row(y, row_bytes));
            }
        }

        self.context
            .run(&self.input, &mut self.output)
            .map_err(convert_error)?;

        let planes = (0..3)
            .map(|index| {
                Plane::new(
                    Bytes::copy_from_slice(self.output.data(index)),
                    self.output.stride(index),
                )
            })
            .collect();
        VideoFrame::new(frame.width(), frame.height(), PixelFormat::I420, planes)
    }
}

/// Converter backed by swscale. The context is rebuilt when the input
/// format or size changes.
pub(crate) struct Converter {
    scaler: Option<Scaler>,
}

impl Converter {
    pub(crate) fn new() -> Self {
        Self { scaler: None }
    }

    pub(crate) fn convert(&mut self, frame: &VideoFrame) -> Result<VideoFrame> {
        let key = (frame.format(), frame.width(), frame.height());
        let scaler = match self.scaler.take() {
            Some(scaler) if scaler.key == key => self.scaler.insert(scaler),
            _ => self.scaler.insert(Scaler::new(key)?),
        };
        scaler.run(frame)
    }
}

fn pixel_of(format: PixelFormat) -> Result<Pixel> {
    match format {
        PixelFormat::I420 => Ok(Pixel::YUV420P),
        PixelFormat::Nv12 => Ok(Pixel::NV12),
        PixelFormat::Nv21 => Ok(Pixel::NV21),
        PixelFormat::Yuyv => Ok(Pixel::YUYV422),
        PixelFormat::Uyvy => Ok(Pixel::UYVY422),
        PixelFormat::Rgb24 => Ok(Pixel::RGB24),
        PixelFormat::Bgr24 => Ok(Pixel::BGR24),
        PixelFormat::Rgba => Ok(Pixel::RGBA),
        PixelFormat::Bgra => Ok(Pixel::BGRA),
        PixelFormat::Gray8 => Ok(Pixel::GRAY8),
        PixelFormat::Mjpeg => Err(PipeError::UnsupportedFormat(format)),
    }
}

fn convert_error(err: ffmpeg_next::Error) -> PipeError {
    PipeError::Convert(err.to_string())
}
