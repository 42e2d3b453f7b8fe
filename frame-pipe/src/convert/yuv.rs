use yuvutils_rs::{
    YuvBiPlanarImage, YuvChromaSubsampling, YuvConversionMode, YuvError, YuvPackedImage,
    YuvPlanarImageMut, YuvRange, YuvStandardMatrix,
};

use crate::{
    error::{PipeError, Result},
    frame::{PixelFormat, Plane, VideoFrame},
};

const RANGE: YuvRange = YuvRange::Limited;
const MATRIX: YuvStandardMatrix = YuvStandardMatrix::Bt601;
const MODE: YuvConversionMode = YuvConversionMode::Balanced;

/// Stateless converter backed by `yuvutils-rs`.
pub(crate) struct Converter;

impl Converter {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) fn convert(&mut self, frame: &VideoFrame) -> Result<VideoFrame> {
        let (width, height) = (frame.width(), frame.height());
        let mut planar = YuvPlanarImageMut::<u8>::alloc(width, height, YuvChromaSubsampling::Yuv420);
        let src = frame.plane(0);
        let stride = src.stride() as u32;

        let packed = || YuvPackedImage {
            yuy: src.data(),
            yuy_stride: stride,
            width,
            height,
        };
        let bi_planar = || YuvBiPlanarImage {
            y_plane: src.data(),
            y_stride: stride,
            uv_plane: frame.plane(1).data(),
            uv_stride: frame.plane(1).stride() as u32,
            width,
            height,
        };

        match frame.format() {
            PixelFormat::Nv12 => yuvutils_rs::yuv_nv12_to_yuv420(&mut planar, &bi_planar()),
            PixelFormat::Nv21 => yuvutils_rs::yuv_nv21_to_yuv420(&mut planar, &bi_planar()),
            PixelFormat::Yuyv => yuvutils_rs::yuyv422_to_yuv420(&mut planar, &packed()),
            PixelFormat::Uyvy => yuvutils_rs::uyvy422_to_yuv420(&mut planar, &packed()),
            PixelFormat::Rgb24 => {
                yuvutils_rs::rgb_to_yuv420(&mut planar, src.data(), stride, RANGE, MATRIX, MODE)
            }
            PixelFormat::Bgr24 => {
                yuvutils_rs::bgr_to_yuv420(&mut planar, src.data(), stride, RANGE, MATRIX, MODE)
            }
            PixelFormat::Rgba => {
                yuvutils_rs::rgba_to_yuv420(&mut planar, src.data(), stride, RANGE, MATRIX, MODE)
            }
            PixelFormat::Bgra => {
                yuvutils_rs::bgra_to_yuv420(&mut planar, src.data(), stride, RANGE, MATRIX, MODE)
            }
            format => return Err(PipeError::UnsupportedFormat(format)),
        }
        .map_err(convert_error)?;

        VideoFrame::new(
            width,
            height,
            PixelFormat::I420,
            vec![
                Plane::new(planar.y_plane.borrow().to_vec(), planar.y_stride as usize),
                Plane::new(planar.u_plane.borrow().to_vec(), planar.u_stride as usize),
                Plane::new(planar.v_plane.borrow().to_vec(), planar.v_stride as usize),
            ],
        )
    }
}

fn convert_error(err: YuvError) -> PipeError {
    PipeError::Convert(err.to_string())
}
