use std::fmt::{Display, Formatter};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{PipeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Planar YUV 4:2:0 (Y, U, V). The canonical encoder input.
    #[default]
    I420,
    /// Y plane followed by interleaved UV.
    Nv12,
    /// Y plane followed by interleaved VU.
    Nv21,
    /// Packed 4:2:2, Y0 U Y1 V.
    Yuyv,
    /// Packed 4:2:2, U Y0 V Y1.
    Uyvy,
    Rgb24,
    Bgr24,
    Rgba,
    Bgra,
    Gray8,
    /// Compressed JPEG payload in a single plane.
    Mjpeg,
}

impl PixelFormat {
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::I420 => 3,
            PixelFormat::Nv12 | PixelFormat::Nv21 => 2,
            _ => 1,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, PixelFormat::Mjpeg)
    }

    /// Minimum `(row bytes, rows)` of every plane for the given size.
    /// Empty for compressed formats.
    pub fn plane_layout(&self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let w = width as usize;
        let h = height as usize;
        let (cw, ch) = chroma_size(width, height);
        match self {
            PixelFormat::I420 => vec![(w, h), (cw, ch), (cw, ch)],
            PixelFormat::Nv12 | PixelFormat::Nv21 => vec![(w, h), (cw * 2, ch)],
            PixelFormat::Yuyv | PixelFormat::Uyvy => vec![(cw * 4, h)],
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => vec![(w * 3, h)],
            PixelFormat::Rgba | PixelFormat::Bgra => vec![(w * 4, h)],
            PixelFormat::Gray8 => vec![(w, h)],
            PixelFormat::Mjpeg => Vec::new(),
        }
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PixelFormat::I420 => "i420",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Nv21 => "nv21",
            PixelFormat::Yuyv => "yuyv",
            PixelFormat::Uyvy => "uyvy",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Mjpeg => "mjpeg",
        };
        f.write_str(name)
    }
}

/// Chroma plane size for 4:2:0 subsampling, rounded up for odd sizes.
pub fn chroma_size(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

#[derive(Clone)]
pub struct Plane {
    data: Bytes,
    stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Bytes>, stride: usize) -> Self {
        Self {
            data: data.into(),
            stride,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Row `y`, `len` bytes long. Callers check bounds through frame validation.
    pub fn row(&self, y: usize, len: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + len]
    }
}

/// Decoded picture. Plane buffers are reference counted, so clones and
/// pass-through stages never copy pixel data.
#[derive(Clone)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Plane>,
    pts: Option<i64>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, format: PixelFormat, planes: Vec<Plane>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipeError::InvalidFrame(format!(
                "invalid video size {}x{}",
                width, height
            )));
        }
        if planes.len() != format.plane_count() {
            return Err(PipeError::InvalidFrame(format!(
                "{} expects {} planes, got {}",
                format,
                format.plane_count(),
                planes.len()
            )));
        }

        for (index, ((row_bytes, rows), plane)) in format
            .plane_layout(width, height)
            .into_iter()
            .zip(planes.iter())
            .enumerate()
        {
            if plane.stride < row_bytes {
                return Err(PipeError::InvalidFrame(format!(
                    "plane {} stride {} shorter than row ({} bytes)",
                    index, plane.stride, row_bytes
                )));
            }
            let needed = plane.stride * (rows - 1) + row_bytes;
            if plane.data.len() < needed {
                return Err(PipeError::InvalidFrame(format!(
                    "plane {} length mismatch: expected at least {}, got {}",
                    index,
                    needed,
                    plane.data.len()
                )));
            }
        }

        Ok(Self {
            width,
            height,
            format,
            planes,
            pts: None,
        })
    }

    /// Splits one tightly packed buffer into the planes of `format`.
    pub fn packed(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Bytes>,
    ) -> Result<Self> {
        let data = data.into();
        if format.is_compressed() {
            let stride = data.len();
            return Self::new(width, height, format, vec![Plane::new(data, stride)]);
        }

        let mut planes = Vec::with_capacity(format.plane_count());
        let mut offset = 0;
        for (row_bytes, rows) in format.plane_layout(width, height) {
            let len = row_bytes * rows;
            if offset + len > data.len() {
                return Err(PipeError::InvalidFrame(format!(
                    "{} frame {}x{} needs {} more bytes",
                    format,
                    width,
                    height,
                    offset + len - data.len()
                )));
            }
            planes.push(Plane::new(data.slice(offset..offset + len), row_bytes));
            offset += len;
        }
        Self::new(width, height, format, planes)
    }

    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn plane(&self, index: usize) -> &Plane {
        &self.planes[index]
    }
}

impl Display for VideoFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VideoFrame width: {}, height: {}, format: {}, planes: {}, pts: {:?}",
            self.width,
            self.height,
            self.format,
            self.planes.len(),
            self.pts
        )
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// Snapshot of the stream properties reported to change observers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaProperties {
    pub width: u32,
    pub height: u32,
    /// Estimated from arrival timing; `0.0` until the first estimate.
    pub frame_rate: f32,
    pub pixel_format: PixelFormat,
}

/// One compressed access unit. Owns its bytes, safe to keep after the
/// encoder call that produced it.
#[derive(Debug, Clone, Default)]
pub struct EncodedUnit {
    pub data: Bytes,
    pub pts: Option<i64>,
    pub is_key: bool,
}

impl EncodedUnit {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Display for EncodedUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncodedUnit data_len: {}, pts: {:?}, is_key: {}",
            self.data.len(),
            self.pts,
            self.is_key
        )
    }
}
