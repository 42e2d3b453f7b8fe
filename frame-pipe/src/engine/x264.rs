//! H.264 engine backed by libx264 through FFmpeg.

use std::collections::VecDeque;

use ffmpeg_next::{Dictionary, Rational, format::Pixel, picture};

use crate::{
    config::{EncoderConfig, RcMode, SliceMode},
    engine::{EncodedOutput, Engine, I420View},
    error::EngineStatus,
    frame::chroma_size,
};

const CODEC_NAME: &str = "libx264";

pub struct X264Engine {
    encoder: ffmpeg_next::codec::encoder::Video,
    input: ffmpeg_next::frame::Video,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
    frame_index: i64,
    /// Encoder pts of submitted pictures paired with their source pts.
    pending: VecDeque<(i64, Option<i64>)>,
    freed: bool,
}

unsafe impl Send for X264Engine {}

impl X264Engine {
    /// Registers FFmpeg components and opens a libx264 encoder for `config`.
    pub fn open(config: &EncoderConfig) -> Result<Self, EngineStatus> {
        ffmpeg_next::init().map_err(|e| {
            log::error!("ffmpeg_next init: {}", e);
            EngineStatus::NotInitialized
        })?;

        let codec = ffmpeg_next::encoder::find_by_name(CODEC_NAME)
            .or_else(|| ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::H264))
            .ok_or_else(|| {
                log::error!("codec not found: {}", CODEC_NAME);
                EngineStatus::NotInitialized
            })?;
        let codec_name = codec.name().to_string();

        let context = ffmpeg_next::codec::Context::new_with_codec(codec);
        let mut encoder = context.encoder().video().map_err(status_of)?;
        encoder.set_width(config.width);
        encoder.set_height(config.height);
        encoder.set_format(Pixel::YUV420P);
        let rate = frame_rate(config.max_frame_rate);
        encoder.set_frame_rate(Some(rate));
        encoder.set_time_base(rate.invert());
        if config.intra_period > 0 {
            encoder.set_gop(config.intra_period);
        }
        if !matches!(config.rc_mode, RcMode::Quality | RcMode::Off) {
            encoder.set_bit_rate(config.bit_rate as usize);
            encoder.set_max_bit_rate(config.bit_rate as usize);
        }
        if !config.enable_frame_skip {
            log::debug!("{} never skips frames, ignoring enable_frame_skip", codec_name);
        }

        let encoder = encoder.open_with(options(config)).map_err(status_of)?;
        log::info!(
            "encoder opened successfully: {} {}x{}",
            codec_name,
            config.width,
            config.height
        );

        Ok(Self {
            encoder,
            input: ffmpeg_next::frame::Video::new(Pixel::YUV420P, config.width, config.height),
            width: config.width,
            height: config.height,
            buffer: Vec::new(),
            frame_index: 0,
            pending: VecDeque::new(),
            freed: false,
        })
    }

    fn source_pts(&mut self, packet_pts: Option<i64>) -> Option<i64> {
        let index = packet_pts?;
        while let Some(&(queued, pts)) = self.pending.front() {
            if queued > index {
                break;
            }
            self.pending.pop_front();
            if queued == index {
                return pts;
            }
        }
        None
    }
}

impl Engine for X264Engine {
    fn encode(
        &mut self,
        frame: &I420View<'_>,
        force_key_frame: bool,
    ) -> Result<EncodedOutput<'_>, EngineStatus> {
        if self.freed {
            return Err(EngineStatus::NotInitialized);
        }
        if frame.width != self.width || frame.height != self.height {
            log::debug!(
                "frame {}x{} does not match encoder {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            );
            return Err(EngineStatus::InvalidParameter);
        }

        // The codec may still reference the previous picture's buffers.
        let ret = unsafe { ffmpeg_next::ffi::av_frame_make_writable(self.input.as_mut_ptr()) };
        if ret < 0 {
            return Err(status_of(ffmpeg_next::Error::from(ret)));
        }

        let (cw, ch) = chroma_size(self.width, self.height);
        let (w, h) = (self.width as usize, self.height as usize);
        copy_plane(&mut self.input, 0, frame.y, frame.y_stride, w, h);
        copy_plane(&mut self.input, 1, frame.u, frame.c_stride, cw, ch);
        copy_plane(&mut self.input, 2, frame.v, frame.c_stride, cw, ch);
        self.input.set_pts(Some(self.frame_index));
        self.input.set_kind(if force_key_frame {
            picture::Type::I
        } else {
            picture::Type::None
        });

        self.encoder.send_frame(&self.input).map_err(status_of)?;
        self.pending.push_back((self.frame_index, frame.pts));
        self.frame_index += 1;

        self.buffer.clear();
        let mut is_key = false;
        let mut pts = None;
        let mut packets = 0;
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    if let Some(data) = packet.data() {
                        self.buffer.extend_from_slice(data);
                    }
                    is_key |= packet.is_key();
                    let source = self.source_pts(packet.pts());
                    if packets == 0 {
                        pts = source;
                    }
                    packets += 1;
                }
                Err(ffmpeg_next::Error::Other { errno })
                    if errno == ffmpeg_next::util::error::EAGAIN =>
                {
                    break;
                }
                Err(ffmpeg_next::Error::Eof) => break,
                Err(err) => return Err(status_of(err)),
            }
        }

        if packets == 0 {
            log::warn!("{} held back frame {}", CODEC_NAME, self.frame_index - 1);
        }

        Ok(EncodedOutput {
            data: &self.buffer,
            is_key,
            pts,
        })
    }

    fn set_bit_rate(&mut self, bit_rate: u32) -> Result<(), EngineStatus> {
        if bit_rate == 0 {
            return Err(EngineStatus::InvalidParameter);
        }
        // libx264 reconfigures itself when it sees the context rate change.
        unsafe {
            let ctx = self.encoder.as_mut_ptr();
            (*ctx).bit_rate = bit_rate as i64;
            (*ctx).rc_max_rate = bit_rate as i64;
        }
        Ok(())
    }

    fn free(&mut self) -> Result<(), EngineStatus> {
        if self.freed {
            return Ok(());
        }
        self.freed = true;

        // The context itself goes away with `self`.
        self.encoder.send_eof().map_err(status_of)?;
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        let mut dropped = 0;
        while self.encoder.receive_packet(&mut packet).is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            log::warn!("{} delayed packets dropped on close", dropped);
        }
        log::info!("encoder closed after {} frames", self.frame_index);
        Ok(())
    }
}

fn copy_plane(
    picture: &mut ffmpeg_next::frame::Video,
    index: usize,
    src: &[u8],
    src_stride: usize,
    row_bytes: usize,
    rows: usize,
) {
    let dst_stride = picture.stride(index);
    let dst = picture.data_mut(index);
    for row in 0..rows {
        let (d, s) = (row * dst_stride, row * src_stride);
        dst[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
    }
}

fn frame_rate(fps: f32) -> Rational {
    let fps = if fps > 0.0 { fps } else { 30.0 };
    Rational::new((fps * 1000.0).round() as i32, 1000).reduce()
}

fn options(config: &EncoderConfig) -> Dictionary<'static> {
    let mut opts = Dictionary::new();
    // zerolatency on every usage type keeps output in step with input.
    if config.usage_type.is_real_time() {
        opts.set("preset", "ultrafast");
        opts.set("tune", "zerolatency");
    } else {
        opts.set("preset", "medium");
        if config.usage_type.is_screen_content() {
            opts.set("tune", "stillimage,zerolatency");
        } else {
            opts.set("tune", "zerolatency");
        }
    }
    opts.set("forced-idr", "1");
    if config.thread_count > 0 {
        opts.set("threads", &config.thread_count.to_string());
    }
    match config.rc_mode {
        RcMode::Quality => opts.set("crf", "23"),
        RcMode::Off => opts.set("qp", "23"),
        _ => {}
    }

    let mut params = Vec::new();
    let mut max_slice_size = config.max_nal_size;
    match config.slice_mode {
        SliceMode::Fixed | SliceMode::Raster if config.slice_num > 1 => {
            params.push(format!("slices={}", config.slice_num));
        }
        SliceMode::SizeLimited => {
            max_slice_size = match max_slice_size {
                0 => config.slice_size_constraint,
                n => n.min(config.slice_size_constraint),
            };
        }
        _ => {}
    }
    if max_slice_size > 0 {
        params.push(format!("slice-max-size={}", max_slice_size));
    }
    if config.rc_mode == RcMode::Buffer {
        let kbps = (config.bit_rate / 1000).max(1);
        params.push(format!("vbv-maxrate={}", kbps));
        params.push(format!("vbv-bufsize={}", kbps));
    }
    if !params.is_empty() {
        opts.set("x264-params", &params.join(":"));
    }
    opts
}

fn status_of(err: ffmpeg_next::Error) -> EngineStatus {
    log::debug!("ffmpeg error: {}", err);
    match err {
        ffmpeg_next::Error::InvalidData => EngineStatus::UnsupportedData,
        ffmpeg_next::Error::EncoderNotFound => EngineStatus::NotInitialized,
        ffmpeg_next::Error::Other { errno } if errno == ffmpeg_next::util::error::ENOMEM => {
            EngineStatus::OutOfMemory
        }
        ffmpeg_next::Error::Other { errno } if errno == ffmpeg_next::util::error::EINVAL => {
            EngineStatus::InvalidParameter
        }
        other => EngineStatus::Other(i32::from(other)),
    }
}
