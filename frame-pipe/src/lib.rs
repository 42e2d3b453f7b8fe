/// Registers FFmpeg components. Call once at startup before opening
/// [`engine::x264::X264Engine`].
#[cfg(feature = "ffmpeg")]
pub fn init() -> Result<(), ffmpeg_next::Error> {
    ffmpeg_next::init()
}

pub mod clock;
pub mod config;
pub mod convert;
pub mod detect;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod frame;
pub mod pattern;
pub mod source;
pub mod throttle;

pub use config::EncoderConfig;
pub use encoder::{BitRateController, Encoder, EncoderController, KeyFrameController};
pub use error::{EngineStatus, PipeError, Result};
pub use frame::{EncodedUnit, MediaProperties, PixelFormat, VideoFrame};
pub use source::{BoxSource, ReadResult, Release, Source, SourceExt, Transform};
