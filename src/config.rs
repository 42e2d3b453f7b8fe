use std::path::{Path, PathBuf};

use frame_pipe::{EncoderConfig, PixelFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeConfig {
    pub width: u32,
    pub height: u32,
    /// Pixel format the test pattern is produced in before normalization.
    pub format: PixelFormat,
    pub frame_rate: f32,
    pub poll_interval_ms: u64,
    /// Stop after this many frames, run until interrupted when unset.
    pub frames: Option<u64>,
    /// Request an IDR every N encoded units.
    pub key_frame_every: Option<u64>,
    pub output: PathBuf,
    pub encoder: EncoderConfig,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: PixelFormat::Nv12,
            frame_rate: 30.0,
            poll_interval_ms: 1000,
            frames: Some(300),
            key_frame_every: None,
            output: PathBuf::from("out.h264"),
            encoder: EncoderConfig::default(),
        }
    }
}

impl PipeConfig {
    /// Encoder settings with the pattern's size and rate applied.
    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            width: self.width,
            height: self.height,
            max_frame_rate: self.frame_rate,
            ..self.encoder.clone()
        }
    }
}

pub fn load(path: Option<&Path>) -> anyhow::Result<PipeConfig> {
    let Some(path) = path else {
        return Ok(PipeConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read config {}: {}", path.display(), e))?;
    let config = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("parse config {}: {}", path.display(), e))?;
    Ok(config)
}
