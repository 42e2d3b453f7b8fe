use serde::{Deserialize, Serialize};

use crate::error::{PipeError, Result};

/// Applied when the configured bit rate is zero.
pub const DEFAULT_BIT_RATE: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    #[default]
    CameraRealTime = 0,
    ScreenRealTime = 1,
    CameraNonRealTime = 2,
    ScreenNonRealTime = 3,
    All = 4,
}

impl UsageType {
    pub fn is_real_time(&self) -> bool {
        matches!(self, UsageType::CameraRealTime | UsageType::ScreenRealTime)
    }

    pub fn is_screen_content(&self) -> bool {
        matches!(self, UsageType::ScreenRealTime | UsageType::ScreenNonRealTime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RcMode {
    Quality = 0,
    #[default]
    Bitrate = 1,
    Buffer = 2,
    Timestamp = 3,
    BitratePostSkip = 4,
    Off = -1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceMode {
    Single = 0,
    Fixed = 1,
    Raster = 2,
    #[default]
    SizeLimited = 3,
}

/// Everything the engine needs at open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    /// bps, `0` selects [`DEFAULT_BIT_RATE`]
    pub bit_rate: u32,
    pub max_frame_rate: f32,
    pub usage_type: UsageType,
    pub rc_mode: RcMode,
    pub enable_frame_skip: bool,
    /// bytes, `0` leaves it to the engine
    pub max_nal_size: u32,
    /// frames between IDRs, `0` leaves it to the engine
    pub intra_period: u32,
    /// `0` lets the engine pick
    pub thread_count: u32,
    pub slice_num: u32,
    pub slice_mode: SliceMode,
    /// bytes per slice in size-limited mode
    pub slice_size_constraint: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            bit_rate: DEFAULT_BIT_RATE,
            max_frame_rate: 30.0,
            usage_type: UsageType::CameraRealTime,
            rc_mode: RcMode::Bitrate,
            enable_frame_skip: true,
            max_nal_size: 0,
            intra_period: 30,
            thread_count: 0,
            slice_num: 1,
            slice_mode: SliceMode::SizeLimited,
            slice_size_constraint: 12800,
        }
    }
}

impl EncoderConfig {
    pub fn new(width: u32, height: u32, max_frame_rate: f32) -> Self {
        Self {
            width,
            height,
            max_frame_rate,
            ..Default::default()
        }
    }

    /// Checks the parameters and returns the effective configuration.
    pub fn validate(mut self) -> Result<Self> {
        if self.width == 0 || self.height == 0 {
            return Err(PipeError::Config(format!(
                "invalid video size {}x{}",
                self.width, self.height
            )));
        }
        if !self.max_frame_rate.is_finite() || self.max_frame_rate < 0.0 {
            return Err(PipeError::Config(format!(
                "invalid max frame rate {}",
                self.max_frame_rate
            )));
        }
        match self.slice_mode {
            SliceMode::Fixed | SliceMode::Raster if self.slice_num == 0 => {
                return Err(PipeError::Config(format!(
                    "slice mode {:?} needs at least one slice",
                    self.slice_mode
                )));
            }
            SliceMode::SizeLimited if self.slice_size_constraint == 0 => {
                return Err(PipeError::Config(
                    "size limited slices need a slice size constraint".to_string(),
                ));
            }
            _ => {}
        }
        if self.bit_rate == 0 {
            self.bit_rate = DEFAULT_BIT_RATE;
        }
        Ok(self)
    }
}
