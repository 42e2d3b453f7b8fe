use std::fmt::{Display, Formatter};

use crate::frame::PixelFormat;

pub type Result<T, E = PipeError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// Sentinel: the source is exhausted and stays exhausted.
    #[error("end of stream")]
    EndOfStream,
    #[error("invalid encoder configuration: {0}")]
    Config(String),
    #[error("engine {op} failed: {status}")]
    Engine {
        op: &'static str,
        status: EngineStatus,
    },
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(PixelFormat),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("colorspace conversion failed: {0}")]
    Convert(String),
    #[error("encoder is closed")]
    Closed,
    #[error("upstream source failed: {0}")]
    Upstream(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PipeError {
    pub fn upstream<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        PipeError::Upstream(err.into())
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, PipeError::EndOfStream)
    }

    pub(crate) fn engine(op: &'static str, status: EngineStatus) -> Self {
        PipeError::Engine { op, status }
    }
}

/// Non-zero status reported by an encoding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    InvalidParameter,
    Unknown,
    OutOfMemory,
    NotInitialized,
    UnsupportedData,
    Other(i32),
}

impl EngineStatus {
    /// Maps a raw engine return code. `0` is success.
    pub fn from_code(code: i32) -> Result<(), EngineStatus> {
        match code {
            0 => Ok(()),
            1 => Err(EngineStatus::InvalidParameter),
            2 => Err(EngineStatus::Unknown),
            3 => Err(EngineStatus::OutOfMemory),
            4 => Err(EngineStatus::NotInitialized),
            5 => Err(EngineStatus::UnsupportedData),
            other => Err(EngineStatus::Other(other)),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            EngineStatus::InvalidParameter => 1,
            EngineStatus::Unknown => 2,
            EngineStatus::OutOfMemory => 3,
            EngineStatus::NotInitialized => 4,
            EngineStatus::UnsupportedData => 5,
            EngineStatus::Other(code) => *code,
        }
    }
}

impl Display for EngineStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            EngineStatus::InvalidParameter => "invalid parameter",
            EngineStatus::Unknown => "unknown reason",
            EngineStatus::OutOfMemory => "out of memory",
            EngineStatus::NotInitialized => "not initialized",
            EngineStatus::UnsupportedData => "unsupported data",
            EngineStatus::Other(_) => "unrecognized status",
        };
        write!(f, "{} (code {})", reason, self.code())
    }
}

impl std::error::Error for EngineStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_code_is_success() {
        assert_eq!(EngineStatus::from_code(0), Ok(()));
    }

    #[test]
    fn known_codes_map_to_taxonomy() {
        assert_eq!(EngineStatus::from_code(1), Err(EngineStatus::InvalidParameter));
        assert_eq!(EngineStatus::from_code(3), Err(EngineStatus::OutOfMemory));
        assert_eq!(EngineStatus::from_code(5), Err(EngineStatus::UnsupportedData));
        assert_eq!(EngineStatus::from_code(-22), Err(EngineStatus::Other(-22)));
        assert_eq!(EngineStatus::Other(-22).code(), -22);
    }

    #[test]
    fn engine_error_message_carries_code() {
        let err = PipeError::engine("encode", EngineStatus::OutOfMemory);
        assert_eq!(err.to_string(), "engine encode failed: out of memory (code 3)");
        assert!(!err.is_end_of_stream());
        assert!(PipeError::EndOfStream.is_end_of_stream());
    }
}
