use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::{
    config::EncoderConfig,
    engine::{EncodedOutput, Engine, I420View},
    error::EngineStatus,
};

/// Everything the recording engine saw, shared with the test.
#[derive(Debug, Default)]
pub struct Calls {
    pub opened: Vec<EncoderConfig>,
    pub encoded: Vec<(u32, u32, bool)>,
    pub bit_rates: Vec<u32>,
    pub frees: usize,
    /// Status codes returned by upcoming `encode` calls, `0` for success.
    pub encode_codes: VecDeque<i32>,
    pub free_code: i32,
    /// pts reported by upcoming `encode` calls instead of the input pts.
    pub output_pts: VecDeque<Option<i64>>,
}

pub type Recorder = Arc<Mutex<Calls>>;

pub struct RecordingEngine {
    calls: Recorder,
    buffer: Vec<u8>,
    count: u32,
}

impl RecordingEngine {
    pub fn opener(
        calls: Recorder,
    ) -> impl FnOnce(&EncoderConfig) -> Result<RecordingEngine, EngineStatus> {
        move |config: &EncoderConfig| {
            calls.lock().unwrap().opened.push(config.clone());
            Ok(RecordingEngine {
                calls,
                buffer: Vec::new(),
                count: 0,
            })
        }
    }
}

impl Engine for RecordingEngine {
    fn encode(
        &mut self,
        frame: &I420View<'_>,
        force_key_frame: bool,
    ) -> Result<EncodedOutput<'_>, EngineStatus> {
        let mut calls = self.calls.lock().unwrap();
        let code = calls.encode_codes.pop_front().unwrap_or(0);
        EngineStatus::from_code(code)?;
        calls
            .encoded
            .push((frame.width, frame.height, force_key_frame));

        let pts = calls.output_pts.pop_front().unwrap_or(frame.pts);
        let is_key = force_key_frame || self.count == 0;
        self.count += 1;
        // Fake Annex-B unit: start code, NAL type, first luma byte, counter.
        self.buffer.clear();
        self.buffer
            .extend_from_slice(&[0, 0, 0, 1, if is_key { 0x65 } else { 0x41 }]);
        self.buffer.push(frame.y[0]);
        self.buffer.extend_from_slice(&self.count.to_be_bytes());
        Ok(EncodedOutput {
            data: &self.buffer,
            is_key,
            pts,
        })
    }

    fn set_bit_rate(&mut self, bit_rate: u32) -> Result<(), EngineStatus> {
        self.calls.lock().unwrap().bit_rates.push(bit_rate);
        Ok(())
    }

    fn free(&mut self) -> Result<(), EngineStatus> {
        let mut calls = self.calls.lock().unwrap();
        calls.frees += 1;
        EngineStatus::from_code(calls.free_code)
    }
}
