//! Voice activity detection: the dual-gate speech classifier used by both
//! the WakewordListener (background VAD gate, spec §4.2) and the
//! SpeechRecorder (foreground dual gate, spec §4.3).
//!
//! WebRTC-style aggressiveness-level VAD is the default and the one the
//! spec requires for SpeechRecorder; Silero is kept as a selectable
//! alternative, matching the grounding crate's own two-implementation split.

pub mod silero;

pub use silero::SileroVad;

use std::collections::VecDeque;
use thiserror::Error;
use webrtc_vad::{SampleRate, Vad, VadMode};

#[derive(Error, Debug)]
pub enum VadError {
    #[error("invalid frame duration: must be 10, 20 or 30ms")]
    InvalidFrameDuration,
    #[error("invalid frame length for VAD")]
    InvalidFrame,
    #[error("unsupported sample rate for VAD: {0}")]
    UnsupportedSampleRate(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadAggressiveness {
    Quality,
    LowBitrate,
    Aggressive,
    VeryAggressive,
}

impl From<VadAggressiveness> for VadMode {
    fn from(mode: VadAggressiveness) -> Self {
        match mode {
            VadAggressiveness::Quality => VadMode::Quality,
            VadAggressiveness::LowBitrate => VadMode::LowBitrate,
            VadAggressiveness::Aggressive => VadMode::Aggressive,
            VadAggressiveness::VeryAggressive => VadMode::VeryAggressive,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VadConfig {
    pub aggressiveness: VadAggressiveness,
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
    pub speech_trigger_frames: usize,
    pub silence_stop_frames: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            // Spec §4.3 calls for "WebRTC-style VAD (aggressiveness level 2)".
            aggressiveness: VadAggressiveness::Aggressive,
            sample_rate: 16_000,
            frame_duration_ms: 20,
            speech_trigger_frames: 3,
            silence_stop_frames: 15,
        }
    }
}

fn sample_rate_enum(rate: u32) -> Result<SampleRate, VadError> {
    match rate {
        8_000 => Ok(SampleRate::Rate8kHz),
        16_000 => Ok(SampleRate::Rate16kHz),
        32_000 => Ok(SampleRate::Rate32kHz),
        48_000 => Ok(SampleRate::Rate48kHz),
        other => Err(VadError::UnsupportedSampleRate(other)),
    }
}

/// Common surface both implementations expose. The dual gate in
/// SpeechRecorder calls `frame_is_voiced` per-frame; the WakewordListener's
/// background gate uses the debounced `should_process_audio`/
/// `is_speech_active` pair instead.
pub trait Vad: Send {
    /// Feed samples (any length) and report whether speech is currently
    /// considered active after debouncing.
    fn should_process_audio(&mut self, samples: &[i16]) -> Result<bool, VadError>;

    fn is_speech_active(&self) -> bool;

    /// Classify exactly one frame of `frame_duration_ms` without touching
    /// the debounced state machine above — this is what the dual gate in
    /// SpeechRecorder needs (spec §4.3 step 4).
    fn frame_is_voiced(&mut self, frame: &[i16]) -> Result<bool, VadError>;

    fn reset(&mut self);
}

pub struct WebRtcVad {
    vad: Vad_,
    frame_size: usize,
    speech_trigger_frames: usize,
    silence_stop_frames: usize,
    recent_decisions: VecDeque<bool>,
    is_speech_active: bool,
    audio_buffer: Vec<i16>,
}

// webrtc_vad::Vad shadows our trait name; alias to keep both in scope.
use webrtc_vad::Vad as Vad_;

impl WebRtcVad {
    pub fn new(config: VadConfig) -> Result<Self, VadError> {
        if ![10, 20, 30].contains(&config.frame_duration_ms) {
            return Err(VadError::InvalidFrameDuration);
        }
        let frame_size = (config.sample_rate * config.frame_duration_ms / 1000) as usize;
        let vad = Vad_::new_with_rate_and_mode(
            sample_rate_enum(config.sample_rate)?,
            config.aggressiveness.into(),
        );

        Ok(Self {
            vad,
            frame_size,
            speech_trigger_frames: config.speech_trigger_frames,
            silence_stop_frames: config.silence_stop_frames,
            recent_decisions: VecDeque::with_capacity(
                config.speech_trigger_frames.max(config.silence_stop_frames),
            ),
            is_speech_active: false,
            audio_buffer: Vec::new(),
        })
    }

    fn update_state(&mut self, is_voice: bool) {
        self.recent_decisions.push_back(is_voice);
        if self.recent_decisions.len() > self.speech_trigger_frames.max(self.silence_stop_frames) {
            self.recent_decisions.pop_front();
        }

        if !self.is_speech_active {
            let recent_speech = self
                .recent_decisions
                .iter()
                .rev()
                .take(self.speech_trigger_frames)
                .filter(|&&d| d)
                .count();
            if recent_speech >= self.speech_trigger_frames {
                self.is_speech_active = true;
            }
        } else {
            let recent_silence = self
                .recent_decisions
                .iter()
                .rev()
                .take(self.silence_stop_frames)
                .filter(|&&d| !d)
                .count();
            if recent_silence >= self.silence_stop_frames {
                self.is_speech_active = false;
            }
        }
    }
}

impl Vad for WebRtcVad {
    fn should_process_audio(&mut self, samples: &[i16]) -> Result<bool, VadError> {
        self.audio_buffer.extend_from_slice(samples);
        let mut any_speech = false;

        while self.audio_buffer.len() >= self.frame_size {
            let frame: Vec<i16> = self.audio_buffer.drain(..self.frame_size).collect();
            let is_voice = self
                .vad
                .is_voice_segment(&frame)
                .map_err(|_| VadError::InvalidFrame)?;
            self.update_state(is_voice);
            any_speech |= is_voice;
        }

        Ok(self.is_speech_active || any_speech)
    }

    fn is_speech_active(&self) -> bool {
        self.is_speech_active
    }

    fn frame_is_voiced(&mut self, frame: &[i16]) -> Result<bool, VadError> {
        self.vad
            .is_voice_segment(frame)
            .map_err(|_| VadError::InvalidFrame)
    }

    fn reset(&mut self) {
        self.recent_decisions.clear();
        self.is_speech_active = false;
        self.audio_buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_never_triggers_active_state() {
        let mut vad = WebRtcVad::new(VadConfig::default()).unwrap();
        let silence = vec![0i16; 320 * 20];
        let active = vad.should_process_audio(&silence).unwrap();
        assert!(!active);
        assert!(!vad.is_speech_active());
    }

    #[test]
    fn reset_clears_debounce_history() {
        let mut vad = WebRtcVad::new(VadConfig::default()).unwrap();
        vad.should_process_audio(&vec![0i16; 320]).unwrap();
        vad.reset();
        assert!(!vad.is_speech_active());
    }
}
