//! SpeechRecorder (spec §4.3): captures a single command utterance from an
//! already-open stream — skip, calibrate, dual-gate record, normalize,
//! resample.

use crate::audio::{AudioError, AudioIo, Resampler};
use crate::error::ErrorKind;
use crate::types::CommandAudio;
use crate::vad::{Vad, VadError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Vad(#[from] VadError),
}

impl SpeechError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpeechError::Audio(_) => ErrorKind::TransientHardware,
            SpeechError::Vad(_) => ErrorKind::TransientHardware,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpeechRecorderConfig {
    pub model_rate: u32,
    pub calibration_duration: Duration,
    pub speech_multiplier: f32,
    pub silence_duration: Duration,
    pub min_speech_duration: Duration,
    pub max_recording_time: Duration,
    pub normalization_enabled: bool,
    pub target_rms: f32,
    pub peak_limit: i16,
}

impl Default for SpeechRecorderConfig {
    fn default() -> Self {
        Self {
            model_rate: 16_000,
            calibration_duration: Duration::from_millis(300),
            speech_multiplier: 1.25,
            silence_duration: Duration::from_secs(1),
            min_speech_duration: Duration::from_millis(500),
            max_recording_time: Duration::from_secs(10),
            normalization_enabled: true,
            target_rms: 3000.0,
            peak_limit: 28_000,
        }
    }
}

pub struct SpeechRecorder {
    config: SpeechRecorderConfig,
    vad: Box<dyn Vad>,
}

impl SpeechRecorder {
    pub fn new(config: SpeechRecorderConfig, vad: Box<dyn Vad>) -> Self {
        Self { config, vad }
    }

    /// Record one command utterance. Returns an empty CommandAudio if speech
    /// never started within `MAX_RECORDING_TIME` (spec §4.3 final
    /// paragraph) rather than erroring — silence is a valid outcome, not a
    /// failure.
    pub fn record(
        &mut self,
        io: &mut dyn AudioIo,
        initial_skip: Duration,
    ) -> Result<CommandAudio, SpeechError> {
        self.vad.reset();
        let capture_rate = io.capture_rate();

        // 1. Skip phase: discard frames covering the beep echo window.
        let mut skipped = Duration::ZERO;
        while skipped < initial_skip {
            let frame = io.read_frame()?;
            skipped += Duration::from_secs_f32(frame.duration_seconds());
        }

        // 2. Calibration phase: measure ambient noise floor.
        let mut calibration_rms: Vec<f32> = Vec::new();
        let mut calibrated = Duration::ZERO;
        while calibrated < self.config.calibration_duration {
            let frame = io.read_frame()?;
            calibration_rms.push(frame.rms());
            calibrated += Duration::from_secs_f32(frame.duration_seconds());
        }
        let noise_floor = median(&mut calibration_rms);
        let speech_threshold = noise_floor * self.config.speech_multiplier;

        // 3/4. Active phase: dual-gated capture until trailing silence or cap.
        let mut accumulated: Vec<i16> = Vec::new();
        let mut speech_elapsed = Duration::ZERO;
        let mut silence_run = Duration::ZERO;
        let mut active_elapsed = Duration::ZERO;
        let mut peak_rms = 0.0f32;
        let mut resampler_to_model = Resampler::new(capture_rate, self.config.model_rate)?;

        loop {
            if active_elapsed >= self.config.max_recording_time {
                break;
            }

            let frame = io.read_frame()?;
            let frame_duration = Duration::from_secs_f32(frame.duration_seconds());
            active_elapsed += frame_duration;

            let frame_16k = resampler_to_model.resample(&frame.samples)?;
            let voiced = self.vad.frame_is_voiced(&frame_16k).unwrap_or(false);
            let rms = frame.rms();
            let is_speech = voiced && rms >= speech_threshold;

            if is_speech {
                peak_rms = peak_rms.max(rms);
                speech_elapsed += frame_duration;
                silence_run = Duration::ZERO;
                accumulated.extend_from_slice(&frame.samples);
            } else {
                if !accumulated.is_empty() {
                    // Keep recording through brief pauses; only count toward
                    // end-of-command silence once real speech has occurred.
                    accumulated.extend_from_slice(&frame.samples);
                    silence_run += frame_duration;
                }
            }

            if speech_elapsed >= self.config.min_speech_duration
                && silence_run >= self.config.silence_duration
            {
                break;
            }
        }

        if accumulated.is_empty() {
            return Ok(CommandAudio::empty(self.config.model_rate));
        }

        // 5. Normalization.
        let normalized = if self.config.normalization_enabled {
            normalize(&accumulated, self.config.target_rms, self.config.peak_limit)
        } else {
            accumulated
        };

        // 6. Resample to 16kHz mono s16 for downstream consumers.
        let mut resampler = Resampler::new(capture_rate, self.config.model_rate)?;
        let resampled = resampler.resample(&normalized)?;
        let duration_seconds = resampled.len() as f32 / self.config.model_rate as f32;

        Ok(CommandAudio {
            samples: resampled,
            sample_rate: self.config.model_rate,
            duration_seconds,
            peak_rms,
        })
    }
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Uniform gain up to target RMS, then a hard peak limiter to prevent
/// clipping (spec §4.3 step 5).
fn normalize(samples: &[i16], target_rms: f32, peak_limit: i16) -> Vec<i16> {
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = if samples.is_empty() {
        0.0
    } else {
        (sum_sq / samples.len() as f64).sqrt() as f32
    };

    if rms <= 0.0 || rms >= target_rms {
        return samples.to_vec();
    }

    let gain = target_rms / rms;
    samples
        .iter()
        .map(|&s| {
            let boosted = (s as f32 * gain).round();
            boosted.clamp(-(peak_limit as f32), peak_limit as f32) as i16
        })
        .collect()
}
