//! Silero neural VAD, offered as a selectable alternative to WebRTC's
//! frame-energy classifier. Not the one the spec requires for the dual
//! gate (that's WebRTC-style), but kept because it's better grounded for
//! noisy rooms and the grounding crate exposes it side-by-side.

use super::{Vad, VadError};
use voice_activity_detector::{IteratorExt, LabeledAudio, VoiceActivityDetector};

const CHUNK_SIZE: usize = 512;

pub struct SileroVad {
    vad: VoiceActivityDetector,
    sample_rate: i64,
    threshold: f32,
    has_speech_in_last_batch: bool,
}

impl SileroVad {
    pub fn new(sample_rate: u32) -> Result<Self, VadError> {
        // Silero only ships 8kHz/16kHz models; anything else is folded to 16kHz.
        let sample_rate = match sample_rate {
            8_000 => 8_000i64,
            _ => 16_000i64,
        };

        let vad = VoiceActivityDetector::builder()
            .sample_rate(sample_rate)
            .chunk_size(CHUNK_SIZE)
            .build()
            .map_err(|_| VadError::InvalidFrame)?;

        Ok(Self {
            vad,
            sample_rate,
            threshold: 0.5,
            has_speech_in_last_batch: false,
        })
    }
}

impl Vad for SileroVad {
    fn should_process_audio(&mut self, samples: &[i16]) -> Result<bool, VadError> {
        let labels: Vec<LabeledAudio<i16>> = samples
            .iter()
            .copied()
            .label(&mut self.vad, self.threshold, 0)
            .collect();

        let has_speech = labels
            .iter()
            .any(|label| matches!(label, LabeledAudio::Speech(_)));
        self.has_speech_in_last_batch = has_speech;
        Ok(has_speech)
    }

    fn is_speech_active(&self) -> bool {
        self.has_speech_in_last_batch
    }

    fn frame_is_voiced(&mut self, frame: &[i16]) -> Result<bool, VadError> {
        self.should_process_audio(frame)
    }

    fn reset(&mut self) {
        if let Ok(new_vad) = VoiceActivityDetector::builder()
            .sample_rate(self.sample_rate)
            .chunk_size(CHUNK_SIZE)
            .build()
        {
            self.vad = new_vad;
        }
        self.has_speech_in_last_batch = false;
    }
}
