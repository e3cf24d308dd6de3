//! WakewordListener (spec §4.2): continuous capture, pre-roll detection,
//! cooldown, and the self-echo gate.
//!
//! The WakewordEngine itself is an external collaborator (spec §1, §6) —
//! this module only owns the detection state machine wrapped around it:
//! the dual confidence+VAD gate, the two cooldown windows, and the
//! post-cycle model reset.

use crate::types::WakewordResult;
use crate::vad::{Vad, VadError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WakewordError {
    #[error("engine load failed: {0}")]
    LoadFailed(String),
    #[error("inference error: {0}")]
    Inference(String),
    #[error(transparent)]
    Vad(#[from] VadError),
}

/// External collaborator surface (spec §6 WakewordEngine surface). A real
/// deployment backs this with an OpenWakeWord-class ONNX/tflite model. Spec
/// §6's `vad_threshold` is a `load()`-time parameter of that model (its own
/// internal VAD), not a property of the `Vad` gate this module owns — it is
/// threaded through to wherever a deployment constructs its engine, not
/// stored on `WakewordListenerConfig`.
pub trait WakewordEngine: Send {
    fn predict(&mut self, frame_16k_s16: &[i16]) -> Result<HashMap<String, f32>, WakewordError>;
    fn reset(&mut self) -> Result<(), WakewordError>;
}

#[derive(Debug, Clone)]
pub struct WakewordListenerConfig {
    pub phrase_id: String,
    pub detect_threshold: f32,
    pub tts_cooldown: Duration,
    pub wake_cooldown: Duration,
    pub reset_silence_samples: usize,
    pub reset_iterations: usize,
    pub debug: bool,
    pub diagnostic_interval: Duration,
}

/// Shared clock the TTSAdapter writes to on synthesis completion and the
/// WakewordListener reads from to gate self-triggering (spec §9 "post-TTS
/// cooldown vs simple sleep").
#[derive(Clone, Default)]
pub struct TtsCompletionClock(Arc<Mutex<Option<Instant>>>);

impl TtsCompletionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_completed(&self) {
        *self.0.lock().unwrap() = Some(Instant::now());
    }

    fn elapsed_since_completion(&self) -> Option<Duration> {
        self.0.lock().unwrap().map(|t| t.elapsed())
    }
}

pub struct WakewordListener {
    engine: Box<dyn WakewordEngine>,
    vad: Box<dyn Vad>,
    config: WakewordListenerConfig,
    tts_clock: TtsCompletionClock,
    last_detection: HashMap<String, Instant>,
    last_diagnostic: Option<Instant>,
}

impl WakewordListener {
    pub fn new(
        engine: Box<dyn WakewordEngine>,
        vad: Box<dyn Vad>,
        config: WakewordListenerConfig,
        tts_clock: TtsCompletionClock,
    ) -> Self {
        Self {
            engine,
            vad,
            config,
            tts_clock,
            last_detection: HashMap::new(),
            last_diagnostic: None,
        }
    }

    /// Feed one 16kHz mono s16 frame. Returns `Some(result)` exactly when
    /// every spec §4.2 gate passes: confidence threshold, VAD gate, TTS
    /// cooldown, and per-phrase cooldown.
    pub fn process_frame(&mut self, frame: &[i16]) -> Result<Option<WakewordResult>, WakewordError> {
        let predictions = self.engine.predict(frame)?;
        let vad_active = self.vad.should_process_audio(frame)?;

        if self.config.debug {
            self.sample_diagnostics(frame, &predictions);
        }

        let Some(&confidence) = predictions.get(&self.config.phrase_id) else {
            return Ok(None);
        };

        if confidence < self.config.detect_threshold {
            return Ok(None);
        }
        if !vad_active {
            return Ok(None);
        }
        if let Some(elapsed) = self.tts_clock.elapsed_since_completion() {
            if elapsed < self.config.tts_cooldown {
                return Ok(None);
            }
        }
        if let Some(last) = self.last_detection.get(&self.config.phrase_id) {
            if last.elapsed() < self.config.wake_cooldown {
                return Ok(None);
            }
        }

        let timestamp = Instant::now();
        self.last_detection
            .insert(self.config.phrase_id.clone(), timestamp);

        Ok(Some(WakewordResult {
            phrase_id: self.config.phrase_id.clone(),
            confidence,
            timestamp,
        }))
    }

    fn sample_diagnostics(&mut self, frame: &[i16], predictions: &HashMap<String, f32>) {
        let should_sample = match self.last_diagnostic {
            None => true,
            Some(t) => t.elapsed() >= self.config.diagnostic_interval,
        };
        if !should_sample {
            return;
        }
        self.last_diagnostic = Some(Instant::now());

        let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = if frame.is_empty() {
            0.0
        } else {
            (sum_sq / frame.len() as f64).sqrt()
        };
        let confidence = predictions.get(&self.config.phrase_id).copied().unwrap_or(0.0);
        log::debug!(
            "wakeword diagnostics: rms={rms:.1} phrase={} confidence={confidence:.3}",
            self.config.phrase_id
        );
    }

    /// Model reset performed after every command cycle (spec §4.2): feed a
    /// handful of zero-filled frames to clear the engine's internal state,
    /// then reset the VAD's debounce history.
    pub fn reset(&mut self) -> Result<(), WakewordError> {
        let zero_frame = vec![0i16; self.config.reset_silence_samples];
        for _ in 0..self.config.reset_iterations {
            self.engine.predict(&zero_frame)?;
        }
        self.engine.reset()?;
        self.vad.reset();
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Deterministic stub engine for tests: returns a fixed confidence for
    /// one phrase, settable at any point mid-test.
    pub struct StubWakewordEngine {
        pub phrase_id: String,
        pub confidence: Arc<Mutex<f32>>,
        pub reset_count: Arc<Mutex<u32>>,
    }

    impl StubWakewordEngine {
        pub fn new(phrase_id: &str) -> Self {
            Self {
                phrase_id: phrase_id.to_string(),
                confidence: Arc::new(Mutex::new(0.0)),
                reset_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn set_confidence(&self, value: f32) {
            *self.confidence.lock().unwrap() = value;
        }
    }

    impl WakewordEngine for StubWakewordEngine {
        fn predict(&mut self, _frame: &[i16]) -> Result<HashMap<String, f32>, WakewordError> {
            let mut m = HashMap::new();
            m.insert(self.phrase_id.clone(), *self.confidence.lock().unwrap());
            Ok(m)
        }

        fn reset(&mut self) -> Result<(), WakewordError> {
            *self.reset_count.lock().unwrap() += 1;
            Ok(())
        }
    }

    pub struct StubVad {
        pub active: Arc<Mutex<bool>>,
    }

    impl StubVad {
        pub fn new(active: bool) -> Self {
            Self {
                active: Arc::new(Mutex::new(active)),
            }
        }
    }

    impl Vad for StubVad {
        fn should_process_audio(&mut self, _samples: &[i16]) -> Result<bool, VadError> {
            Ok(*self.active.lock().unwrap())
        }

        fn is_speech_active(&self) -> bool {
            *self.active.lock().unwrap()
        }

        fn frame_is_voiced(&mut self, _frame: &[i16]) -> Result<bool, VadError> {
            Ok(*self.active.lock().unwrap())
        }

        fn reset(&mut self) {}
    }
}
