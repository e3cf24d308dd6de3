//! STTAdapter (spec §4.4): wraps the STTEngine external collaborator with a
//! stable `transcribe(command_audio, language) -> transcript` contract —
//! WAV serialization, pinned output language, bounded retry with backoff,
//! and a per-engine mutual-exclusion lock with a bounded acquisition
//! timeout.

use crate::error::ErrorKind;
use crate::types::{CommandAudio, Language, Transcript};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum SttError {
    #[error("STT engine I/O error: {0}")]
    EngineIo(String),
    #[error("STT engine runtime error: {0}")]
    EngineRuntime(String),
    #[error("STT engine is not loaded")]
    EngineMissing,
    #[error("invalid command audio: {0}")]
    InvalidInput(String),
    #[error("STT lock acquisition timed out")]
    LockTimeout,
    #[error("WAV encoding error: {0}")]
    WavEncode(#[from] hound::Error),
}

impl SttError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SttError::EngineIo(_) | SttError::EngineRuntime(_) | SttError::LockTimeout => {
                ErrorKind::TransientHardware
            }
            SttError::EngineMissing => ErrorKind::FatalHardware,
            SttError::InvalidInput(_) => ErrorKind::UserEmpty,
            SttError::WavEncode(_) => ErrorKind::TransientHardware,
        }
    }

    /// Transient errors are retried by the adapter; everything else (bad
    /// input, engine missing) is not (spec §4.4).
    fn is_transient(&self) -> bool {
        matches!(
            self,
            SttError::EngineIo(_) | SttError::EngineRuntime(_) | SttError::WavEncode(_)
        )
    }
}

/// External collaborator surface (spec §6 STTEngine surface). `load` is
/// expected to have pinned the output language already; this trait only
/// covers the per-call transcription path the adapter drives.
pub trait SttEngine: Send {
    fn transcribe(&mut self, wav_16k_mono: &[u8]) -> Result<String, SttError>;
}

#[derive(Debug, Clone)]
pub struct SttAdapterConfig {
    pub language: Language,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_backoff: f32,
    pub retry_cap: Duration,
    pub lock_timeout: Duration,
}

pub struct SttAdapter {
    engine: Arc<Mutex<Box<dyn SttEngine>>>,
    config: SttAdapterConfig,
}

impl SttAdapter {
    pub fn new(engine: Box<dyn SttEngine>, config: SttAdapterConfig) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            config,
        }
    }

    /// Transcribe a command utterance. Never propagates an error past this
    /// boundary except for fatal engine loss (logged and surfaced as an
    /// empty transcript with `confidence: None`) — callers always get a
    /// usable `Transcript`, per spec §4.4's "never throw past the adapter
    /// boundary" contract.
    pub async fn transcribe(&self, audio: &CommandAudio) -> Transcript {
        if audio.is_empty() {
            return Transcript::empty(self.config.language.clone());
        }

        let wav = match encode_wav(audio) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("failed to encode command audio as WAV: {e}");
                return Transcript::empty(self.config.language.clone());
            }
        };

        let mut delay = self.config.retry_delay;
        let mut attempt = 0u32;

        loop {
            let result = self.try_transcribe_once(&wav).await;
            match result {
                Ok(text) if !text.trim().is_empty() => {
                    return Transcript {
                        raw_text: text.clone(),
                        text: normalize_for_matching(&text),
                        language: self.config.language.clone(),
                        confidence: None,
                    };
                }
                Ok(_empty) => {
                    log::debug!("STT returned empty text on attempt {attempt}");
                }
                Err(e) if e.is_transient() => {
                    log::warn!("transient STT failure on attempt {attempt}: {e}");
                }
                Err(e) => {
                    log::warn!("non-retryable STT failure: {e}");
                    return Transcript::empty(self.config.language.clone());
                }
            }

            if attempt >= self.config.max_retries {
                return Transcript::empty(self.config.language.clone());
            }
            attempt += 1;
            tokio::time::sleep(delay).await;
            delay = delay
                .mul_f32(self.config.retry_backoff)
                .min(self.config.retry_cap);
        }
    }

    async fn try_transcribe_once(&self, wav: &[u8]) -> Result<String, SttError> {
        let mut guard = timeout(self.config.lock_timeout, self.engine.lock())
            .await
            .map_err(|_| SttError::LockTimeout)?;
        guard.transcribe(wav)
    }
}

fn encode_wav(audio: &CommandAudio) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in &audio.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Lowercase, strip punctuation, collapse whitespace, fold diacritics. Used
/// both here (Transcript.text) and by the IntentEngine (spec §4.5 step 1)
/// so the two stay in lockstep.
pub fn normalize_for_matching(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(fold_diacritic)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' | 'á' | 'ã' => 'a',
        'ç' => 'c',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'î' | 'ï' | 'í' | 'ì' => 'i',
        'ô' | 'ö' | 'ò' | 'ó' | 'õ' => 'o',
        'ù' | 'û' | 'ü' | 'ú' => 'u',
        'ÿ' | 'ý' => 'y',
        'ñ' => 'n',
        other => other,
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex as StdMutex;

    pub struct StubSttEngine {
        pub responses: StdMutex<Vec<Result<String, SttError>>>,
    }

    impl StubSttEngine {
        pub fn new(responses: Vec<Result<String, SttError>>) -> Self {
            Self {
                responses: StdMutex::new(responses),
            }
        }
    }

    impl SttEngine for StubSttEngine {
        fn transcribe(&mut self, _wav: &[u8]) -> Result<String, SttError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(String::new());
            }
            responses.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubSttEngine;
    use super::*;

    fn config() -> SttAdapterConfig {
        SttAdapterConfig {
            language: Language::Fr,
            max_retries: 3,
            retry_delay: Duration::from_millis(1),
            retry_backoff: 2.0,
            retry_cap: Duration::from_millis(10),
            lock_timeout: Duration::from_millis(100),
        }
    }

    fn sample_audio() -> CommandAudio {
        CommandAudio {
            samples: vec![1000; 16_000],
            sample_rate: 16_000,
            duration_seconds: 1.0,
            peak_rms: 2000.0,
        }
    }

    #[tokio::test]
    async fn empty_command_audio_yields_empty_transcript_without_calling_engine() {
        let engine = StubSttEngine::new(vec![Ok("should not be used".to_string())]);
        let adapter = SttAdapter::new(Box::new(engine), config());
        let transcript = adapter.transcribe(&CommandAudio::empty(16_000)).await;
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn transient_failure_then_success_retries_once() {
        let engine = StubSttEngine::new(vec![
            Err(SttError::EngineIo("simulated timeout".to_string())),
            Ok("joue Louane".to_string()),
        ]);
        let adapter = SttAdapter::new(Box::new(engine), config());
        let transcript = adapter.transcribe(&sample_audio()).await;
        assert_eq!(transcript.raw_text, "joue Louane");
        assert_eq!(transcript.text, "joue louane");
    }

    #[tokio::test]
    async fn retry_exhaustion_yields_empty_transcript() {
        let engine = StubSttEngine::new(vec![
            Err(SttError::EngineIo("1".to_string())),
            Err(SttError::EngineIo("2".to_string())),
            Err(SttError::EngineIo("3".to_string())),
            Err(SttError::EngineIo("4".to_string())),
        ]);
        let adapter = SttAdapter::new(Box::new(engine), config());
        let transcript = adapter.transcribe(&sample_audio()).await;
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let engine = StubSttEngine::new(vec![
            Err(SttError::InvalidInput("bad header".to_string())),
            Ok("should never be reached".to_string()),
        ]);
        let adapter = SttAdapter::new(Box::new(engine), config());
        let transcript = adapter.transcribe(&sample_audio()).await;
        assert!(transcript.is_empty());
    }

    #[test]
    fn normalization_folds_diacritics_and_case() {
        assert_eq!(normalize_for_matching("Joué LOUANE, s'il te plaît!"), "joue louane s il te plait");
    }
}
