//! Crate-wide error type and the taxonomy the Orchestrator uses to decide
//! how to respond to a failure (retry, speak an error, or abort startup).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PiSatError>;

/// The behavioural class of an error, independent of which component raised
/// it. The Orchestrator maps this to a TTS template and a retry/degrade
/// decision (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retryable I/O on accelerator, capture device, or backend socket.
    TransientHardware,
    /// Engine load failed, audio device absent. Fatal at startup.
    FatalHardware,
    /// No speech captured, or an empty transcript.
    UserEmpty,
    /// No intent matched above threshold.
    UserAmbiguous,
    /// Backend returned a semantic refusal (unknown URI, etc).
    BackendRejected,
    /// Invalid configuration. Aborts the process at startup only.
    ConfigInvalid,
}

#[derive(Error, Debug)]
pub enum PiSatError {
    #[error("audio I/O error: {0}")]
    Audio(String),

    #[error("wakeword engine error: {0}")]
    Wakeword(String),

    #[error("VAD error: {0}")]
    Vad(String),

    #[error("STT error: {0}")]
    Stt(#[from] crate::stt::SttError),

    #[error("TTS error: {0}")]
    Tts(#[from] crate::tts::TtsError),

    #[error("intent engine error: {0}")]
    Intent(String),

    #[error("music resolver error: {0}")]
    Music(String),

    #[error("playback backend error: {0}")]
    Playback(#[from] crate::playback::PlaybackError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PiSatError {
    /// Classify this error into the spec §7 taxonomy so the Orchestrator can
    /// decide how to react without matching on every concrete variant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PiSatError::Audio(_) => ErrorKind::TransientHardware,
            PiSatError::Wakeword(_) => ErrorKind::FatalHardware,
            PiSatError::Vad(_) => ErrorKind::TransientHardware,
            PiSatError::Stt(e) => e.kind(),
            PiSatError::Tts(_) => ErrorKind::TransientHardware,
            PiSatError::Intent(_) => ErrorKind::UserAmbiguous,
            PiSatError::Music(_) => ErrorKind::UserAmbiguous,
            PiSatError::Playback(e) => e.kind(),
            PiSatError::Config(_) => ErrorKind::ConfigInvalid,
            PiSatError::Io(_) => ErrorKind::TransientHardware,
        }
    }
}
