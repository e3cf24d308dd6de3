//! Shared data model (spec §3): the value types that flow between
//! WakewordListener, SpeechRecorder, STTAdapter, IntentEngine, MusicResolver,
//! PlaybackController, VolumeManager and TTSAdapter.

use std::collections::HashMap;
use std::time::Instant;

/// A block of signed 16-bit mono PCM at the capture rate, ~20ms of audio.
/// Immutable once produced.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Root-mean-square amplitude of this frame, used for energy gating.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self
            .samples
            .iter()
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        ((sum_sq / self.samples.len() as f64).sqrt()) as f32
    }
}

/// One wake-word prediction window's result.
#[derive(Debug, Clone, PartialEq)]
pub struct WakewordResult {
    pub phrase_id: String,
    pub confidence: f32,
    pub timestamp: Instant,
}

/// A finite, non-restartable utterance at 16kHz mono s16, ready for STT.
#[derive(Debug, Clone)]
pub struct CommandAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub duration_seconds: f32,
    pub peak_rms: f32,
}

impl CommandAudio {
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            duration_seconds: 0.0,
            peak_rms: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Language {
    Fr,
    En,
}

impl Language {
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_lowercase().as_str() {
            "en" => Language::En,
            _ => Language::Fr,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::Fr => "fr",
            Language::En => "en",
        }
    }
}

/// `text` is lowercase, punctuation-stripped, diacritic-normalized for
/// matching; `raw_text` is the verbatim engine output, kept for logging and
/// for extractors that need original casing/punctuation (spec §4.5 step 5).
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub raw_text: String,
    pub language: Language,
    pub confidence: Option<f32>,
}

impl Transcript {
    pub fn empty(language: Language) -> Self {
        Self {
            text: String::new(),
            raw_text: String::new(),
            language,
            confidence: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A named capture an IntentPattern runs against the raw transcript once
/// selected (spec §4.5 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    Query,
    DurationMinutes,
    VolumeLevel,
}

/// Compile-time record describing one trigger family. Immutable after load.
#[derive(Debug, Clone)]
pub struct IntentPattern {
    pub id: String,
    pub language: Language,
    pub priority: i32,
    pub triggers: Vec<String>,
    pub extractors: Vec<ExtractorKind>,
}

/// A resolved dispatch decision from the IntentEngine.
#[derive(Debug, Clone)]
pub struct IntentResult {
    pub id: String,
    pub confidence: f32,
    pub parameters: HashMap<String, String>,
    pub matched_trigger: String,
}

impl IntentResult {
    pub fn query(&self) -> &str {
        self.parameters
            .get("query")
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn duration_minutes(&self) -> Option<u32> {
        self.parameters.get("duration_minutes").and_then(|s| s.parse().ok())
    }

    pub fn volume_level(&self) -> Option<u8> {
        self.parameters.get("volume_level").and_then(|s| s.parse().ok())
    }
}

/// One playable item in the catalog, with its phonetic keys derived once at
/// load time.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub key: String,
    pub title: String,
    pub artist: Option<String>,
    pub tags: Vec<String>,
    pub phonetic_keys: Vec<String>,
}

/// The MusicResolver's match result. `match_confidence < 0.6` is low
/// confidence and must be flagged to the caller.
#[derive(Debug, Clone)]
pub struct ResolvedMusic {
    pub catalog_key: String,
    pub display_name: String,
    pub match_confidence: f32,
}

impl ResolvedMusic {
    pub fn is_low_confidence(&self) -> bool {
        self.match_confidence < 0.6
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        PlaybackStatus::Idle
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub current: Option<CatalogEntry>,
    pub position_seconds: f32,
    pub queue_length: usize,
}

/// `level` and `pre_duck_level` are always `<= MAX_VOLUME`; this is enforced
/// by VolumeManager, never by this type alone.
#[derive(Debug, Clone, Copy)]
pub struct VolumeState {
    pub level: u8,
    pub ducked: bool,
    pub pre_duck_level: u8,
}
