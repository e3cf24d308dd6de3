//! Runtime configuration for Pi-Sat, loaded from environment variables.
//!
//! Mirrors the loading discipline of the grounding crate's `ApiConfig`:
//! `.env` is loaded opportunistically, every option has a sane default, and
//! a misconfigured value is reported with an actionable log line before the
//! error propagates to the caller (spec §7 `ConfigInvalid`, startup-only).

use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("environment error: {0}")]
    EnvError(#[from] env::VarError),
}

/// Every tunable named in spec §6's configuration table.
#[derive(Debug, Clone)]
pub struct Config {
    pub stt_language: String,
    pub wake_phrase_id: String,
    pub detect_threshold: f32,
    pub vad_threshold: f32,
    pub tts_cooldown_seconds: f32,
    pub wake_word_cooldown: f32,
    pub wake_reset_silence_chunks: usize,
    pub wake_reset_iterations: usize,
    pub vad_speech_multiplier: f32,
    pub vad_silence_duration: f32,
    pub vad_min_speech_duration: f32,
    pub max_recording_time: f32,
    pub audio_normalization_enabled: bool,
    pub audio_target_rms: f32,
    pub stt_max_retries: u32,
    pub stt_retry_delay: f32,
    pub stt_retry_backoff: f32,
    pub fuzzy_match_threshold: f32,
    pub phonetic_weight: f32,
    pub volume_step: u8,
    pub volume_duck_level: u8,
    pub max_volume: u8,
    pub active_intents: Vec<String>,
    pub capture_sample_rate: u32,
    pub model_sample_rate: u32,
    pub favourites_playlist_path: String,
    pub backend_address: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stt_language: "fr".to_string(),
            wake_phrase_id: "alexa_v0.1".to_string(),
            detect_threshold: 0.5,
            vad_threshold: 0.6,
            tts_cooldown_seconds: 1.5,
            wake_word_cooldown: 2.0,
            wake_reset_silence_chunks: 25,
            wake_reset_iterations: 2,
            vad_speech_multiplier: 1.25,
            vad_silence_duration: 1.0,
            vad_min_speech_duration: 0.5,
            max_recording_time: 10.0,
            audio_normalization_enabled: true,
            audio_target_rms: 3000.0,
            stt_max_retries: 3,
            stt_retry_delay: 0.5,
            stt_retry_backoff: 2.0,
            fuzzy_match_threshold: 35.0,
            phonetic_weight: 0.6,
            volume_step: 10,
            volume_duck_level: 20,
            max_volume: 70,
            active_intents: vec![
                "play_music".to_string(),
                "stop".to_string(),
                "volume_up".to_string(),
                "volume_down".to_string(),
            ],
            capture_sample_rate: 48_000,
            model_sample_rate: 16_000,
            favourites_playlist_path: "favourites.m3u".to_string(),
            backend_address: "127.0.0.1:6600".to_string(),
        }
    }
}

impl Config {
    /// Load configuration, overriding defaults with any recognized
    /// `PI_SAT_*` environment variable. Never errors on a missing variable
    /// (falls back to default); errors only on a value that fails to parse,
    /// matching `ConfigInvalid`'s "startup only, aborts process" contract.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        if let Ok(v) = env::var("PI_SAT_STT_LANGUAGE") {
            config.stt_language = v;
        }
        if let Ok(v) = env::var("PI_SAT_WAKE_PHRASE_ID") {
            config.wake_phrase_id = v;
        }
        config.detect_threshold = parse_f32_env("PI_SAT_DETECT_THRESHOLD", config.detect_threshold)?;
        config.vad_threshold = parse_f32_env("PI_SAT_VAD_THRESHOLD", config.vad_threshold)?;
        config.tts_cooldown_seconds =
            parse_f32_env("PI_SAT_TTS_COOLDOWN_SECONDS", config.tts_cooldown_seconds)?;
        config.wake_word_cooldown =
            parse_f32_env("PI_SAT_WAKE_WORD_COOLDOWN", config.wake_word_cooldown)?;
        if let Ok(v) = env::var("PI_SAT_WAKE_RESET_SILENCE_CHUNKS") {
            config.wake_reset_silence_chunks = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PI_SAT_WAKE_RESET_SILENCE_CHUNKS".to_string(),
                reason: "must be a non-negative integer".to_string(),
            })?;
        }
        if let Ok(v) = env::var("PI_SAT_WAKE_RESET_ITERATIONS") {
            config.wake_reset_iterations = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PI_SAT_WAKE_RESET_ITERATIONS".to_string(),
                reason: "must be a non-negative integer".to_string(),
            })?;
        }
        config.vad_speech_multiplier =
            parse_f32_env("PI_SAT_VAD_SPEECH_MULTIPLIER", config.vad_speech_multiplier)?;
        config.vad_silence_duration =
            parse_f32_env("PI_SAT_VAD_SILENCE_DURATION", config.vad_silence_duration)?;
        config.vad_min_speech_duration = parse_f32_env(
            "PI_SAT_VAD_MIN_SPEECH_DURATION",
            config.vad_min_speech_duration,
        )?;
        config.max_recording_time =
            parse_f32_env("PI_SAT_MAX_RECORDING_TIME", config.max_recording_time)?;
        config.audio_target_rms = parse_f32_env("PI_SAT_AUDIO_TARGET_RMS", config.audio_target_rms)?;
        config.stt_retry_delay = parse_f32_env("PI_SAT_STT_RETRY_DELAY", config.stt_retry_delay)?;
        config.stt_retry_backoff =
            parse_f32_env("PI_SAT_STT_RETRY_BACKOFF", config.stt_retry_backoff)?;
        config.fuzzy_match_threshold =
            parse_f32_env("PI_SAT_FUZZY_MATCH_THRESHOLD", config.fuzzy_match_threshold)?;
        config.phonetic_weight = parse_f32_env("PI_SAT_PHONETIC_WEIGHT", config.phonetic_weight)?;

        if let Ok(v) = env::var("PI_SAT_STT_MAX_RETRIES") {
            config.stt_max_retries = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PI_SAT_STT_MAX_RETRIES".to_string(),
                reason: "must be a non-negative integer".to_string(),
            })?;
        }
        if let Ok(v) = env::var("PI_SAT_VOLUME_STEP") {
            config.volume_step = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PI_SAT_VOLUME_STEP".to_string(),
                reason: "must be an integer 0-100".to_string(),
            })?;
        }
        if let Ok(v) = env::var("PI_SAT_VOLUME_DUCK_LEVEL") {
            config.volume_duck_level = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PI_SAT_VOLUME_DUCK_LEVEL".to_string(),
                reason: "must be an integer 0-100".to_string(),
            })?;
        }
        if let Ok(v) = env::var("PI_SAT_MAX_VOLUME") {
            config.max_volume = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PI_SAT_MAX_VOLUME".to_string(),
                reason: "must be an integer 0-100".to_string(),
            })?;
        }
        if config.max_volume > 100 {
            return Err(ConfigError::InvalidValue {
                key: "PI_SAT_MAX_VOLUME".to_string(),
                reason: "must not exceed 100".to_string(),
            });
        }
        if let Ok(v) = env::var("PI_SAT_BACKEND_ADDRESS") {
            config.backend_address = v;
        }
        if let Ok(v) = env::var("PI_SAT_FAVOURITES_PLAYLIST_PATH") {
            config.favourites_playlist_path = v;
        }
        if let Ok(v) = env::var("PI_SAT_ACTIVE_INTENTS") {
            config.active_intents = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        log::info!(
            "loaded configuration: language={} wake_phrase={} max_volume={}",
            config.stt_language,
            config.wake_phrase_id,
            config.max_volume
        );

        Ok(config)
    }

    pub fn tts_cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.tts_cooldown_seconds.max(0.0))
    }

    pub fn wake_word_cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.wake_word_cooldown.max(0.0))
    }

    pub fn stt_retry_delay(&self) -> Duration {
        Duration::from_secs_f32(self.stt_retry_delay.max(0.0))
    }

    pub fn is_intent_active(&self, id: &str) -> bool {
        self.active_intents.iter().any(|s| s == id)
    }
}

fn parse_f32_env(key: &str, default: f32) -> Result<f32, ConfigError> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be a floating point number".to_string(),
        }),
        Err(_) => Ok(default),
    }
}
