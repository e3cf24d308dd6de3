use clap::{Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pi_sat::audio::{list_input_devices, AudioError, AudioIo, CpalAudioIo};
use pi_sat::config::Config;
use pi_sat::intent::{IntentEngine, IntentEngineConfig};
use pi_sat::music::{Catalog, MusicResolver, MusicResolverConfig};
use pi_sat::orchestrator::Orchestrator;
use pi_sat::playback::{spawn_catalog_refresh_worker, MpdBackend, PlaybackController, SleepTimer};
use pi_sat::speech::{SpeechRecorder, SpeechRecorderConfig};
use pi_sat::stt::{SttAdapter, SttAdapterConfig, SttEngine, SttError};
use pi_sat::tts::{TtsAdapter, TtsEngine, TtsError};
use pi_sat::types::{CatalogEntry, Language};
use pi_sat::vad::{VadConfig, WebRtcVad};
use pi_sat::volume::{NullMixerSink, VolumeManager};
use pi_sat::wakeword::{TtsCompletionClock, WakewordEngine, WakewordError, WakewordListener, WakewordListenerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline voice-controlled music player", long_about = None)]
struct Args {
    /// List available audio input devices and exit.
    #[arg(short, long)]
    list_devices: bool,

    /// Input device name (defaults to the host's default input device).
    #[arg(short, long)]
    device: Option<String>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run normally.
    Run,
    /// Run with wakeword diagnostic sampling enabled.
    RunDebug,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose || args.command == Some(Command::RunDebug) {
        std::env::set_var("RUST_LOG", std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()));
    }
    env_logger::init();

    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let debug = matches!(args.command, Some(Command::RunDebug));

    let config = Arc::new(Config::load().map_err(|e| anyhow::anyhow!(e))?);

    let audio_factory: Arc<pi_sat::orchestrator::AudioFactory> = {
        let device = args.device.clone();
        Arc::new(move || -> Result<Box<dyn AudioIo>, AudioError> {
            Ok(Box::new(CpalAudioIo::new(device.as_deref())?))
        })
    };
    let probe_audio = (audio_factory)().map_err(|e| anyhow::anyhow!(e))?;
    let capture_rate = probe_audio.capture_rate();
    drop(probe_audio);

    let tts_clock = TtsCompletionClock::new();

    let wakeword_config = WakewordListenerConfig {
        phrase_id: config.wake_phrase_id.clone(),
        detect_threshold: config.detect_threshold,
        tts_cooldown: config.tts_cooldown(),
        wake_cooldown: config.wake_word_cooldown(),
        reset_silence_samples: config.wake_reset_silence_chunks * 320,
        reset_iterations: config.wake_reset_iterations,
        debug,
        diagnostic_interval: Duration::from_secs(2),
    };
    let wake_vad = Box::new(WebRtcVad::new(VadConfig::default()).map_err(|e| anyhow::anyhow!(e.to_string()))?);
    let wakeword = WakewordListener::new(
        Box::new(NullWakewordEngine::new(&config.wake_phrase_id, config.vad_threshold)),
        wake_vad,
        wakeword_config,
        tts_clock.clone(),
    );

    let speech_vad = Box::new(WebRtcVad::new(VadConfig::default()).map_err(|e| anyhow::anyhow!(e.to_string()))?);
    let speech_recorder = SpeechRecorder::new(
        SpeechRecorderConfig {
            model_rate: config.model_sample_rate,
            calibration_duration: Duration::from_millis(300),
            speech_multiplier: config.vad_speech_multiplier,
            silence_duration: Duration::from_secs_f32(config.vad_silence_duration),
            min_speech_duration: Duration::from_secs_f32(config.vad_min_speech_duration),
            max_recording_time: Duration::from_secs_f32(config.max_recording_time),
            normalization_enabled: config.audio_normalization_enabled,
            target_rms: config.audio_target_rms,
            peak_limit: 28_000,
        },
        speech_vad,
    );

    let stt = Arc::new(SttAdapter::new(
        Box::new(NullSttEngine),
        SttAdapterConfig {
            language: Language::from_code(&config.stt_language),
            max_retries: config.stt_max_retries,
            retry_delay: config.stt_retry_delay(),
            retry_backoff: config.stt_retry_backoff,
            retry_cap: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(10),
        },
    ));

    let tts = Arc::new(TtsAdapter::new(
        Box::new(NullTtsEngine),
        tts_clock,
        Language::from_code(&config.stt_language),
    ));

    let intent_engine = Arc::new(IntentEngine::with_default_patterns(IntentEngineConfig {
        fuzzy_match_threshold: config.fuzzy_match_threshold,
    }));

    let music_resolver = Arc::new(MusicResolver::new(MusicResolverConfig {
        phonetic_weight: config.phonetic_weight,
    }));
    let catalog = Arc::new(Catalog::new(empty_catalog()));

    let backend = Box::new(MpdBackend::new(config.backend_address.clone(), Duration::from_secs(5)));
    let playback = Arc::new(PlaybackController::new(backend));
    playback.load_catalog_into(&catalog);

    let volume = Arc::new(VolumeManager::new(
        Arc::new(NullMixerSink),
        config.max_volume,
        config.volume_step,
        config.max_volume,
    ));

    let sleep_timer = Arc::new(SleepTimer::new());

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => log::info!("received Ctrl+C, shutting down"),
                _ = terminate.recv() => log::info!("received SIGTERM, shutting down"),
            }
            shutdown.store(true, Ordering::SeqCst);
        });
    }
    let _catalog_worker = spawn_catalog_refresh_worker(
        config.backend_address.clone(),
        Duration::from_secs(5),
        catalog.clone(),
        shutdown.clone(),
    );

    let orchestrator = Orchestrator::new(
        config.clone(),
        audio_factory,
        wakeword,
        speech_recorder,
        stt,
        tts,
        intent_engine,
        music_resolver,
        catalog,
        playback,
        volume,
        sleep_timer,
        tokio::runtime::Handle::current(),
        shutdown,
    );

    log::info!(
        "pi-sat listening (capture_rate={capture_rate}Hz wake_phrase={})",
        config.wake_phrase_id
    );

    let result = tokio::task::spawn_blocking(move || orchestrator.run()).await;
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::error!("orchestrator exited with error: {e}");
            std::process::exit(1);
        }
        Err(e) => {
            log::error!("orchestrator task panicked: {e}");
            std::process::exit(1);
        }
    }
}

fn print_devices() {
    match list_input_devices() {
        Ok(devices) => {
            println!("Available input devices:");
            for device in devices {
                let marker = if device.is_default { " (default)" } else { "" };
                println!("  - {}{}", device.name, marker);
            }
        }
        Err(e) => {
            println!("<error listing devices: {e}>");
        }
    }
    let host = cpal::default_host();
    if let Some(default) = host.default_input_device().and_then(|d| d.name().ok()) {
        println!("\nHost default input device: {default}");
    }
}

fn empty_catalog() -> Vec<CatalogEntry> {
    Vec::new()
}

/// Stand-in for the OpenWakeWord-class ONNX model a real deployment loads;
/// always reports zero confidence. The real engine is an external
/// collaborator (spec §1, §6) wired in by the deployment, not by this crate.
/// `vad_threshold` is accepted here because it's a `load()`-time parameter
/// of that real model (spec §6); this null engine has no internal VAD to
/// apply it to.
struct NullWakewordEngine {
    phrase_id: String,
}

impl NullWakewordEngine {
    fn new(phrase_id: &str, _vad_threshold: f32) -> Self {
        log::warn!("no wakeword model loaded; using a null engine that never detects anything");
        Self {
            phrase_id: phrase_id.to_string(),
        }
    }
}

impl WakewordEngine for NullWakewordEngine {
    fn predict(&mut self, _frame_16k_s16: &[i16]) -> Result<HashMap<String, f32>, WakewordError> {
        let mut m = HashMap::new();
        m.insert(self.phrase_id.clone(), 0.0);
        Ok(m)
    }

    fn reset(&mut self) -> Result<(), WakewordError> {
        Ok(())
    }
}

/// Stand-in for the Hailo-class accelerated Whisper engine; always returns
/// an empty transcript.
struct NullSttEngine;

impl SttEngine for NullSttEngine {
    fn transcribe(&mut self, _wav_16k_mono: &[u8]) -> Result<String, SttError> {
        log::warn!("no STT model loaded; returning an empty transcript");
        Ok(String::new())
    }
}

/// Stand-in for the Piper-class speech synthesizer; logs instead of
/// producing audio.
struct NullTtsEngine;

impl TtsEngine for NullTtsEngine {
    fn synthesize(&mut self, text: &str) -> Result<(), TtsError> {
        log::info!("(no TTS voice loaded) would speak: \"{text}\"");
        Ok(())
    }
}
