//! Orchestrator (spec §4.1): owns the process lifecycle, the single capture
//! stream, and the nine-step command cycle. One main control flow; the
//! capture loop blocks on device I/O on its own thread while the async
//! STT/TTS adapters are driven through a handle to the tokio runtime,
//! mirroring §5's "one main control flow and a small number of auxiliary
//! workers".

use crate::audio::{AudioError, AudioIo, Resampler};
use crate::config::Config;
use crate::error::{ErrorKind, PiSatError, Result};
use crate::intent::IntentEngine;
use crate::music::{Catalog, MusicResolver};
use crate::playback::PlaybackController;
use crate::speech::SpeechRecorder;
use crate::stt::SttAdapter;
use crate::tts::{template_for_kind, ResponseTemplate, TtsAdapter};
use crate::types::Language;
use crate::volume::VolumeManager;
use crate::volume::DuckGuard;
use crate::wakeword::WakewordListener;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

const WAKE_MODEL_RATE: u32 = 16_000;
const BEEP_FREQ_HZ: f32 = 1200.0;
const BEEP_DURATION_MS: u32 = 50;
const MAX_CONSECUTIVE_CAPTURE_FAILURES: u32 = 5;
const CAPTURE_FAILURE_WINDOW: Duration = Duration::from_secs(10);
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub type AudioFactory = dyn Fn() -> std::result::Result<Box<dyn AudioIo>, AudioError> + Send + Sync;

/// Everything the Orchestrator needs to run one deployment. Constructed
/// once at startup; collaborators are owned, not globally shared, per
/// spec §9's "global singletons vs. construction" note.
pub struct Orchestrator {
    config: Arc<Config>,
    audio_factory: Arc<AudioFactory>,
    wakeword: WakewordListener,
    speech_recorder: SpeechRecorder,
    stt: Arc<SttAdapter>,
    tts: Arc<TtsAdapter>,
    intent_engine: Arc<IntentEngine>,
    music_resolver: Arc<MusicResolver>,
    catalog: Arc<Catalog>,
    playback: Arc<PlaybackController>,
    volume: Arc<VolumeManager>,
    sleep_timer: Arc<crate::playback::SleepTimer>,
    runtime: Handle,
    shutdown: Arc<AtomicBool>,
    command_in_flight: AtomicBool,
}

#[allow(clippy::too_many_arguments)]
impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        audio_factory: Arc<AudioFactory>,
        wakeword: WakewordListener,
        speech_recorder: SpeechRecorder,
        stt: Arc<SttAdapter>,
        tts: Arc<TtsAdapter>,
        intent_engine: Arc<IntentEngine>,
        music_resolver: Arc<MusicResolver>,
        catalog: Arc<Catalog>,
        playback: Arc<PlaybackController>,
        volume: Arc<VolumeManager>,
        sleep_timer: Arc<crate::playback::SleepTimer>,
        runtime: Handle,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
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
            runtime,
            shutdown,
            command_in_flight: AtomicBool::new(false),
        }
    }

    /// Runs until a shutdown signal is observed. Intended to be driven from
    /// `tokio::task::spawn_blocking`, since the capture loop blocks on
    /// device reads (spec §5 "Suspension points... Device reads in the
    /// capture loop").
    pub fn run(mut self) -> Result<()> {
        self.playback
            .pin_backend_volume()
            .map_err(PiSatError::Playback)?;

        let mut audio = (self.audio_factory)().map_err(|e| PiSatError::Audio(e.to_string()))?;
        let mut consecutive_failures = 0u32;
        let mut window_start = Instant::now();

        'outer: loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break 'outer;
            }

            let mut resampler = match Resampler::new(audio.capture_rate(), WAKE_MODEL_RATE) {
                Ok(r) => r,
                Err(e) => return Err(PiSatError::Audio(e.to_string())),
            };

            loop {
                if self.shutdown.load(Ordering::SeqCst) {
                    break 'outer;
                }

                let frame = match audio.read_frame() {
                    Ok(frame) => {
                        consecutive_failures = 0;
                        frame
                    }
                    Err(e) => {
                        warn!("capture read failed: {e}");
                        if window_start.elapsed() > CAPTURE_FAILURE_WINDOW {
                            consecutive_failures = 0;
                            window_start = Instant::now();
                        }
                        consecutive_failures += 1;
                        if consecutive_failures >= MAX_CONSECUTIVE_CAPTURE_FAILURES {
                            error!("capture stream failed {consecutive_failures} times within {CAPTURE_FAILURE_WINDOW:?}; aborting");
                            return Err(PiSatError::Audio(e.to_string()));
                        }
                        audio = (self.audio_factory)().map_err(|e| PiSatError::Audio(e.to_string()))?;
                        continue;
                    }
                };

                let frame_16k = match resampler.resample(&frame.samples) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("resample failed in capture loop: {e}");
                        continue;
                    }
                };

                match self.wakeword.process_frame(&frame_16k) {
                    Ok(Some(detection)) => {
                        if self.command_in_flight.swap(true, Ordering::SeqCst) {
                            debug!("wake detection dropped: command already in flight");
                            continue;
                        }
                        info!(
                            "wake detected: phrase={} confidence={:.3}",
                            detection.phrase_id, detection.confidence
                        );
                        self.run_command_cycle(audio.as_mut());
                        self.command_in_flight.store(false, Ordering::SeqCst);

                        if let Err(e) = self.wakeword.reset() {
                            warn!("wakeword reset failed: {e}");
                        }

                        // Recreate the capture stream so no post-TTS echo
                        // carries into the next cycle (spec §3 lifecycle).
                        audio = (self.audio_factory)().map_err(|e| PiSatError::Audio(e.to_string()))?;
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("wakeword engine error: {e}"),
                }
            }
        }

        self.wait_for_shutdown_drain();
        Ok(())
    }

    fn wait_for_shutdown_drain(&self) {
        let start = Instant::now();
        while self.command_in_flight.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(SHUTDOWN_POLL_INTERVAL);
        }
        if self.command_in_flight.load(Ordering::SeqCst) {
            warn!("forcing shutdown with a command cycle still in flight");
        }
    }

    /// Steps 1-8 of spec §4.1. Step 9 (reset + stream recreation) is the
    /// caller's responsibility since it also governs the capture loop's
    /// resampler lifetime.
    fn run_command_cycle(&mut self, audio: &mut dyn AudioIo) {
        let language = Language::from_code(&self.config.stt_language);
        let _duck = DuckGuard::acquire(self.volume.clone(), self.config.volume_duck_level);

        if let Err(e) = audio.play_beep(BEEP_FREQ_HZ, BEEP_DURATION_MS) {
            warn!("wake-confirmation beep failed: {e}");
        }

        let initial_skip = Duration::from_millis(BEEP_DURATION_MS as u64);
        let command_audio = match self.speech_recorder.record(audio, initial_skip) {
            Ok(audio) => audio,
            Err(e) => {
                warn!("speech recording failed: {e}");
                self.speak_blocking(template_for_kind(e.kind()), None);
                return;
            }
        };

        let transcript = self.runtime.block_on(self.stt.transcribe(&command_audio));
        if transcript.is_empty() {
            info!("empty transcript, no command dispatched");
            self.speak_blocking(template_for_kind(ErrorKind::UserEmpty), None);
            return;
        }
        debug!("transcript: \"{}\"", transcript.raw_text);

        let intent = self
            .intent_engine
            .classify(&transcript.raw_text, &transcript.language, &self.config.active_intents);

        let Some(intent) = intent else {
            info!("no intent matched above threshold");
            self.speak_blocking(template_for_kind(ErrorKind::UserAmbiguous), None);
            return;
        };
        info!("dispatching intent {} (confidence {:.2})", intent.id, intent.confidence);

        self.dispatch_intent(&intent.id, &intent, &language);
    }

    fn dispatch_intent(&mut self, id: &str, intent: &crate::types::IntentResult, language: &Language) {
        match id {
            "play_music" => self.dispatch_play_music(intent),
            "stop" => self.dispatch_simple(|p| p.stop(), ResponseTemplate::Stopped, None),
            "pause" => self.dispatch_simple(|p| p.pause(), ResponseTemplate::Paused, None),
            "resume" => self.dispatch_simple(|p| p.resume(), ResponseTemplate::Resumed, None),
            "next_track" => self.dispatch_silent(|p| p.next()),
            "previous_track" => self.dispatch_silent(|p| p.previous()),
            "volume_up" => {
                self.volume.step_up();
                self.speak_blocking(ResponseTemplate::VolumeUp, None);
            }
            "volume_down" => {
                self.volume.step_down();
                self.speak_blocking(ResponseTemplate::VolumeDown, None);
            }
            "set_volume" => {
                let level = intent.volume_level().unwrap_or(self.volume.level());
                let applied = self.volume.set_level(level);
                self.speak_blocking(ResponseTemplate::VolumeSet, Some(&applied.to_string()));
            }
            "add_favourite" => self.dispatch_add_favourite(),
            "sleep_timer" => self.dispatch_sleep_timer(intent),
            "repeat_mode" => self.dispatch_simple(
                |p| p.set_repeat(true),
                ResponseTemplate::RepeatModeSet,
                Some(on_word(language)),
            ),
            "shuffle_mode" => self.dispatch_simple(
                |p| p.set_shuffle(true),
                ResponseTemplate::ShuffleModeSet,
                Some(on_word(language)),
            ),
            other => warn!("no dispatch handler for intent id {other}"),
        }
    }

    fn dispatch_play_music(&mut self, intent: &crate::types::IntentResult) {
        let query = intent.query();
        if query.trim().is_empty() {
            self.speak_blocking(ResponseTemplate::WhatWouldYouLikeToHear, None);
            return;
        }

        let Some(resolved) = self.music_resolver.resolve(query, &self.catalog) else {
            self.speak_blocking(ResponseTemplate::WhatWouldYouLikeToHear, None);
            return;
        };

        if let Err(e) = self.playback.play(&resolved.catalog_key) {
            warn!("playback failed for {}: {e}", resolved.catalog_key);
            self.speak_blocking(template_for_kind(e.kind()), None);
            return;
        }

        if resolved.is_low_confidence() {
            self.speak_with_prefix_blocking(
                Some(ResponseTemplate::NotSureBut),
                ResponseTemplate::Playing,
                Some(&resolved.display_name),
            );
        } else {
            self.speak_blocking(ResponseTemplate::Playing, Some(&resolved.display_name));
        }
    }

    fn dispatch_add_favourite(&mut self) {
        let current = match self.playback.status() {
            Ok(state) => state.current,
            Err(e) => {
                warn!("could not read playback status for favourite add: {e}");
                self.speak_blocking(template_for_kind(e.kind()), None);
                return;
            }
        };
        let Some(entry) = current else {
            self.speak_blocking(template_for_kind(ErrorKind::UserEmpty), None);
            return;
        };
        match self
            .playback
            .add_favourite(&self.config.favourites_playlist_path, &entry.key)
        {
            Ok(()) => self.speak_blocking(ResponseTemplate::AddedFavourite, Some(&entry.title)),
            Err(e) => {
                warn!("add favourite failed: {e}");
                self.speak_blocking(template_for_kind(e.kind()), None);
            }
        }
    }

    fn dispatch_sleep_timer(&mut self, intent: &crate::types::IntentResult) {
        let Some(minutes) = intent.duration_minutes() else {
            self.speak_blocking(ResponseTemplate::Unknown, None);
            return;
        };
        self.sleep_timer.start(
            minutes,
            self.volume.clone(),
            self.playback.clone(),
        );
        self.speak_blocking(ResponseTemplate::SleepTimerSet, Some(&minutes.to_string()));
    }

    fn dispatch_simple(
        &mut self,
        op: impl FnOnce(&PlaybackController) -> std::result::Result<(), crate::playback::PlaybackError>,
        template: ResponseTemplate,
        value: Option<&str>,
    ) {
        match op(&self.playback) {
            Ok(()) => self.speak_blocking(template, value),
            Err(e) => {
                warn!("playback command failed: {e}");
                self.speak_blocking(template_for_kind(e.kind()), None);
            }
        }
    }

    fn dispatch_silent(
        &mut self,
        op: impl FnOnce(&PlaybackController) -> std::result::Result<(), crate::playback::PlaybackError>,
    ) {
        if let Err(e) = op(&self.playback) {
            warn!("playback command failed: {e}");
        }
    }

    fn speak_blocking(&self, template: ResponseTemplate, value: Option<&str>) {
        if let Err(e) = self.runtime.block_on(self.tts.speak(template, value)) {
            warn!("TTS synthesis failed: {e}");
        }
    }

    fn speak_with_prefix_blocking(
        &self,
        prefix: Option<ResponseTemplate>,
        template: ResponseTemplate,
        value: Option<&str>,
    ) {
        if let Err(e) = self
            .runtime
            .block_on(self.tts.speak_with_prefix(prefix, template, value))
        {
            warn!("TTS synthesis failed: {e}");
        }
    }
}

fn on_word(language: &Language) -> &'static str {
    match language {
        Language::Fr => "activé",
        Language::En => "on",
    }
}
