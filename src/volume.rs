//! VolumeManager (spec §4.8): the single source of truth for the
//! system-level output level. The PlaybackBackend's own volume is pinned at
//! 100 and never touched here.

use crate::playback::VolumeSink;
use crate::types::VolumeState;
use log::debug;
use std::sync::{Arc, Mutex};

/// A mixer sink setter (spec §6 "Mixer sink / output level"). The setter
/// must be idempotent; implementations talk to ALSA/PulseAudio or whatever
/// the deployment's mixer is.
pub trait MixerSink: Send + Sync {
    fn set_master_level(&self, level: u8);
}

/// A `MixerSink` that only logs, for deployments without a controllable
/// hardware mixer and for tests.
pub struct NullMixerSink;

impl MixerSink for NullMixerSink {
    fn set_master_level(&self, level: u8) {
        debug!("mixer sink (null): set level to {level}");
    }
}

pub struct VolumeManager {
    sink: Arc<dyn MixerSink>,
    max_volume: u8,
    volume_step: u8,
    state: Mutex<VolumeState>,
}

impl VolumeManager {
    pub fn new(sink: Arc<dyn MixerSink>, max_volume: u8, volume_step: u8, initial_level: u8) -> Self {
        let level = initial_level.min(max_volume);
        sink.set_master_level(level);
        Self {
            sink,
            max_volume,
            volume_step,
            state: Mutex::new(VolumeState {
                level,
                ducked: false,
                pre_duck_level: level,
            }),
        }
    }

    pub fn level(&self) -> u8 {
        self.state.lock().unwrap().level
    }

    pub fn is_ducked(&self) -> bool {
        self.state.lock().unwrap().ducked
    }

    /// `n` clamped to `[0, MAX_VOLUME]` (spec §4.8 invariant). Also updates
    /// `pre_duck_level` so an explicit volume command issued mid-cycle
    /// survives the command cycle's closing `restore()` instead of being
    /// silently reverted to whatever the level was before ducking.
    pub fn set_level(&self, n: u8) -> u8 {
        let mut state = self.state.lock().unwrap();
        let level = n.min(self.max_volume);
        state.level = level;
        state.pre_duck_level = level;
        self.sink.set_master_level(level);
        level
    }

    pub fn step_up(&self) -> u8 {
        let current = self.level();
        self.set_level(current.saturating_add(self.volume_step))
    }

    pub fn step_down(&self) -> u8 {
        let current = self.level();
        self.set_level(current.saturating_sub(self.volume_step))
    }

    /// Duck to `to_level` (clamped), saving the pre-duck level. A no-op if
    /// already ducked (spec §4.8 "if not already ducked").
    pub fn duck(&self, to_level: u8) {
        let mut state = self.state.lock().unwrap();
        if state.ducked {
            return;
        }
        state.pre_duck_level = state.level;
        state.ducked = true;
        let level = to_level.min(self.max_volume);
        state.level = level;
        self.sink.set_master_level(level);
    }

    /// Restore the pre-duck level and clear the ducked flag. Idempotent.
    pub fn restore(&self) {
        let mut state = self.state.lock().unwrap();
        let level = state.pre_duck_level.min(self.max_volume);
        state.level = level;
        state.ducked = false;
        self.sink.set_master_level(level);
    }
}

impl VolumeSink for VolumeManager {
    fn current_level(&self) -> u8 {
        self.level()
    }

    fn set_level(&self, level: u8) {
        VolumeManager::set_level(self, level);
    }
}

/// Scoped duck-and-restore: ducks on construction, restores on drop,
/// whatever unwinding path the command cycle takes (spec §9 "duck-and-
/// restore as a scoped action").
pub struct DuckGuard {
    manager: Arc<VolumeManager>,
}

impl DuckGuard {
    pub fn acquire(manager: Arc<VolumeManager>, to_level: u8) -> Self {
        manager.duck(to_level);
        Self { manager }
    }
}

impl Drop for DuckGuard {
    fn drop(&mut self) {
        self.manager.restore();
    }
}
