//! AudioIO collaborator (spec §6): capture device, PCM playback device, and
//! the resampler that bridges the capture rate to the model rate. The
//! system's own code never talks to cpal directly outside this module.

mod cpal_io;
mod resampler;

pub use cpal_io::{list_input_devices, CpalAudioIo};
pub use resampler::Resampler;

use crate::types::AudioFrame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("audio device error: {0}")]
    Device(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("no data available")]
    NoData,
    #[error("resampling error: {0}")]
    Resample(String),
}

/// One input device, independent of the host API used to enumerate it.
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Capture device + playback sink, as a single narrow surface so the rest of
/// the crate never needs to know it's backed by cpal.
pub trait AudioIo: Send {
    /// Block until one ~20ms AudioFrame at the device's native capture rate
    /// is available.
    fn read_frame(&mut self) -> Result<AudioFrame, AudioError>;

    /// The device's native capture sample rate.
    fn capture_rate(&self) -> u32;

    /// Play a short, pre-encoded tone without blocking the caller.
    fn play_beep(&self, freq_hz: f32, duration_ms: u32) -> Result<(), AudioError>;

    /// Play arbitrary mono s16 PCM at the given rate, blocking until done.
    /// Used by TTSAdapter to play synthesized speech on the shared sink.
    fn play_pcm(&self, samples: &[i16], sample_rate: u32) -> Result<(), AudioError>;
}
