//! Pi-Sat: an offline, voice-controlled music player for children.
//!
//! The module layout mirrors the command pipeline end to end: audio capture
//! feeds the wakeword listener, a detection hands off to the speech
//! recorder, its output goes to the STT adapter, the transcript goes to the
//! intent engine, and the resolved intent is dispatched to playback, volume
//! or the music resolver. The orchestrator owns all of it.

pub mod audio;
pub mod config;
pub mod error;
pub mod intent;
pub mod music;
pub mod orchestrator;
pub mod playback;
pub mod speech;
pub mod stt;
pub mod tts;
pub mod types;
pub mod vad;
pub mod volume;
pub mod wakeword;

pub use error::{PiSatError, Result};
