//! TTSAdapter (spec §4.9): renders a keyed response template into speech on
//! the configured output device, serialized behind the engine's own lock,
//! and records the completion timestamp the WakewordListener uses for its
//! post-TTS cooldown gate.

use crate::error::ErrorKind;
use crate::types::Language;
use crate::wakeword::TtsCompletionClock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum TtsError {
    #[error("TTS engine error: {0}")]
    EngineError(String),
    #[error("TTS engine is not loaded")]
    EngineMissing,
}

impl TtsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TtsError::EngineError(_) => ErrorKind::TransientHardware,
            TtsError::EngineMissing => ErrorKind::FatalHardware,
        }
    }
}

/// External collaborator surface (spec §6 TTSEngine surface). Engine state
/// (voice model, output device, gain) is held internally by the
/// implementation; the adapter only drives `synthesize` and serializes
/// calls via its own lock.
pub trait TtsEngine: Send {
    fn synthesize(&mut self, text: &str) -> Result<(), TtsError>;
}

/// Keyed response messages with at most one interpolation slot (spec §4.9,
/// GLOSSARY "Template"). Every active and inactive intent this system knows
/// about gets a template, per spec §9's "inactive intents are implemented
/// and tested" design note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTemplate {
    Playing,
    Paused,
    Resumed,
    Stopped,
    Unknown,
    Error,
    VolumeUp,
    VolumeDown,
    VolumeSet,
    AddedFavourite,
    SleepTimerSet,
    SleepTimerCancelled,
    WhatWouldYouLikeToHear,
    NotSureBut,
    RepeatModeSet,
    ShuffleModeSet,
    CantPlayThat,
}

impl ResponseTemplate {
    /// Render into French or English, interpolating `value` at the
    /// template's single slot, if it has one.
    fn text(&self, language: &Language, value: Option<&str>) -> String {
        let value = value.unwrap_or("");
        match (self, language) {
            (ResponseTemplate::Playing, Language::Fr) => format!("Je mets {value}."),
            (ResponseTemplate::Playing, Language::En) => format!("Playing {value}."),
            (ResponseTemplate::Paused, Language::Fr) => "Pause.".to_string(),
            (ResponseTemplate::Paused, Language::En) => "Paused.".to_string(),
            (ResponseTemplate::Resumed, Language::Fr) => "Je reprends.".to_string(),
            (ResponseTemplate::Resumed, Language::En) => "Resuming.".to_string(),
            (ResponseTemplate::Stopped, Language::Fr) => "D'accord, j'arrête.".to_string(),
            (ResponseTemplate::Stopped, Language::En) => "Okay, stopping.".to_string(),
            (ResponseTemplate::Unknown, Language::Fr) => {
                "Je n'ai pas compris.".to_string()
            }
            (ResponseTemplate::Unknown, Language::En) => "I didn't understand.".to_string(),
            (ResponseTemplate::Error, Language::Fr) => {
                "Désolé, il y a eu un problème.".to_string()
            }
            (ResponseTemplate::Error, Language::En) => "Sorry, something went wrong.".to_string(),
            (ResponseTemplate::VolumeUp, Language::Fr) => "Je monte le son.".to_string(),
            (ResponseTemplate::VolumeUp, Language::En) => "Turning it up.".to_string(),
            (ResponseTemplate::VolumeDown, Language::Fr) => "Je baisse le son.".to_string(),
            (ResponseTemplate::VolumeDown, Language::En) => "Turning it down.".to_string(),
            (ResponseTemplate::VolumeSet, Language::Fr) => format!("Volume à {value}."),
            (ResponseTemplate::VolumeSet, Language::En) => format!("Volume set to {value}."),
            (ResponseTemplate::AddedFavourite, Language::Fr) => {
                format!("{value} ajouté aux favoris.")
            }
            (ResponseTemplate::AddedFavourite, Language::En) => {
                format!("{value} added to favourites.")
            }
            (ResponseTemplate::SleepTimerSet, Language::Fr) => {
                format!("Minuterie réglée sur {value} minutes.")
            }
            (ResponseTemplate::SleepTimerSet, Language::En) => {
                format!("Sleep timer set for {value} minutes.")
            }
            (ResponseTemplate::SleepTimerCancelled, Language::Fr) => {
                "Minuterie annulée.".to_string()
            }
            (ResponseTemplate::SleepTimerCancelled, Language::En) => {
                "Sleep timer cancelled.".to_string()
            }
            (ResponseTemplate::WhatWouldYouLikeToHear, Language::Fr) => {
                "Qu'est-ce que tu veux écouter ?".to_string()
            }
            (ResponseTemplate::WhatWouldYouLikeToHear, Language::En) => {
                "What would you like to hear?".to_string()
            }
            (ResponseTemplate::NotSureBut, Language::Fr) => {
                "Je ne suis pas sûr, mais je te mets ça : ".to_string()
            }
            (ResponseTemplate::NotSureBut, Language::En) => {
                "I'm not sure but here's ".to_string()
            }
            (ResponseTemplate::RepeatModeSet, Language::Fr) => {
                format!("Répétition {value}.")
            }
            (ResponseTemplate::RepeatModeSet, Language::En) => {
                format!("Repeat {value}.")
            }
            (ResponseTemplate::ShuffleModeSet, Language::Fr) => {
                format!("Lecture aléatoire {value}.")
            }
            (ResponseTemplate::ShuffleModeSet, Language::En) => {
                format!("Shuffle {value}.")
            }
            (ResponseTemplate::CantPlayThat, Language::Fr) => {
                "Je ne peux pas jouer ça.".to_string()
            }
            (ResponseTemplate::CantPlayThat, Language::En) => "I can't play that.".to_string(),
        }
    }
}

/// Maps the spec's error-kind taxonomy to the template spoken to the child
/// (spec §4.9 / §7): hardware and config failures get the generic apology,
/// an unmatched or empty utterance gets the "didn't understand" prompt, and
/// a semantic backend refusal gets its own distinct response rather than
/// collapsing into the generic one.
pub fn template_for_kind(kind: crate::error::ErrorKind) -> ResponseTemplate {
    use crate::error::ErrorKind;
    match kind {
        ErrorKind::UserEmpty | ErrorKind::UserAmbiguous => ResponseTemplate::Unknown,
        ErrorKind::BackendRejected => ResponseTemplate::CantPlayThat,
        ErrorKind::TransientHardware | ErrorKind::FatalHardware | ErrorKind::ConfigInvalid => {
            ResponseTemplate::Error
        }
    }
}

pub struct TtsAdapter {
    engine: Arc<Mutex<Box<dyn TtsEngine>>>,
    clock: TtsCompletionClock,
    language: Language,
}

impl TtsAdapter {
    pub fn new(engine: Box<dyn TtsEngine>, clock: TtsCompletionClock, language: Language) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            clock,
            language,
        }
    }

    /// Render `template` (optionally prefixed by the low-confidence
    /// "not sure but" template, spec §4.6 step 5) and speak it, recording
    /// the completion timestamp on every path so the post-TTS cooldown
    /// always starts, even on synthesis failure.
    pub async fn speak(&self, template: ResponseTemplate, value: Option<&str>) -> Result<(), TtsError> {
        self.speak_with_prefix(None, template, value).await
    }

    pub async fn speak_with_prefix(
        &self,
        prefix: Option<ResponseTemplate>,
        template: ResponseTemplate,
        value: Option<&str>,
    ) -> Result<(), TtsError> {
        let mut text = String::new();
        if let Some(prefix) = prefix {
            text.push_str(&prefix.text(&self.language, None));
        }
        text.push_str(&template.text(&self.language, value));

        let mut engine = self.engine.lock().await;
        let result = engine.synthesize(&text);
        drop(engine);
        self.clock.mark_completed();
        result
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex as StdMutex;

    pub struct StubTtsEngine {
        pub spoken: Arc<StdMutex<Vec<String>>>,
    }

    impl StubTtsEngine {
        pub fn new() -> (Self, Arc<StdMutex<Vec<String>>>) {
            let spoken = Arc::new(StdMutex::new(Vec::new()));
            (
                Self {
                    spoken: spoken.clone(),
                },
                spoken,
            )
        }
    }

    impl TtsEngine for StubTtsEngine {
        fn synthesize(&mut self, text: &str) -> Result<(), TtsError> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }
}
