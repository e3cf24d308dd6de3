//! Compiled pattern table (spec §4.5). Patterns for inactive intents are
//! included and tested like any other — only `ACTIVE_INTENTS` gates
//! dispatch (spec §9 "inactive intents in the data model").

use crate::types::{ExtractorKind, IntentPattern, Language};

fn triggers(strings: &[&str]) -> Vec<String> {
    strings.iter().map(|s| s.to_string()).collect()
}

pub fn default_patterns() -> Vec<IntentPattern> {
    vec![
        // Specific intents outrank generic ones (spec §4.5 "Priority design").
        IntentPattern {
            id: "set_volume".to_string(),
            language: Language::Fr,
            priority: 20,
            triggers: triggers(&["mets le volume a", "regle le volume sur", "volume a"]),
            extractors: vec![ExtractorKind::VolumeLevel],
        },
        IntentPattern {
            id: "set_volume".to_string(),
            language: Language::En,
            priority: 20,
            triggers: triggers(&["set the volume to", "set volume to", "volume to"]),
            extractors: vec![ExtractorKind::VolumeLevel],
        },
        IntentPattern {
            id: "sleep_timer".to_string(),
            language: Language::Fr,
            priority: 20,
            triggers: triggers(&["eteins dans", "minuterie de", "arrete dans"]),
            extractors: vec![ExtractorKind::DurationMinutes],
        },
        IntentPattern {
            id: "sleep_timer".to_string(),
            language: Language::En,
            priority: 20,
            triggers: triggers(&["turn off in", "sleep in", "stop in"]),
            extractors: vec![ExtractorKind::DurationMinutes],
        },
        IntentPattern {
            id: "add_favourite".to_string(),
            language: Language::Fr,
            priority: 15,
            triggers: triggers(&["ajoute aux favoris", "mets en favori"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "add_favourite".to_string(),
            language: Language::En,
            priority: 15,
            triggers: triggers(&["add to favourites", "add to favorites"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "pause".to_string(),
            language: Language::Fr,
            priority: 10,
            triggers: triggers(&["pause", "mets en pause"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "pause".to_string(),
            language: Language::En,
            priority: 10,
            triggers: triggers(&["pause", "pause it"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "resume".to_string(),
            language: Language::Fr,
            priority: 10,
            triggers: triggers(&["reprends", "continue la musique"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "resume".to_string(),
            language: Language::En,
            priority: 10,
            triggers: triggers(&["resume", "continue playing"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "next_track".to_string(),
            language: Language::Fr,
            priority: 10,
            triggers: triggers(&["chanson suivante", "piste suivante"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "next_track".to_string(),
            language: Language::En,
            priority: 10,
            triggers: triggers(&["next song", "skip"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "previous_track".to_string(),
            language: Language::Fr,
            priority: 10,
            triggers: triggers(&["chanson precedente", "piste precedente"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "previous_track".to_string(),
            language: Language::En,
            priority: 10,
            triggers: triggers(&["previous song", "go back"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "repeat_mode".to_string(),
            language: Language::Fr,
            priority: 10,
            triggers: triggers(&["repete la chanson", "mode repetition"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "repeat_mode".to_string(),
            language: Language::En,
            priority: 10,
            triggers: triggers(&["repeat the song", "repeat mode"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "shuffle_mode".to_string(),
            language: Language::Fr,
            priority: 10,
            triggers: triggers(&["lecture aleatoire", "mode aleatoire"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "shuffle_mode".to_string(),
            language: Language::En,
            priority: 10,
            triggers: triggers(&["shuffle mode", "shuffle the music"]),
            extractors: vec![],
        },
        // Generic intents, lower priority.
        IntentPattern {
            id: "stop".to_string(),
            language: Language::Fr,
            priority: 5,
            triggers: triggers(&["stop", "arrete la musique", "arrete"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "stop".to_string(),
            language: Language::En,
            priority: 5,
            triggers: triggers(&["stop", "stop the music", "stop it"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "play_music".to_string(),
            language: Language::Fr,
            priority: 5,
            triggers: triggers(&["joue", "mets de la musique", "joue de la musique", "ecoute"]),
            extractors: vec![ExtractorKind::Query],
        },
        IntentPattern {
            id: "play_music".to_string(),
            language: Language::En,
            priority: 5,
            triggers: triggers(&["play", "play some music", "listen to"]),
            extractors: vec![ExtractorKind::Query],
        },
        IntentPattern {
            id: "volume_up".to_string(),
            language: Language::Fr,
            priority: 5,
            triggers: triggers(&["plus fort", "monte le son", "augmente le volume"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "volume_up".to_string(),
            language: Language::En,
            priority: 5,
            triggers: triggers(&["louder", "turn it up", "volume up"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "volume_down".to_string(),
            language: Language::Fr,
            priority: 5,
            triggers: triggers(&["moins fort", "baisse le son", "diminue le volume"]),
            extractors: vec![],
        },
        IntentPattern {
            id: "volume_down".to_string(),
            language: Language::En,
            priority: 5,
            triggers: triggers(&["quieter", "turn it down", "volume down"]),
            extractors: vec![],
        },
    ]
}
