//! IntentEngine (spec §4.5): a stateless classifier over a compiled pattern
//! table, with token-set fuzzy matching and parameter extraction.

pub mod patterns;

use crate::stt::normalize_for_matching;
use crate::types::{ExtractorKind, IntentPattern, IntentResult, Language};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct IntentEngineConfig {
    pub fuzzy_match_threshold: f32,
}

impl Default for IntentEngineConfig {
    fn default() -> Self {
        Self {
            fuzzy_match_threshold: 35.0,
        }
    }
}

pub struct IntentEngine {
    patterns: Vec<IntentPattern>,
    config: IntentEngineConfig,
}

struct Candidate<'a> {
    pattern: &'a IntentPattern,
    similarity: f32,
    matched_trigger: &'a str,
}

impl IntentEngine {
    pub fn new(patterns: Vec<IntentPattern>, config: IntentEngineConfig) -> Self {
        Self { patterns, config }
    }

    pub fn with_default_patterns(config: IntentEngineConfig) -> Self {
        Self::new(patterns::default_patterns(), config)
    }

    /// Classify `raw_text` (the verbatim transcript) against the active
    /// pattern table. Pure function of its inputs — identical arguments
    /// always produce an identical result (spec §8 determinism property).
    pub fn classify(
        &self,
        raw_text: &str,
        language: &Language,
        active_intents: &[String],
    ) -> Option<IntentResult> {
        let normalized = normalize_for_matching(raw_text);
        if normalized.is_empty() {
            return None;
        }

        let mut candidates: Vec<Candidate> = self
            .patterns
            .iter()
            .filter(|p| &p.language == language)
            .filter(|p| active_intents.iter().any(|id| id == &p.id))
            .filter_map(|pattern| {
                let mut best_similarity = -1.0f32;
                let mut best_trigger: &str = "";
                for trigger in &pattern.triggers {
                    let normalized_trigger = normalize_for_matching(trigger);
                    let similarity = token_set_similarity(&normalized, &normalized_trigger);
                    if similarity > best_similarity
                        || (similarity == best_similarity && trigger.len() > best_trigger.len())
                    {
                        best_similarity = similarity;
                        best_trigger = trigger;
                    }
                }
                if best_similarity >= self.config.fuzzy_match_threshold {
                    Some(Candidate {
                        pattern,
                        similarity: best_similarity,
                        matched_trigger: best_trigger,
                    })
                } else {
                    None
                }
            })
            .collect();

        // (priority desc, similarity desc, trigger length desc, id lexical asc).
        candidates.sort_by(|a, b| {
            b.pattern
                .priority
                .cmp(&a.pattern.priority)
                .then(b.similarity.partial_cmp(&a.similarity).unwrap())
                .then(b.matched_trigger.len().cmp(&a.matched_trigger.len()))
                .then(a.pattern.id.cmp(&b.pattern.id))
        });

        let best = candidates.into_iter().next()?;
        let parameters = run_extractors(&best.pattern.extractors, raw_text, best.matched_trigger, language);

        Some(IntentResult {
            id: best.pattern.id.clone(),
            confidence: (best.similarity / 100.0).clamp(0.0, 1.0),
            parameters,
            matched_trigger: best.matched_trigger.to_string(),
        })
    }
}

/// Token-set fuzzy similarity (0-100), grounded on the classic
/// intersection/diff "token set ratio" technique, built on `strsim`'s
/// normalized Levenshtein distance as the base string comparator.
fn token_set_similarity(a: &str, b: &str) -> f32 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sorted_intersection = intersection.join(" ");
    let combined_a = join_nonempty(&sorted_intersection, &diff_a.join(" "));
    let combined_b = join_nonempty(&sorted_intersection, &diff_b.join(" "));

    let r1 = strsim::normalized_levenshtein(&sorted_intersection, &combined_a);
    let r2 = strsim::normalized_levenshtein(&sorted_intersection, &combined_b);
    let r3 = strsim::normalized_levenshtein(&combined_a, &combined_b);
    let r4 = strsim::normalized_levenshtein(a, b);

    (r1.max(r2).max(r3).max(r4) * 100.0) as f32
}

fn join_nonempty(a: &str, b: &str) -> String {
    if a.is_empty() {
        b.to_string()
    } else if b.is_empty() {
        a.to_string()
    } else {
        format!("{a} {b}")
    }
}

fn run_extractors(
    extractors: &[ExtractorKind],
    raw_text: &str,
    matched_trigger: &str,
    language: &Language,
) -> HashMap<String, String> {
    let mut parameters = HashMap::new();
    for extractor in extractors {
        match extractor {
            ExtractorKind::Query => {
                parameters.insert("query".to_string(), extract_query(raw_text, matched_trigger));
            }
            ExtractorKind::DurationMinutes => {
                if let Some(minutes) = extract_number(raw_text, language) {
                    parameters.insert("duration_minutes".to_string(), minutes.to_string());
                }
            }
            ExtractorKind::VolumeLevel => {
                if let Some(level) = extract_number(raw_text, language) {
                    parameters.insert("volume_level".to_string(), level.clamp(0, 100).to_string());
                }
            }
        }
    }
    parameters
}

/// The substring following the matched trigger, trimmed; empty if none
/// (spec §4.5 `query` extractor).
fn extract_query(raw_text: &str, matched_trigger: &str) -> String {
    let normalized_raw = normalize_for_matching(raw_text);
    let normalized_trigger = normalize_for_matching(matched_trigger);

    match normalized_raw.find(&normalized_trigger) {
        Some(idx) if !normalized_trigger.is_empty() => {
            let after = &normalized_raw[idx + normalized_trigger.len()..];
            after.trim().to_string()
        }
        _ => String::new(),
    }
}

/// Integer from digit or written-number forms in the target language
/// (spec §4.5 `duration_minutes` / `volume_level` extractors).
fn extract_number(raw_text: &str, language: &Language) -> Option<i64> {
    let normalized = normalize_for_matching(raw_text);

    for token in normalized.split_whitespace() {
        if let Ok(n) = token.parse::<i64>() {
            return Some(n);
        }
        if let Some(n) = written_number(token, language) {
            return Some(n);
        }
    }
    None
}

fn written_number(token: &str, language: &Language) -> Option<i64> {
    let table: &[(&str, i64)] = match language {
        Language::Fr => &[
            ("zero", 0),
            ("un", 1),
            ("une", 1),
            ("deux", 2),
            ("trois", 3),
            ("quatre", 4),
            ("cinq", 5),
            ("six", 6),
            ("sept", 7),
            ("huit", 8),
            ("neuf", 9),
            ("dix", 10),
            ("quinze", 15),
            ("vingt", 20),
            ("trente", 30),
            ("quarante", 40),
            ("cinquante", 50),
            ("soixante", 60),
            ("cent", 100),
        ],
        Language::En => &[
            ("zero", 0),
            ("one", 1),
            ("two", 2),
            ("three", 3),
            ("four", 4),
            ("five", 5),
            ("six", 6),
            ("seven", 7),
            ("eight", 8),
            ("nine", 9),
            ("ten", 10),
            ("fifteen", 15),
            ("twenty", 20),
            ("thirty", 30),
            ("forty", 40),
            ("fifty", 50),
            ("sixty", 60),
            ("hundred", 100),
        ],
    };
    table
        .iter()
        .find(|(word, _)| *word == token)
        .map(|(_, n)| *n)
}
