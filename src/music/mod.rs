//! MusicResolver (spec §4.6): resolves a `play_music` query against the
//! catalog snapshot via a text+phonetic hybrid score.

pub mod phonetic;

use crate::types::{CatalogEntry, ResolvedMusic};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MusicError {
    #[error("catalog is empty")]
    EmptyCatalog,
}

#[derive(Debug, Clone)]
pub struct MusicResolverConfig {
    pub phonetic_weight: f32,
}

impl Default for MusicResolverConfig {
    fn default() -> Self {
        Self {
            phonetic_weight: 0.6,
        }
    }
}

/// Known artifactual provenance markers to strip before matching (spec
/// §4.6 step 1's "(SPOTISAVER) and similar parenthetical markers").
const ARTIFACT_SUFFIXES: &[&str] = &["(spotisaver)", "(spotify)", "(youtube)", "(explicit)"];

fn clean(text: &str) -> String {
    let mut folded = crate::stt::normalize_for_matching(text);
    for suffix in ARTIFACT_SUFFIXES {
        folded = folded.replace(suffix, "");
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip the same artifactual suffixes `clean` strips for matching, but
/// case-insensitively against the original text and without folding case or
/// punctuation — this is what gets spoken back as the display name (spec
/// §4.6 step 1, scenario 6's canonical display name).
fn strip_artifact_suffixes(text: &str) -> String {
    let mut result = text.to_string();
    loop {
        let lower = result.to_lowercase();
        let hit = ARTIFACT_SUFFIXES
            .iter()
            .find_map(|suffix| lower.find(suffix).map(|pos| (pos, suffix.len())));
        match hit {
            Some((pos, len)) => result.replace_range(pos..pos + len, ""),
            None => break,
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The catalog snapshot, published by immutable reference and swapped
/// atomically on refresh (spec §5 "Catalog snapshot").
pub struct Catalog {
    entries: RwLock<Arc<Vec<CatalogEntry>>>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let with_keys = entries
            .into_iter()
            .map(|mut entry| {
                let joined = format!(
                    "{} {}",
                    entry.title,
                    entry.artist.clone().unwrap_or_default()
                );
                entry.phonetic_keys = phonetic::phonetic_keys(&clean(&joined));
                entry
            })
            .collect();
        Self {
            entries: RwLock::new(Arc::new(with_keys)),
        }
    }

    /// Reload from a freshly fetched entry list (spec §4.6 "Catalog
    /// lifecycle"). Phonetic keys are recomputed once here, not per query.
    pub fn refresh(&self, entries: Vec<CatalogEntry>) {
        let with_keys = entries
            .into_iter()
            .map(|mut entry| {
                let joined = format!(
                    "{} {}",
                    entry.title,
                    entry.artist.clone().unwrap_or_default()
                );
                entry.phonetic_keys = phonetic::phonetic_keys(&clean(&joined));
                entry
            })
            .collect();
        *self.entries.write().unwrap() = Arc::new(with_keys);
    }

    pub fn snapshot(&self) -> Arc<Vec<CatalogEntry>> {
        self.entries.read().unwrap().clone()
    }
}

pub struct MusicResolver {
    config: MusicResolverConfig,
}

impl MusicResolver {
    pub fn new(config: MusicResolverConfig) -> Self {
        Self { config }
    }

    /// Resolve `query` against `catalog`'s current snapshot. `None` means
    /// either an empty query (caller dispatches "what would you like to
    /// hear") or an empty catalog.
    pub fn resolve(&self, query: &str, catalog: &Catalog) -> Option<ResolvedMusic> {
        if query.trim().is_empty() {
            return None;
        }

        let snapshot = catalog.snapshot();
        if snapshot.is_empty() {
            return None;
        }

        let cleaned_query = clean(query);
        let query_keys = phonetic::phonetic_keys(&cleaned_query);

        let text_weight = 1.0 - self.config.phonetic_weight;

        let mut best: Option<(usize, f32, f32)> = None; // (index, combined, text_score)

        for (idx, entry) in snapshot.iter().enumerate() {
            let haystack = clean(&format!(
                "{} {} {}",
                entry.title,
                entry.artist.clone().unwrap_or_default(),
                entry.tags.join(" ")
            ));
            let text_score = token_set_ratio(&cleaned_query, &haystack);
            let phonetic_score = jaccard(&query_keys, &entry.phonetic_keys);
            let combined = text_weight * text_score + self.config.phonetic_weight * phonetic_score;

            let is_better = match &best {
                None => true,
                Some((_, best_combined, best_text)) => {
                    combined > *best_combined
                        || (combined == *best_combined && text_score > *best_text)
                }
            };
            if is_better {
                best = Some((idx, combined, text_score));
            }
        }

        let (idx, combined, _) = best?;
        let entry = &snapshot[idx];
        Some(ResolvedMusic {
            catalog_key: entry.key.clone(),
            display_name: strip_artifact_suffixes(&entry.title),
            match_confidence: combined.clamp(0.0, 1.0),
        })
    }
}

fn token_set_ratio(a: &str, b: &str) -> f32 {
    use std::collections::BTreeSet;
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        return 0.0;
    }
    let set_ratio = intersection as f32 / union as f32;
    let edit_ratio = strsim::normalized_levenshtein(a, b) as f32;
    set_ratio.max(edit_ratio)
}

fn jaccard(a: &[String], b: &[String]) -> f32 {
    use std::collections::HashSet;
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&String> = a.iter().collect();
    let set_b: HashSet<&String> = b.iter().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, title: &str, artist: &str) -> CatalogEntry {
        CatalogEntry {
            key: key.to_string(),
            title: title.to_string(),
            artist: Some(artist.to_string()),
            tags: vec![],
            phonetic_keys: vec![],
        }
    }

    #[test]
    fn exact_title_resolves_with_high_confidence() {
        let catalog = Catalog::new(vec![
            entry("1", "Louane - Jour 1", "Louane"),
            entry("2", "ABBA - Gimme! Gimme! Gimme!", "ABBA"),
        ]);
        let resolver = MusicResolver::new(MusicResolverConfig::default());
        let result = resolver
            .resolve("louane jour 1", &catalog)
            .expect("should resolve");
        assert_eq!(result.catalog_key, "1");
        assert!(result.match_confidence >= 0.9);
    }

    #[test]
    fn empty_query_returns_none() {
        let catalog = Catalog::new(vec![entry("1", "Louane - Jour 1", "Louane")]);
        let resolver = MusicResolver::new(MusicResolverConfig::default());
        assert!(resolver.resolve("", &catalog).is_none());
    }

    #[test]
    fn empty_catalog_returns_none() {
        let catalog = Catalog::new(vec![]);
        let resolver = MusicResolver::new(MusicResolverConfig::default());
        assert!(resolver.resolve("anything", &catalog).is_none());
    }

    #[test]
    fn phonetic_drift_still_resolves_the_right_entry() {
        let catalog = Catalog::new(vec![
            entry("1", "Louane - Jour 1", "Louane"),
            entry("2", "ABBA - Gimme! Gimme! Gimme! (SPOTISAVER)", "ABBA"),
        ]);
        let resolver = MusicResolver::new(MusicResolverConfig::default());
        let result = resolver
            .resolve("abah gimi gimi gimi", &catalog)
            .expect("should resolve via phonetic keys");
        assert_eq!(result.catalog_key, "2");
        assert!(result.match_confidence >= 0.6);
        assert_eq!(result.display_name, "ABBA - Gimme! Gimme! Gimme!");
    }

    #[test]
    fn display_name_strips_artifact_suffix_case_insensitively() {
        let catalog = Catalog::new(vec![entry("1", "Louane - Jour 2 (Spotify)", "Louane")]);
        let resolver = MusicResolver::new(MusicResolverConfig::default());
        let result = resolver.resolve("louane jour 2", &catalog).expect("should resolve");
        assert_eq!(result.display_name, "Louane - Jour 2");
    }
}
